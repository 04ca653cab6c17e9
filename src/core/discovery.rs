use std::{
    collections::HashMap,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{bail, Context};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::{
    config::BaseUrl,
    core::{
        error::{Error, Result},
        jwk::KeySet,
        util::{base_request, AsyncHttpClient},
    },
};

/// Fetch the issuer's key set from `<issuer>/.well-known/jwks`.
///
/// # Errors
///
/// [Error::KeyDiscoveryFailed] when the endpoint cannot be built or reached, answers with a
/// non-success status, or does not return a JWK Set.
pub async fn discover_keys<C>(client: &C, issuer: &str) -> Result<KeySet>
where
    C: AsyncHttpClient + ?Sized,
{
    fetch_key_set(client, issuer)
        .await
        .map_err(|e| Error::KeyDiscoveryFailed {
            issuer: issuer.to_owned(),
            reason: format!("{e:#}"),
        })
}

async fn fetch_key_set<C>(client: &C, issuer: &str) -> anyhow::Result<KeySet>
where
    C: AsyncHttpClient + ?Sized,
{
    let url = BaseUrl::try_from(issuer.to_owned())
        .context("issuer is not a URL")?
        .jwks_url()
        .context("unable to build key discovery URL")?;

    debug!("discovering keys at {url}");

    let request = base_request()
        .method("GET")
        .uri(url.as_str())
        .body(vec![])
        .context("failed to build key discovery request")?;

    let response = client
        .execute(request)
        .await
        .context(format!("failed to make key discovery request at {url}"))?;

    let status = response.status();
    if !status.is_success() {
        bail!("key discovery request was unsuccessful (status: {status})")
    }

    KeySet::from_slice(response.body())
}

struct CachedKeySet {
    keys: Arc<KeySet>,
    fetched_at: Instant,
}

type Slot = Arc<OnceCell<CachedKeySet>>;

/// Key sets already discovered in this process, keyed by issuer origin.
///
/// Concurrent lookups of the same issuer share a single discovery. Entries live for the lifetime
/// of the cache unless a TTL is set.
pub struct KeySetCache {
    entries: Mutex<HashMap<String, Slot>>,
    ttl: Option<Duration>,
}

impl KeySetCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn is_fresh(&self, cached: &CachedKeySet) -> bool {
        self.ttl.map_or(true, |ttl| cached.fetched_at.elapsed() < ttl)
    }

    /// The issuer's slot, replaced by an empty one once its key set has expired.
    async fn slot(&self, issuer: &str) -> Slot {
        let mut entries = self.entries.lock().await;
        let slot = entries.entry(issuer.to_owned()).or_default();
        if slot.get().is_some_and(|cached| !self.is_fresh(cached)) {
            debug!("cached key set for {issuer} expired");
            *slot = Slot::default();
        }
        slot.clone()
    }

    pub async fn get(&self, issuer: &str) -> Option<Arc<KeySet>> {
        let entries = self.entries.lock().await;
        let cached = entries.get(issuer)?.get()?;
        self.is_fresh(cached).then(|| cached.keys.clone())
    }

    /// The cached key set, or the result of `discover`.
    ///
    /// Callers racing on an issuer without a cached key set wait for the first discovery instead
    /// of starting their own. A failed discovery is not cached.
    pub async fn get_or_discover<F, Fut>(&self, issuer: &str, discover: F) -> Result<Arc<KeySet>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<KeySet>>,
    {
        let slot = self.slot(issuer).await;
        let cached = slot
            .get_or_try_init(move || async move {
                let keys = discover().await?;
                Ok::<_, Error>(CachedKeySet {
                    keys: Arc::new(keys),
                    fetched_at: Instant::now(),
                })
            })
            .await?;
        Ok(cached.keys.clone())
    }

    pub async fn insert(&self, issuer: &str, keys: Arc<KeySet>) {
        let cached = CachedKeySet {
            keys,
            fetched_at: Instant::now(),
        };
        self.entries
            .lock()
            .await
            .insert(issuer.to_owned(), Arc::new(OnceCell::new_with(Some(cached))));
    }

    pub async fn invalidate(&self, issuer: &str) {
        self.entries.lock().await.remove(issuer);
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

impl std::fmt::Debug for KeySetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySetCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::jwk::Jwk;
    use async_trait::async_trait;
    use http::{Request, Response};
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    struct StaticClient {
        status: u16,
        body: Vec<u8>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AsyncHttpClient for StaticClient {
        async fn execute(
            &self,
            request: Request<Vec<u8>>,
        ) -> anyhow::Result<Response<Vec<u8>>> {
            self.requested.lock().unwrap().push(request.uri().to_string());
            Ok(Response::builder()
                .status(self.status)
                .body(self.body.clone())?)
        }
    }

    fn client(status: u16, body: serde_json::Value) -> StaticClient {
        StaticClient {
            status,
            body: body.to_string().into_bytes(),
            requested: Mutex::new(vec![]),
        }
    }

    #[tokio::test]
    async fn discovers_at_well_known_path() {
        let client = client(200, json!({ "keys": [{ "kty": "EC", "crv": "P-256", "kid": "k" }] }));

        let keys = discover_keys(&client, "https://issuer.example/path/").await.unwrap();

        assert_eq!(keys.keys[0].kid.as_deref(), Some("k"));
        assert_eq!(
            client.requested.lock().unwrap().as_slice(),
            ["https://issuer.example/path/.well-known/jwks"]
        );
    }

    #[tokio::test]
    async fn non_success_status_is_discovery_failure() {
        let client = client(404, json!({}));
        assert!(matches!(
            discover_keys(&client, "https://issuer.example").await,
            Err(Error::KeyDiscoveryFailed { issuer, .. }) if issuer == "https://issuer.example"
        ));
    }

    #[tokio::test]
    async fn non_key_set_document_is_discovery_failure() {
        let client = client(200, json!({ "issuer": "https://issuer.example" }));
        assert!(matches!(
            discover_keys(&client, "https://issuer.example").await,
            Err(Error::KeyDiscoveryFailed { .. })
        ));
    }

    #[tokio::test]
    async fn cache_honours_ttl() {
        let keys = Arc::new(KeySet::new(vec![serde_json::from_value::<Jwk>(
            json!({ "kty": "EC" }),
        )
        .unwrap()]));

        let forever = KeySetCache::new(None);
        forever.insert("https://i.example", keys.clone()).await;
        assert!(forever.get("https://i.example").await.is_some());
        assert!(forever.get("https://other.example").await.is_none());
        forever.invalidate("https://i.example").await;
        assert!(forever.get("https://i.example").await.is_none());
        forever.insert("https://i.example", keys.clone()).await;
        forever.clear().await;
        assert!(forever.get("https://i.example").await.is_none());

        let expired = KeySetCache::new(Some(Duration::ZERO));
        expired.insert("https://i.example", keys).await;
        assert!(expired.get("https://i.example").await.is_none());
    }

    #[tokio::test]
    async fn concurrent_lookups_share_one_discovery() {
        let cache = KeySetCache::new(None);
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let discover = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(KeySet::default())
        };

        let (a, b, c) = tokio::join!(
            cache.get_or_discover("https://i.example", discover),
            cache.get_or_discover("https://i.example", discover),
            cache.get_or_discover("https://i.example", discover),
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_discovery_is_not_cached() {
        let cache = KeySetCache::new(None);

        let failed = cache
            .get_or_discover("https://i.example", || async {
                Err(Error::KeyDiscoveryFailed {
                    issuer: "https://i.example".into(),
                    reason: "unreachable".into(),
                })
            })
            .await;
        assert!(matches!(failed, Err(Error::KeyDiscoveryFailed { .. })));
        assert!(cache.get("https://i.example").await.is_none());

        let keys = cache
            .get_or_discover("https://i.example", || async { Ok(KeySet::default()) })
            .await
            .unwrap();
        assert!(keys.keys.is_empty());
        assert!(cache.get("https://i.example").await.is_some());
    }
}
