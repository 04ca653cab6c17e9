use std::{fmt::Debug, future::Future, sync::Arc};

use anyhow::bail;
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::{
    config::{KeyDiscoveryFailure, ResolverConfig},
    core::{
        bundle::{document_bundle, ResolvedBundle},
        card::{decode_card, peek_issuer},
        discovery::{discover_keys, KeySetCache},
        error::{Error, Result},
        jwe::{decrypt, extract_credentials},
        jwk::KeySet,
        jws::{self, Verification},
        manifest::LinkManifest,
        retrieval::retrieve,
        uri::{parse_card_uri, parse_link, Artifact},
        util::AsyncHttpClient,
    },
    utils::NonEmptyVec,
};

/// Supplies the passcode of a `P` flagged Health Link, typically by asking the user.
#[async_trait]
pub trait PasscodePrompt: Send + Sync {
    /// Returns `None` when the user declines.
    async fn passcode(&self, label: Option<&str>) -> Option<String>;
}

/// How a resolution assembles its output bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BundleShape {
    /// The single credential's own bundle.
    Single,
    /// A synthetic document bundle concatenating every credential's entries.
    Document,
}

/// Resolves Health Links and Health Cards into [ResolvedBundle]s.
///
/// A resolution either completes, possibly with `verified = false`, or fails with an [Error].
/// Dropping a resolution future abandons its pending gateway and key discovery requests; no
/// state other than completed key discoveries is kept.
#[derive(Clone)]
pub struct Resolver {
    client: Arc<dyn AsyncHttpClient + Send + Sync>,
    config: ResolverConfig,
    key_cache: Option<Arc<KeySetCache>>,
}

impl Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .field("key_cache", &self.key_cache)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Build a new resolver.
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::default()
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve either artifact, also when carried in a viewer URL fragment.
    pub async fn resolve(&self, input: &str, passcode: Option<&str>) -> Result<ResolvedBundle> {
        debug!("parsing artifact");
        match Artifact::parse(input)? {
            Artifact::Link(manifest) => self.resolve_manifest(manifest, passcode).await,
            Artifact::Card(card) => {
                self.combine(None, NonEmptyVec::new(card), BundleShape::Single)
                    .await
            }
        }
    }

    /// Resolve a `shlink:/` URI.
    ///
    /// `passcode` is only sent for links flagged `P`, which fail with
    /// [Error::PasscodeRequired] before any request when it is `None`.
    pub async fn resolve_link(&self, uri: &str, passcode: Option<&str>) -> Result<ResolvedBundle> {
        debug!("parsing health link");
        let manifest = parse_link(uri)?;
        self.resolve_manifest(manifest, passcode).await
    }

    /// Resolve a `shlink:/` URI, asking `prompt` for the passcode if the link requires one.
    pub async fn resolve_link_with_prompt(
        &self,
        uri: &str,
        prompt: &dyn PasscodePrompt,
    ) -> Result<ResolvedBundle> {
        debug!("parsing health link");
        let manifest = parse_link(uri)?;

        let passcode = if manifest.flags().passcode_required() && !manifest.flags().direct() {
            prompt.passcode(manifest.label()).await
        } else {
            None
        };

        self.resolve_manifest(manifest, passcode.as_deref()).await
    }

    /// Resolve a `shc:/` URI.
    pub async fn resolve_card(&self, uri: &str) -> Result<ResolvedBundle> {
        debug!("parsing health card");
        let card = parse_card_uri(uri)?;
        self.combine(None, NonEmptyVec::new(card), BundleShape::Single)
            .await
    }

    /// Rebuild a bundle from persisted raw credential strings, without retrieval or decryption.
    ///
    /// The bundle is always a document bundle.
    pub async fn replay(
        &self,
        shc: NonEmptyVec<String>,
        label: Option<String>,
    ) -> Result<ResolvedBundle> {
        debug!("replaying {} stored credential(s)", shc.len());
        self.combine(label, shc, BundleShape::Document).await
    }

    /// [Resolver::resolve_link], abandoned with [Error::Cancelled] once `cancel` completes.
    pub async fn resolve_link_until<F>(
        &self,
        uri: &str,
        passcode: Option<&str>,
        cancel: F,
    ) -> Result<ResolvedBundle>
    where
        F: Future<Output = ()>,
    {
        until(self.resolve_link(uri, passcode), cancel).await
    }

    /// [Resolver::resolve_card], abandoned with [Error::Cancelled] once `cancel` completes.
    pub async fn resolve_card_until<F>(&self, uri: &str, cancel: F) -> Result<ResolvedBundle>
    where
        F: Future<Output = ()>,
    {
        until(self.resolve_card(uri), cancel).await
    }

    /// Whether the credential's signature verifies against its issuer's keys.
    ///
    /// # Errors
    ///
    /// [Error::MalformedCredential] if the issuer cannot be read or the header decoded, and
    /// [Error::KeyDiscoveryFailed] unless configured to downgrade it.
    pub async fn verify(&self, card: &str) -> Result<bool> {
        debug!("verifying credential");
        let issuer = peek_issuer(card)?;

        let keys = match self.keys_for(&issuer).await {
            Ok(keys) => keys,
            Err(e @ Error::KeyDiscoveryFailed { .. })
                if self.config.key_discovery_failure == KeyDiscoveryFailure::Unverified =>
            {
                warn!("treating credential as unverified: {e}");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        match jws::verify(card, &keys) {
            Verification::Verified { kid } => {
                debug!("credential from {issuer} verified with key {kid:?}");
                Ok(true)
            }
            Verification::Unverified { reason } => {
                warn!("credential from {issuer} is unverified: {reason}");
                Ok(false)
            }
            Verification::Malformed(e) => Err(e),
        }
    }

    async fn keys_for(&self, issuer: &str) -> Result<Arc<KeySet>> {
        let discover = || discover_keys(&*self.client, issuer);
        match &self.key_cache {
            Some(cache) => cache.get_or_discover(issuer, discover).await,
            None => discover().await.map(Arc::new),
        }
    }

    async fn resolve_manifest(
        &self,
        manifest: LinkManifest,
        passcode: Option<&str>,
    ) -> Result<ResolvedBundle> {
        debug!("retrieving health link files");
        let response = retrieve(&*self.client, &manifest, &self.config.recipient, passcode).await?;
        let payloads = response.health_card_payloads()?;

        debug!("decrypting {} health link file(s)", payloads.len());
        let mut credentials = Vec::new();
        for payload in payloads {
            let plaintext = decrypt(payload, manifest.key())?;
            credentials.extend(extract_credentials(&plaintext)?);
        }

        let shc = NonEmptyVec::maybe_new(credentials).ok_or(Error::NoPayload)?;
        self.combine(
            manifest.label().map(ToOwned::to_owned),
            shc,
            BundleShape::Document,
        )
        .await
    }

    /// Decode and verify every credential concurrently, then combine them in credential order.
    async fn combine(
        &self,
        label: Option<String>,
        shc: NonEmptyVec<String>,
        shape: BundleShape,
    ) -> Result<ResolvedBundle> {
        let credentials = try_join_all(shc.iter().map(|card| self.resolve_credential(card))).await?;

        let verified = credentials.iter().all(|(_, verified)| *verified);
        let bundle = match shape {
            BundleShape::Single if credentials.len() == 1 => credentials[0].0.clone(),
            _ => document_bundle(credentials.iter().map(|(bundle, _)| bundle)),
        };

        debug!(
            "combined {} credential(s), verified: {verified}",
            credentials.len()
        );
        Ok(ResolvedBundle {
            label,
            shc,
            verified,
            bundle,
        })
    }

    async fn resolve_credential(&self, card: &str) -> Result<(Json, bool)> {
        debug!("decoding credential");
        let payload = decode_card(card)?;
        let verified = self.verify(card).await?;
        Ok((payload.into_fhir_bundle(), verified))
    }
}

async fn until<T, R, F>(resolution: R, cancel: F) -> Result<T>
where
    R: Future<Output = Result<T>>,
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = cancel => {
            debug!("resolution cancelled");
            Err(Error::Cancelled)
        }
        result = resolution => result,
    }
}

/// Builder struct for [Resolver].
#[derive(Default)]
pub struct ResolverBuilder {
    client: Option<Arc<dyn AsyncHttpClient + Send + Sync>>,
    config: ResolverConfig,
    key_cache: Option<Arc<KeySetCache>>,
}

impl ResolverBuilder {
    /// Build the resolver.
    pub fn build(self) -> anyhow::Result<Resolver> {
        let Self {
            client,
            config,
            key_cache,
        } = self;

        let Some(client) = client else {
            bail!("http client is required, see `with_client`")
        };

        let key_cache = if config.key_cache.enabled {
            Some(key_cache.unwrap_or_else(|| Arc::new(KeySetCache::new(config.key_cache.ttl()))))
        } else {
            None
        };

        Ok(Resolver {
            client,
            config,
            key_cache,
        })
    }

    /// Set the [AsyncHttpClient] used for link retrieval and key discovery.
    pub fn with_client(mut self, client: Arc<dyn AsyncHttpClient + Send + Sync>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a key set cache between resolvers. Ignored when caching is disabled.
    pub fn with_key_cache(mut self, cache: Arc<KeySetCache>) -> Self {
        self.key_cache = Some(cache);
        self
    }
}
