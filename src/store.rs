use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::bundle::ResolvedBundle;

/// Storage interface for resolved bundles, so a session can be replayed offline from the raw
/// credential strings.
///
/// The resolver never touches a store; saving and loading are explicit caller operations.
#[async_trait]
pub trait BundleStore: Debug {
    /// Store a resolved bundle, returning its reference.
    async fn save(&self, bundle: ResolvedBundle) -> Result<Uuid>;

    /// Get a bundle from the store.
    async fn load(&self, reference: Uuid) -> Result<ResolvedBundle>;

    /// Remove a bundle from the store.
    async fn remove(&self, reference: Uuid) -> Result<()>;
}

/// A local in-memory store. Not for production use!
///
/// # Warning
/// This in-memory store should only be used for test purposes, it does not survive a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    store: Arc<Mutex<BTreeMap<Uuid, ResolvedBundle>>>,
}

#[async_trait]
impl BundleStore for MemoryStore {
    async fn save(&self, bundle: ResolvedBundle) -> Result<Uuid> {
        let reference = Uuid::new_v4();
        self.store.lock().await.insert(reference, bundle);

        Ok(reference)
    }

    async fn load(&self, reference: Uuid) -> Result<ResolvedBundle> {
        if let Some(bundle) = self.store.lock().await.get(&reference) {
            return Ok(bundle.clone());
        }

        bail!("bundle not found")
    }

    async fn remove(&self, reference: Uuid) -> Result<()> {
        if self.store.lock().await.remove(&reference).is_some() {
            return Ok(());
        }

        bail!("bundle not found")
    }
}
