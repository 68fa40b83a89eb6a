//! Persistent cache of compiled bundles, partitioned by deployment
//!
//! Correctness hinges entirely on deployment-scoped eviction, not expiry:
//! a new deployment must never observe another deployment's stale compiled
//! artifact, while artifacts for the current deployment survive process
//! restarts. There is no TTL; eviction is identity-based.
//!
//! Every entry key embeds the deploy hash that produced it
//! (`cache/<deploy>/<fingerprint>`), so the sweep can evict by key alone
//! without scanning bundle contents.

use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use crate::{
    digest::{DeployHash, Fingerprint},
    storage::{Storage, StorageError},
    types::Bundle,
};

/// Literal namespace segment prefixing every cache key.
pub const CACHE_NAMESPACE: &str = "cache";

/// Errors surfaced by cache operations.
///
/// The orchestrator treats these as degradation signals, never correctness
/// failures: a read error falls back to compiling from source and a write
/// error still returns the freshly compiled bundle.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to serialize bundle for caching: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Cache-aside store of compiled bundles over a [`Storage`] capability.
#[derive(Clone)]
pub struct BundleCache {
    store: Arc<dyn Storage>,
}

impl std::fmt::Debug for BundleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleCache").finish_non_exhaustive()
    }
}

impl BundleCache {
    pub fn new(store: Arc<dyn Storage>) -> BundleCache {
        BundleCache { store }
    }

    fn key(deploy: &DeployHash, fingerprint: &Fingerprint) -> String {
        format!("{CACHE_NAMESPACE}/{deploy}/{fingerprint}")
    }

    /// Look up a previously compiled bundle.
    ///
    /// A stored entry is either fully readable or treated as a miss: an
    /// entry that no longer deserializes is logged and reported as absent,
    /// never partially returned.
    pub fn get(
        &self,
        deploy: &DeployHash,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Bundle>, CacheError> {
        let key = BundleCache::key(deploy, fingerprint);
        let Some(bytes) = self.store.get(&key)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(bundle) => Ok(Some(bundle)),
            Err(err) => {
                warn!("discarding unreadable cache entry {key}: {err}");
                Ok(None)
            }
        }
    }

    /// Write a compiled bundle through to storage.
    ///
    /// Overwrites silently on key collision: the same deploy and fingerprint
    /// imply identical compiled output, so the write is idempotent.
    pub fn put(
        &self,
        deploy: &DeployHash,
        fingerprint: &Fingerprint,
        bundle: &Bundle,
    ) -> Result<(), CacheError> {
        let key = BundleCache::key(deploy, fingerprint);
        let payload = serde_json::to_vec(bundle)?;
        self.store.put(&key, &payload)?;
        debug!("cached bundle at {key}");
        Ok(())
    }

    /// Delete every entry under the cache namespace whose embedded deploy
    /// hash differs from `active`, returning the number removed.
    ///
    /// Keys that do not parse as `cache/<deploy>/<fingerprint>` are foreign
    /// by definition and are deleted too. Any storage failure aborts the
    /// sweep so the caller retries it later instead of trusting a
    /// half-swept cache.
    pub fn sweep(&self, active: &DeployHash) -> Result<usize, CacheError> {
        let prefix = format!("{CACHE_NAMESPACE}/");
        let mut removed = 0;
        for key in self.store.list(&prefix)? {
            let deploy_segment = key.split('/').nth(1);
            if deploy_segment == Some(active.as_str()) {
                continue;
            }
            self.store.delete(&key)?;
            debug!("swept stale cache entry {key}");
            removed += 1;
        }
        Ok(removed)
    }
}
