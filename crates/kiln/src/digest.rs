//! Content hashing for cache partitioning and bundle identity
//!
//! Two digests drive the cache: the deploy hash partitions entries by
//! deployment identity, and the fingerprint identifies one compiled bundle's
//! inputs within a partition. Both are SHA-256, hex-encoded.

use std::{
    fmt::{self, Write},
    path::Path,
};

use sha2::{Digest, Sha256};

use crate::config::CompilerOptions;

/// Fixed-width digest of a caller-supplied deployment identity.
///
/// Only the current process's active hash is live; every other hash present
/// in storage is stale by definition and eligible for sweeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeployHash(String);

impl DeployHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeployHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic identifier of a compiled bundle's inputs, used as the cache
/// lookup key alongside the deploy hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash a deployment identity into its cache-partition key.
///
/// Pure and deterministic: the same identity always yields the same digest.
/// Collision resistance is not a security requirement here, only stable
/// partitioning.
pub fn deploy_hash(identity: &str) -> DeployHash {
    DeployHash(hex_digest(identity.as_bytes()))
}

/// SHA-256 hash of source content, hex-encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    hex_digest(bytes)
}

/// Derive the fingerprint for a bundle from the entry path, the canonical
/// form of the compiler options, and the ordered content hashes of every
/// module in the graph.
///
/// Including every module's hash means a changed dependency misses the cache
/// even when the entry file itself is untouched; unrelated module graphs can
/// never collide.
pub fn fingerprint(
    entry: &Path,
    options: &CompilerOptions,
    module_hashes: &[String],
) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(entry.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    hasher.update(options.cache_key_repr().as_bytes());
    for hash in module_hashes {
        hasher.update([0u8]);
        hasher.update(hash.as_bytes());
    }
    Fingerprint(to_hex(&hasher.finalize()))
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    to_hex(&hasher.finalize())
}

fn to_hex(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn deploy_hash_is_stable_and_fixed_width() {
        let a = deploy_hash("v1");
        let b = deploy_hash("v1");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn distinct_identities_hash_apart() {
        assert_ne!(deploy_hash("v1"), deploy_hash("v2"));
    }

    #[test]
    fn fingerprint_tracks_every_input() {
        let entry = PathBuf::from("/app/routes/index.ts");
        let options = CompilerOptions::default();
        let hashes = vec![content_hash(b"a"), content_hash(b"b")];

        let base = fingerprint(&entry, &options, &hashes);
        assert_eq!(base, fingerprint(&entry, &options, &hashes));

        // Entry path changes the fingerprint
        let other_entry = PathBuf::from("/app/routes/about.ts");
        assert_ne!(base, fingerprint(&other_entry, &options, &hashes));

        // A changed dependency changes the fingerprint
        let changed = vec![content_hash(b"a"), content_hash(b"b2")];
        assert_ne!(base, fingerprint(&entry, &options, &changed));

        // Options change the fingerprint
        let mut remapped = CompilerOptions::default();
        remapped
            .paths
            .insert("lib/*".into(), vec!["./vendor/*".into()]);
        assert_ne!(base, fingerprint(&entry, &remapped, &hashes));
    }
}
