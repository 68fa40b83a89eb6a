//! Configuration for the bundler, cache, and loader
//!
//! Instance-level defaults live in [`Config`]; per-call overrides are merged
//! through [`CompilerOptions::merged`], an explicit function with documented
//! precedence rather than ambient spread semantics.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

use crate::{storage::StorageError, types::FxIndexMap};

/// Errors raised while assembling or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// Caching was requested but the backing storage could not be opened.
    #[error("cache storage unavailable: {0}")]
    CacheStorage(#[from] StorageError),
}

/// Options consumed by the compiler to influence bundling.
///
/// These never trigger whole-program type validation; they only steer module
/// resolution (probe extensions and specifier remapping).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// File extensions probed when resolving an extensionless specifier,
    /// in order
    pub extensions: Vec<String>,
    /// Specifier remapping table: pattern -> substitute candidates, tried
    /// in order. Patterns may end in `*` to capture a suffix.
    pub paths: FxIndexMap<String, Vec<String>>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["ts".into(), "js".into(), "svelte".into()],
            paths: FxIndexMap::default(),
        }
    }
}

/// Per-call overrides for [`CompilerOptions`].
///
/// `None` fields leave the instance-level value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompilerOverrides {
    pub extensions: Option<Vec<String>>,
    pub paths: Option<FxIndexMap<String, Vec<String>>>,
}

impl CompilerOptions {
    /// Merge per-call overrides over these options, producing a new value.
    ///
    /// Precedence: the override wins on key collision. The merge is flat
    /// except for `paths`, which merges one level deep: remap patterns from
    /// both sides are kept, and a pattern present in both takes the
    /// override's candidate list. Neither input is mutated.
    pub fn merged(&self, overrides: &CompilerOverrides) -> CompilerOptions {
        let extensions = overrides
            .extensions
            .clone()
            .unwrap_or_else(|| self.extensions.clone());
        let paths = match &overrides.paths {
            None => self.paths.clone(),
            Some(over) => {
                let mut merged = self.paths.clone();
                for (pattern, candidates) in over {
                    merged.insert(pattern.clone(), candidates.clone());
                }
                merged
            }
        };
        CompilerOptions { extensions, paths }
    }

    /// Canonical representation used for fingerprinting.
    ///
    /// Probe extensions keep their order (it affects resolution); remap
    /// patterns are sorted so two logically equal tables digest alike.
    pub(crate) fn cache_key_repr(&self) -> String {
        let mut repr = String::from("ext=");
        repr.push_str(&self.extensions.join(","));
        let mut patterns: Vec<_> = self.paths.iter().collect();
        patterns.sort_by_key(|(pattern, _)| pattern.as_str());
        for (pattern, candidates) in patterns {
            repr.push_str(";path=");
            repr.push_str(pattern);
            repr.push_str("->");
            repr.push_str(&candidates.join(","));
        }
        repr
    }
}

/// Top-level configuration for a [`Kiln`](crate::orchestrator::Kiln)
/// instance.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory backing the persistent bundle cache. Ignored unless
    /// `deploy_id` is set; defaults to the platform cache directory.
    pub cache_path: Option<PathBuf>,
    /// Deployment identity scoping the cache. Caching is disabled entirely
    /// when absent.
    pub deploy_id: Option<String>,
    /// Resolve external imports at load time instead of requiring them to
    /// be embedded
    pub dynamic_imports: bool,
    /// Instance-level compiler options
    pub compiler: CompilerOptions,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
