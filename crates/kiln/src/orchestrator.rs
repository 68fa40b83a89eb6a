//! Public entry point wiring compiler, cache, and loader
//!
//! [`Kiln`] merges configuration, decides whether caching is active,
//! triggers cache maintenance once per instance lifetime, and sequences
//! compile -> cache -> load. The cache is consulted cache-aside:
//! compile-on-miss, serve-on-hit, and never a correctness dependency: any
//! cache failure degrades to compiling from source.

use std::{
    path::Path,
    sync::{Arc, Mutex, OnceLock},
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    cache::BundleCache,
    compiler::{CompileError, CompileRequest, Compiler, GraphCompiler},
    config::{CompilerOverrides, Config, ConfigError},
    digest::{self, DeployHash},
    loader::{
        ImportResolver, LiteralInstantiator, LoadError, ModuleInstantiator, ModuleLoader,
        PathResolver,
    },
    storage::{FsStore, Storage},
    types::{Bundle, LiveModule},
};

/// Errors surfaced by [`Kiln::process`].
///
/// Cache failures never appear here; they degrade internally per policy.
#[derive(Debug, Error)]
pub enum KilnError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Compiles entry modules into bundles and instantiates them, with an
/// optional deployment-scoped persistent cache in between.
///
/// One instance serves many concurrent `process` calls; all methods take
/// `&self`.
pub struct Kiln {
    config: Config,
    compiler: Box<dyn Compiler>,
    resolver: Arc<dyn ImportResolver>,
    instantiator: Arc<dyn ModuleInstantiator>,
    cache: Option<BundleCache>,
    /// Deploy hash memo; re-hashing the same identity every call is wasted
    /// work
    deploy_hash: OnceLock<DeployHash>,
    /// Sweep readiness gate. Set only after a sweep completes successfully,
    /// so an interrupted sweep is retried on a later call. The mutex also
    /// serializes concurrent first calls: whoever loses the race blocks
    /// until the winner's sweep finishes (or fails) before proceeding.
    swept: Mutex<bool>,
}

impl std::fmt::Debug for Kiln {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kiln")
            .field("config", &self.config)
            .field("caching", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl Kiln {
    /// Build an instance with the reference collaborators and, when a
    /// deploy identity is configured, a filesystem-backed cache.
    ///
    /// An unreachable cache directory is a configuration error: the caller
    /// asked for caching and did not get it.
    pub fn new(config: Config) -> Result<Kiln, ConfigError> {
        let cache = if config.deploy_id.is_some() {
            let root = match &config.cache_path {
                Some(path) => path.clone(),
                None => FsStore::default_root()?,
            };
            Some(BundleCache::new(Arc::new(FsStore::open(root)?)))
        } else {
            None
        };
        Ok(Kiln::assemble(config, cache))
    }

    /// Build an instance over caller-supplied storage.
    ///
    /// Caching still requires a deploy identity; without one the storage is
    /// never touched.
    pub fn with_storage(config: Config, store: Arc<dyn Storage>) -> Kiln {
        let cache = config
            .deploy_id
            .is_some()
            .then(|| BundleCache::new(store));
        Kiln::assemble(config, cache)
    }

    fn assemble(config: Config, cache: Option<BundleCache>) -> Kiln {
        if config.deploy_id.is_none() && config.cache_path.is_some() {
            debug!("cache path configured without a deploy identity; caching disabled");
        }
        Kiln {
            config,
            compiler: Box::new(GraphCompiler),
            resolver: Arc::new(PathResolver::default()),
            instantiator: Arc::new(LiteralInstantiator),
            cache,
            deploy_hash: OnceLock::new(),
            swept: Mutex::new(false),
        }
    }

    /// Replace the compiler collaborator.
    pub fn with_compiler(mut self, compiler: Box<dyn Compiler>) -> Kiln {
        self.compiler = compiler;
        self
    }

    /// Replace the dynamic-import resolver collaborator.
    pub fn with_import_resolver(mut self, resolver: Arc<dyn ImportResolver>) -> Kiln {
        self.resolver = resolver;
        self
    }

    /// Replace the instantiator collaborator.
    pub fn with_instantiator(mut self, instantiator: Arc<dyn ModuleInstantiator>) -> Kiln {
        self.instantiator = instantiator;
        self
    }

    /// Compile (or serve from cache) and instantiate the module graph
    /// rooted at `entry`, returning the live module.
    pub fn process(&self, entry: &Path) -> Result<LiveModule, KilnError> {
        self.process_with(entry, &CompilerOverrides::default())
    }

    /// Like [`Kiln::process`], with per-call compiler option overrides
    /// merged over the instance defaults (override wins per key).
    pub fn process_with(
        &self,
        entry: &Path,
        overrides: &CompilerOverrides,
    ) -> Result<LiveModule, KilnError> {
        let bundle = self.bundle_with(entry, overrides)?;
        let loader = ModuleLoader::new(Arc::clone(&self.resolver), Arc::clone(&self.instantiator));
        Ok(loader.load(&bundle, self.config.dynamic_imports)?)
    }

    /// Compile the entry into a bundle without instantiating it, going
    /// through the cache exactly as [`Kiln::process`] does.
    pub fn bundle(&self, entry: &Path) -> Result<Bundle, KilnError> {
        self.bundle_with(entry, &CompilerOverrides::default())
    }

    fn bundle_with(
        &self,
        entry: &Path,
        overrides: &CompilerOverrides,
    ) -> Result<Bundle, KilnError> {
        let request = CompileRequest {
            entry: entry.to_path_buf(),
            options: self.config.compiler.merged(overrides),
            dynamic_imports: self.config.dynamic_imports,
        };

        let Some((cache, deploy)) = self.active_cache() else {
            return Ok(self.compiler.compile(&request)?);
        };
        self.ensure_swept(cache, deploy);
        Ok(self.compile_cached(cache, deploy, &request)?)
    }

    /// The cache together with the memoized deploy hash, or `None` when no
    /// deployment identity is configured and caching is disabled entirely.
    fn active_cache(&self) -> Option<(&BundleCache, &DeployHash)> {
        let cache = self.cache.as_ref()?;
        let identity = self.config.deploy_id.as_deref()?;
        let deploy = self
            .deploy_hash
            .get_or_init(|| digest::deploy_hash(identity));
        Some((cache, deploy))
    }

    /// Run the stale-deployment sweep at most once per instance lifetime.
    fn ensure_swept(&self, cache: &BundleCache, deploy: &DeployHash) {
        let mut swept = match self.swept.lock() {
            Ok(guard) => guard,
            // A poisoned gate means a sweep attempt panicked; the flag was
            // never set, so retry below.
            Err(poisoned) => poisoned.into_inner(),
        };
        if *swept {
            return;
        }
        match cache.sweep(deploy) {
            Ok(removed) => {
                info!("cache sweep removed {removed} stale entries");
                *swept = true;
            }
            Err(err) => {
                warn!("cache sweep failed, will retry on a later call: {err}");
            }
        }
    }

    /// Cache-aside compile: serve-on-hit, compile-on-miss, write-through.
    fn compile_cached(
        &self,
        cache: &BundleCache,
        deploy: &DeployHash,
        request: &CompileRequest,
    ) -> Result<Bundle, CompileError> {
        let fingerprint = self.compiler.fingerprint(request)?;
        match cache.get(deploy, &fingerprint) {
            Ok(Some(bundle)) => {
                debug!("cache hit for {fingerprint}");
                return Ok(bundle);
            }
            Ok(None) => debug!("cache miss for {fingerprint}"),
            Err(err) => warn!("cache read failed, compiling from source: {err}"),
        }

        let bundle = self.compiler.compile(request)?;
        // Writes are gated on compile success only; whether the bundle
        // later instantiates does not affect what is cached.
        if let Err(err) = cache.put(deploy, &fingerprint, &bundle) {
            warn!("cache write failed, returning uncached bundle: {err}");
        }
        Ok(bundle)
    }
}
