//! Module loading: from compiled bundle to live module
//!
//! Two collaborator seams live here. [`ImportResolver`] turns manifest
//! entries into concrete modules at load time (dynamic mode only), and
//! [`ModuleInstantiator`] turns bundle code into a [`LiveModule`]. The
//! loader itself only enforces policy: static bundles must be
//! self-contained, dynamic bundles get their manifest resolved first.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

use log::debug;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::types::{
    Bundle, DefaultExport, FxIndexMap, ImportTable, LiveModule, RenderedComponent, ResolvedImport,
};

/// Raised when a bundle cannot be instantiated. Fatal to the call; never
/// retried automatically.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Dynamic resolution was requested but a specifier matched nothing
    #[error("cannot resolve external import '{specifier}' (tried: {tried})")]
    UnresolvedSpecifier { specifier: String, tried: String },
    /// A static bundle still references imports it expected to be embedded
    #[error(
        "static bundle references external imports ({specifiers}); \
         enable dynamic imports or inline them"
    )]
    ExternalsInStaticBundle { specifiers: String },
    /// The instantiator rejected the bundle code
    #[error("failed to instantiate bundle: {detail}")]
    Instantiation { detail: String },
}

/// Resolves one external-import manifest entry to a concrete module.
pub trait ImportResolver: Send + Sync {
    /// Try `candidates` in order; the first match wins.
    fn resolve(&self, specifier: &str, candidates: &[String]) -> Result<ResolvedImport, LoadError>;
}

/// Instantiates bundle code as a live module.
///
/// `imports` is `Some` exactly when the loader ran in dynamic mode and
/// resolved the manifest.
pub trait ModuleInstantiator: Send + Sync {
    fn instantiate(&self, code: &str, imports: Option<&ImportTable>)
    -> Result<LiveModule, LoadError>;
}

/// Applies the loading policy and drives the collaborators.
#[derive(Clone)]
pub struct ModuleLoader {
    resolver: Arc<dyn ImportResolver>,
    instantiator: Arc<dyn ModuleInstantiator>,
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader").finish_non_exhaustive()
    }
}

impl ModuleLoader {
    pub fn new(
        resolver: Arc<dyn ImportResolver>,
        instantiator: Arc<dyn ModuleInstantiator>,
    ) -> ModuleLoader {
        ModuleLoader {
            resolver,
            instantiator,
        }
    }

    /// Instantiate a bundle under the given loading mode.
    ///
    /// Static mode performs a single instantiation step and fails if the
    /// bundle is not self-contained. Dynamic mode resolves every manifest
    /// entry first and instantiates against the resolved import table. An
    /// empty manifest loads in both modes with zero resolution steps.
    pub fn load(&self, bundle: &Bundle, dynamic_imports: bool) -> Result<LiveModule, LoadError> {
        if !dynamic_imports {
            if !bundle.is_self_contained() {
                let specifiers = bundle
                    .external
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(LoadError::ExternalsInStaticBundle { specifiers });
            }
            return self.instantiator.instantiate(&bundle.code, None);
        }

        let mut table = ImportTable::default();
        for (specifier, candidates) in &bundle.external {
            let resolved = self.resolver.resolve(specifier, candidates)?;
            debug!(
                "resolved external '{specifier}' -> {}",
                resolved.path.display()
            );
            table.insert(specifier.clone(), resolved);
        }
        self.instantiator.instantiate(&bundle.code, Some(&table))
    }
}

/// Filesystem-backed import resolver.
///
/// Absolute candidates are checked directly; relative candidates are tried
/// against each configured root in order.
#[derive(Debug, Clone)]
pub struct PathResolver {
    roots: Vec<PathBuf>,
}

impl Default for PathResolver {
    /// Resolve relative candidates against the working directory.
    fn default() -> Self {
        PathResolver {
            roots: vec![PathBuf::from(".")],
        }
    }
}

impl PathResolver {
    pub fn new(roots: Vec<PathBuf>) -> PathResolver {
        PathResolver { roots }
    }
}

impl ImportResolver for PathResolver {
    fn resolve(&self, specifier: &str, candidates: &[String]) -> Result<ResolvedImport, LoadError> {
        for candidate in candidates {
            let candidate_path = Path::new(candidate);
            if candidate_path.is_absolute() {
                if candidate_path.is_file() {
                    return Ok(ResolvedImport {
                        specifier: specifier.to_owned(),
                        path: candidate_path.to_path_buf(),
                    });
                }
                continue;
            }
            for root in &self.roots {
                let joined = root.join(candidate_path);
                if joined.is_file() {
                    return Ok(ResolvedImport {
                        specifier: specifier.to_owned(),
                        path: joined,
                    });
                }
            }
        }
        Err(LoadError::UnresolvedSpecifier {
            specifier: specifier.to_owned(),
            tried: candidates.join(", "),
        })
    }
}

static NAMED_EXPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*export\s+(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*(.+?);?\s*$")
        .expect("named export pattern compiles")
});

static DEFAULT_RENDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^\s*export\s+default\s+\{\s*render\s*:\s*\(\s*\w*\s*\)\s*=>\s*(".*")\s*,?\s*\}\s*;?\s*$"#,
    )
    .expect("render export pattern compiles")
});

static DEFAULT_ARROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*export\s+default\s+\(\s*\)\s*=>\s*(.+?);?\s*$")
        .expect("arrow export pattern compiles")
});

static DEFAULT_LITERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*export\s+default\s+(.+?);?\s*$")
        .expect("default export pattern compiles")
});

/// Reference instantiator for the literal-export subset of bundle code.
///
/// Understands named exports bound to literal values, a default arrow
/// returning a literal (a callable), and a default `{ render: ... }` object
/// returning markup (a renderable component). Anything richer needs an
/// embedding runtime and is rejected with a diagnostic; embedders with a
/// real script engine provide their own [`ModuleInstantiator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralInstantiator;

impl LiteralInstantiator {
    fn named_exports(code: &str) -> Result<FxIndexMap<String, Value>, LoadError> {
        let mut exports = FxIndexMap::default();
        for captures in NAMED_EXPORT_RE.captures_iter(code) {
            let name = captures[1].to_owned();
            let raw = captures[2].trim();
            let value: Value =
                serde_json::from_str(raw).map_err(|_| LoadError::Instantiation {
                    detail: format!("export '{name}' is not a literal value: {raw}"),
                })?;
            exports.insert(name, value);
        }
        Ok(exports)
    }

    fn default_export(code: &str) -> Result<DefaultExport, LoadError> {
        if let Some(captures) = DEFAULT_RENDER_RE.captures(code) {
            let html: String =
                serde_json::from_str(&captures[1]).map_err(|_| LoadError::Instantiation {
                    detail: "render body is not a string literal".to_owned(),
                })?;
            return Ok(DefaultExport::Renderable(Box::new(move |_props| {
                RenderedComponent {
                    html: html.clone(),
                    css: None,
                    head: None,
                }
            })));
        }
        if let Some(captures) = DEFAULT_ARROW_RE.captures(code) {
            let value = parse_literal(&captures[1])?;
            return Ok(DefaultExport::Callable(Box::new(move |_args| {
                value.clone()
            })));
        }
        if let Some(captures) = DEFAULT_LITERAL_RE.captures(code) {
            let value = parse_literal(&captures[1])?;
            return Ok(DefaultExport::Callable(Box::new(move |_args| {
                value.clone()
            })));
        }
        Err(LoadError::Instantiation {
            detail: "bundle has no default export".to_owned(),
        })
    }
}

fn parse_literal(raw: &str) -> Result<Value, LoadError> {
    let raw = raw.trim();
    serde_json::from_str(raw).map_err(|_| LoadError::Instantiation {
        detail: format!("default export is not a literal value: {raw}"),
    })
}

impl ModuleInstantiator for LiteralInstantiator {
    fn instantiate(
        &self,
        code: &str,
        _imports: Option<&ImportTable>,
    ) -> Result<LiveModule, LoadError> {
        Ok(LiveModule {
            exports: LiteralInstantiator::named_exports(code)?,
            default: LiteralInstantiator::default_export(code)?,
        })
    }
}
