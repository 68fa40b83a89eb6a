//! Shared type definitions for the kiln crate
//!
//! This module contains common types that are used across multiple components
//! of the bundler, ensuring consistency and avoiding circular dependencies.

use std::{fmt, path::PathBuf};

use indexmap::IndexMap;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type alias for FxHasher-based IndexMap
pub type FxIndexMap<K, V> = IndexMap<K, V, std::hash::BuildHasherDefault<FxHasher>>;

/// External import manifest: specifier -> ordered candidate paths.
///
/// Key uniqueness holds, but value lists may contain duplicates when the same
/// specifier is imported from several modules. Order is significant: the
/// loader tries candidates first to last and the first match wins.
pub type ExternalImports = FxIndexMap<String, Vec<String>>;

/// The compiled, single-unit representation of a module graph plus its
/// unresolved external import manifest.
///
/// Produced once per compile and immutable thereafter. Serialization is part
/// of the contract so the bundle cache can persist it; the manifest's
/// insertion order survives a round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    /// Executable module source text
    pub code: String,
    /// Imports that were not inlined into `code`
    pub external: ExternalImports,
}

impl Bundle {
    /// A self-contained bundle needs no import resolution at load time.
    pub fn is_self_contained(&self) -> bool {
        self.external.is_empty()
    }
}

/// An external import specifier resolved to a concrete module on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImport {
    /// The specifier as written in the source
    pub specifier: String,
    /// The concrete path the specifier resolved to
    pub path: PathBuf,
}

/// Resolved import table handed to the instantiator in dynamic mode.
pub type ImportTable = FxIndexMap<String, ResolvedImport>;

/// Output of rendering a component default export.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderedComponent {
    pub html: String,
    pub css: Option<String>,
    pub head: Option<String>,
}

/// The distinguished default export of a live module.
///
/// Modeled as a tagged variant rather than duck-typing so consumers can
/// exhaustively handle both shapes.
pub enum DefaultExport {
    /// A callable function export
    Callable(Box<dyn Fn(&[Value]) -> Value + Send + Sync>),
    /// A render-capable component export
    Renderable(Box<dyn Fn(Option<&Value>) -> RenderedComponent + Send + Sync>),
}

impl DefaultExport {
    /// Check if the default export is a plain callable
    pub fn is_callable(&self) -> bool {
        matches!(self, DefaultExport::Callable(_))
    }

    /// Check if the default export is a render-capable component
    pub fn is_renderable(&self) -> bool {
        matches!(self, DefaultExport::Renderable(_))
    }

    /// Invoke a callable export. Returns `None` for renderable exports.
    pub fn call(&self, args: &[Value]) -> Option<Value> {
        match self {
            DefaultExport::Callable(f) => Some(f(args)),
            DefaultExport::Renderable(_) => None,
        }
    }

    /// Render a component export. Returns `None` for callable exports.
    pub fn render(&self, props: Option<&Value>) -> Option<RenderedComponent> {
        match self {
            DefaultExport::Callable(_) => None,
            DefaultExport::Renderable(f) => Some(f(props)),
        }
    }
}

impl fmt::Debug for DefaultExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultExport::Callable(_) => f.write_str("DefaultExport::Callable"),
            DefaultExport::Renderable(_) => f.write_str("DefaultExport::Renderable"),
        }
    }
}

impl fmt::Display for DefaultExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultExport::Callable(_) => write!(f, "callable"),
            DefaultExport::Renderable(_) => write!(f, "renderable"),
        }
    }
}

/// The instantiated result of loading a bundle.
///
/// Owned by the caller once returned; the orchestrator holds no reference
/// after `process` completes.
#[derive(Debug)]
pub struct LiveModule {
    /// Named exports and their values
    pub exports: FxIndexMap<String, Value>,
    /// The distinguished default export
    pub default: DefaultExport,
}

impl LiveModule {
    /// Look up a named export
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.exports.get(name)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn default_export_dispatch() {
        let callable = DefaultExport::Callable(Box::new(|_| json!(42)));
        assert!(callable.is_callable());
        assert!(!callable.is_renderable());
        assert_eq!(callable.call(&[]), Some(json!(42)));
        assert!(callable.render(None).is_none());

        let renderable = DefaultExport::Renderable(Box::new(|_| RenderedComponent {
            html: "<p>hi</p>".into(),
            ..Default::default()
        }));
        assert!(renderable.is_renderable());
        assert!(renderable.call(&[]).is_none());
        assert_eq!(
            renderable.render(None).map(|r| r.html),
            Some("<p>hi</p>".into())
        );
    }

    #[test]
    fn bundle_manifest_round_trips_in_order() {
        let mut external = ExternalImports::default();
        external.insert("svelte".into(), vec!["npm:svelte@4".into()]);
        external.insert("left-pad".into(), vec!["a".into(), "b".into(), "a".into()]);
        let bundle = Bundle {
            code: "export default () => 1;".into(),
            external,
        };

        let bytes = serde_json::to_vec(&bundle).expect("bundle serializes");
        let back: Bundle = serde_json::from_slice(&bytes).expect("bundle deserializes");
        assert_eq!(back, bundle);
        let keys: Vec<_> = back.external.keys().cloned().collect();
        assert_eq!(keys, vec!["svelte".to_owned(), "left-pad".to_owned()]);
    }
}
