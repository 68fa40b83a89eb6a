//! Compiler contract and the graph-backed reference implementation
//!
//! The orchestrator only depends on the [`Compiler`] trait, so an embedder
//! can substitute a richer compiler (a real parser, tree shaking, source
//! transforms) without touching caching or loading. The contract requires
//! determinism for a fixed (entry, options, filesystem snapshot) triple;
//! without it, cache fingerprints would be meaningless.

use std::{io, path::PathBuf};

use log::debug;
use thiserror::Error;

use crate::{
    codegen,
    config::CompilerOptions,
    digest::{self, Fingerprint},
    graph::ModuleGraph,
    types::Bundle,
};

/// One compilation invocation. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    /// Absolute path of the entry module
    pub entry: PathBuf,
    /// Merged compiler options for this invocation
    pub options: CompilerOptions,
    /// Load-time import policy, carried for compilers that bundle
    /// differently per mode. The reference compiler emits identical output
    /// in both modes.
    pub dynamic_imports: bool,
}

/// Raised when the module graph cannot be fully resolved or transformed.
///
/// Never cached: a failed compile must not populate a cache entry.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("entry module {path} does not exist")]
    EntryNotFound { path: PathBuf },
    #[error("failed to read module {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot resolve import '{specifier}' from {}", importer.display())]
    UnresolvedImport {
        specifier: String,
        importer: PathBuf,
    },
    #[error("circular import: {cycle}")]
    CircularImport { cycle: String },
}

/// Produces a [`Bundle`] from an entry module, plus the fingerprint the
/// cache keys it under.
pub trait Compiler: Send + Sync {
    /// Derive the cache fingerprint for a request without emitting code.
    ///
    /// Must agree with [`Compiler::compile`] about the module graph: an
    /// unchanged graph yields an unchanged fingerprint, and any input that
    /// would change the emitted bundle changes it.
    fn fingerprint(&self, request: &CompileRequest) -> Result<Fingerprint, CompileError>;

    /// Compile the module graph rooted at the request's entry into a bundle.
    fn compile(&self, request: &CompileRequest) -> Result<Bundle, CompileError>;
}

/// Reference compiler: resolves the import graph on disk and concatenates
/// modules dependency-first.
///
/// Stateless; `fingerprint` followed by `compile` walks the graph twice.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphCompiler;

impl Compiler for GraphCompiler {
    fn fingerprint(&self, request: &CompileRequest) -> Result<Fingerprint, CompileError> {
        let graph = ModuleGraph::build(&request.entry, &request.options)?;
        Ok(digest::fingerprint(
            &request.entry,
            &request.options,
            &graph.module_hashes(),
        ))
    }

    fn compile(&self, request: &CompileRequest) -> Result<Bundle, CompileError> {
        let graph = ModuleGraph::build(&request.entry, &request.options)?;
        let code = codegen::emit(&graph);
        debug!(
            "compiled {} with {} external import(s)",
            request.entry.display(),
            graph.external().len()
        );
        Ok(Bundle {
            code,
            external: graph.into_external(),
        })
    }
}
