//! kiln: compile a module graph into a single bundle, cache it per
//! deployment, and load it as a live module
//!
//! The public entry point is [`Kiln`]: configure it once, then call
//! [`Kiln::process`] with an entry path to get back a [`LiveModule`].
//! Compiled bundles are persisted in a content-addressed cache scoped to a
//! deployment identity; entries belonging to older deployments are swept on
//! the first call of each instance. Loading is a caller-facing policy
//! choice between static (imports baked in) and dynamic (imports resolved
//! at load time).

pub mod cache;
mod codegen;
pub mod compiler;
pub mod config;
pub mod digest;
mod graph;
pub mod loader;
pub mod orchestrator;
mod resolver;
pub mod storage;
pub mod types;

pub use crate::{
    compiler::{CompileError, CompileRequest, Compiler, GraphCompiler},
    config::{CompilerOptions, CompilerOverrides, Config, ConfigError},
    loader::{
        ImportResolver, LiteralInstantiator, LoadError, ModuleInstantiator, ModuleLoader,
        PathResolver,
    },
    orchestrator::{Kiln, KilnError},
    types::{Bundle, DefaultExport, LiveModule, RenderedComponent},
};
