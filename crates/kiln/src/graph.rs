//! Module graph construction
//!
//! Walks the import graph from an entry module, interning each module once
//! by canonical path, classifying specifiers through the resolver, and
//! producing a dependency-first emission order. Cycles are detected here and
//! reported with the offending chain.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use log::{debug, trace};
use petgraph::{
    algo::{tarjan_scc, toposort},
    graph::{DiGraph, NodeIndex},
};
use regex::Regex;

use crate::{
    compiler::CompileError,
    config::CompilerOptions,
    digest,
    resolver::{ModuleResolver, Resolution},
    types::{ExternalImports, FxIndexMap},
};

/// Matches `import ... from '...'`, `import '...'`
static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*import\s+(?:[^'"]+?\s+from\s+)?['"]([^'"]+)['"]\s*;?\s*$"#)
        .expect("import pattern compiles")
});

/// Matches `export ... from '...'` re-exports
static EXPORT_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*export\s+(?:\{[^}]*\}|\*)\s+from\s+['"]([^'"]+)['"]\s*;?\s*$"#)
        .expect("re-export pattern compiles")
});

/// Unique identifier for a module within one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ModuleId(u32);

impl ModuleId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One source module discovered during the graph walk
#[derive(Debug, Clone)]
pub(crate) struct ModuleSource {
    /// Canonical path on disk
    pub(crate) path: PathBuf,
    /// Raw source text
    pub(crate) source: String,
    /// Content hash of the source text, hex-encoded
    pub(crate) hash: String,
}

/// The resolved module graph rooted at an entry module.
#[derive(Debug)]
pub(crate) struct ModuleGraph {
    modules: Vec<ModuleSource>,
    /// Dependency-first emission order; the entry module is last
    order: Vec<ModuleId>,
    entry: ModuleId,
    external: ExternalImports,
}

impl ModuleGraph {
    /// Build the graph by walking imports from `entry`.
    pub(crate) fn build(entry: &Path, options: &CompilerOptions) -> Result<ModuleGraph, CompileError> {
        let entry_path = entry
            .canonicalize()
            .map_err(|_| CompileError::EntryNotFound {
                path: entry.to_path_buf(),
            })?;
        let mut builder = GraphBuilder::new(options.clone());
        let entry_id = builder.visit(&entry_path)?;
        builder.finish(entry_id)
    }

    pub(crate) fn entry(&self) -> ModuleId {
        self.entry
    }

    /// Modules in dependency-first emission order
    pub(crate) fn in_order(&self) -> impl Iterator<Item = (ModuleId, &ModuleSource)> {
        self.order.iter().map(|id| (*id, &self.modules[id.index()]))
    }

    /// Content hashes of every module, in emission order
    pub(crate) fn module_hashes(&self) -> Vec<String> {
        self.order
            .iter()
            .map(|id| self.modules[id.index()].hash.clone())
            .collect()
    }

    pub(crate) fn external(&self) -> &ExternalImports {
        &self.external
    }

    pub(crate) fn into_external(self) -> ExternalImports {
        self.external
    }
}

struct GraphBuilder {
    resolver: ModuleResolver,
    modules: Vec<ModuleSource>,
    ids_by_path: FxIndexMap<PathBuf, ModuleId>,
    edges: Vec<(ModuleId, ModuleId)>,
    external: ExternalImports,
}

impl GraphBuilder {
    fn new(options: CompilerOptions) -> GraphBuilder {
        GraphBuilder {
            resolver: ModuleResolver::new(options),
            modules: Vec::new(),
            ids_by_path: FxIndexMap::default(),
            edges: Vec::new(),
            external: ExternalImports::default(),
        }
    }

    /// Intern `path`, reading and scanning it on first sight, then recurse
    /// into its module imports.
    fn visit(&mut self, path: &Path) -> Result<ModuleId, CompileError> {
        if let Some(id) = self.ids_by_path.get(path) {
            return Ok(*id);
        }

        let source = fs::read_to_string(path).map_err(|source| CompileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let id = ModuleId(self.modules.len() as u32);
        self.ids_by_path.insert(path.to_path_buf(), id);
        self.modules.push(ModuleSource {
            path: path.to_path_buf(),
            hash: digest::content_hash(source.as_bytes()),
            source,
        });
        debug!("discovered module {}", path.display());

        let importer_dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let specifiers = scan_specifiers(&self.modules[id.index()].source);
        for specifier in specifiers {
            trace!("{} imports '{specifier}'", path.display());
            match self.resolver.resolve(&specifier, &importer_dir) {
                Resolution::Module(dep_path) => {
                    let dep = self.visit(&dep_path)?;
                    self.edges.push((id, dep));
                }
                Resolution::External(candidates) => {
                    self.external
                        .entry(specifier)
                        .or_default()
                        .extend(candidates);
                }
                Resolution::Unresolved => {
                    return Err(CompileError::UnresolvedImport {
                        specifier,
                        importer: path.to_path_buf(),
                    });
                }
            }
        }
        Ok(id)
    }

    /// Topologically order the modules; a cycle aborts the compile.
    fn finish(self, entry: ModuleId) -> Result<ModuleGraph, CompileError> {
        let mut graph: DiGraph<ModuleId, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..self.modules.len())
            .map(|i| graph.add_node(ModuleId(i as u32)))
            .collect();
        for (from, to) in &self.edges {
            graph.add_edge(nodes[from.index()], nodes[to.index()], ());
        }

        let sorted = toposort(&graph, None).map_err(|_| {
            let cycle = tarjan_scc(&graph)
                .into_iter()
                .find(|scc| scc.len() > 1)
                .unwrap_or_default();
            CompileError::CircularImport {
                cycle: cycle
                    .iter()
                    .map(|node| self.modules[graph[*node].index()].path.display().to_string())
                    .collect::<Vec<_>>()
                    .join(" -> "),
            }
        })?;

        // Edges point importer -> imported, so reversing the topological
        // order yields dependencies before their importers.
        let order: Vec<ModuleId> = sorted.into_iter().rev().map(|node| graph[node]).collect();
        Ok(ModuleGraph {
            modules: self.modules,
            order,
            entry,
            external: self.external,
        })
    }
}

/// Extract import and re-export specifiers from source text, in order of
/// appearance.
fn scan_specifiers(source: &str) -> Vec<String> {
    let mut specifiers = Vec::new();
    for line in source.lines() {
        if let Some(captures) = IMPORT_RE.captures(line) {
            specifiers.push(captures[1].to_owned());
        } else if let Some(captures) = EXPORT_FROM_RE.captures(line) {
            specifiers.push(captures[1].to_owned());
        }
    }
    specifiers
}

/// True when the line is an import or re-export statement that the emitted
/// bundle must not carry verbatim.
pub(crate) fn is_import_line(line: &str) -> bool {
    IMPORT_RE.is_match(line) || EXPORT_FROM_RE.is_match(line)
}
