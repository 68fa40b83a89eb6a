//! Bundle emission
//!
//! Mechanical concatenation of an already-ordered module graph. All
//! decisions (ordering, inlining, external classification) were made during
//! graph construction; emission just follows them.
//!
//! Import lines never survive into the bundle: inlined modules are already
//! present above their importers, and external specifiers live in the
//! manifest. Non-entry modules additionally lose their `export` keywords so
//! their declarations become plain top-level bindings; the entry module's
//! exports are the bundle's public surface and are kept verbatim.

use log::debug;

use crate::graph::{ModuleGraph, is_import_line};

/// Emit bundled source text from a resolved module graph.
///
/// Output is identical whether the bundle will be loaded statically or
/// dynamically; the loading mode is load-time policy, not a compile input.
pub(crate) fn emit(graph: &ModuleGraph) -> String {
    let mut out = String::new();
    for (id, module) in graph.in_order() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("// module: {}\n", module.path.display()));
        let is_entry = id == graph.entry();
        for line in module.source.lines() {
            if is_import_line(line) {
                continue;
            }
            if !is_entry {
                if let Some(rest) = strip_export(line) {
                    match rest {
                        // A non-entry default export has no binding an
                        // importer could reach; drop it.
                        None => continue,
                        Some(stripped) => {
                            out.push_str(&stripped);
                            out.push('\n');
                            continue;
                        }
                    }
                }
            }
            out.push_str(line);
            out.push('\n');
        }
    }
    debug!("emitted bundle of {} bytes", out.len());
    out
}

/// For an `export`-prefixed declaration line, return the line without the
/// keyword; `None` inside means the line was a default export.
fn strip_export(line: &str) -> Option<Option<String>> {
    let indent_len = line.len() - line.trim_start().len();
    let (indent, rest) = line.split_at(indent_len);
    let rest = rest.strip_prefix("export ")?;
    if rest.trim_start().starts_with("default") {
        return Some(None);
    }
    Some(Some(format!("{indent}{rest}")))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::config::CompilerOptions;

    #[test]
    fn strip_export_handles_declarations_and_default() {
        assert_eq!(
            strip_export("export const x = 1;"),
            Some(Some("const x = 1;".to_owned()))
        );
        assert_eq!(strip_export("export default () => 1;"), Some(None));
        assert_eq!(strip_export("const x = 1;"), None);
    }

    #[test]
    fn emission_inlines_dependencies_and_keeps_entry_exports() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("greet.ts"),
            "export const greeting = \"hello\";\n",
        )
        .unwrap();
        let entry = dir.path().join("app.ts");
        fs::write(
            &entry,
            "import {greeting} from './greet';\nexport const name = \"app\";\nexport default () => \"hello\";\n",
        )
        .unwrap();

        let graph = ModuleGraph::build(&entry, &CompilerOptions::default()).unwrap();
        let code = emit(&graph);

        // Dependency declaration is inlined without its export keyword
        assert!(code.contains("const greeting = \"hello\";"));
        assert!(!code.contains("export const greeting"));
        // Entry exports survive verbatim
        assert!(code.contains("export const name = \"app\";"));
        assert!(code.contains("export default () => \"hello\";"));
        // No import statements remain
        assert!(!code.contains("import "));
        // Dependency text precedes entry text
        let dep_at = code.find("const greeting").unwrap();
        let entry_at = code.find("export const name").unwrap();
        assert!(dep_at < entry_at);
    }

    #[test]
    fn external_import_lines_are_dropped_from_code() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("app.ts");
        fs::write(
            &entry,
            "import {onMount} from 'svelte';\nexport default () => 1;\n",
        )
        .unwrap();

        let graph = ModuleGraph::build(&entry, &CompilerOptions::default()).unwrap();
        let code = emit(&graph);
        assert!(!code.contains("svelte"));
        assert!(graph.external().contains_key("svelte"));
    }
}
