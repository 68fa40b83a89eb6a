//! Import specifier resolution
//!
//! Decides, for each specifier found in a module, whether it names another
//! module on disk (to be inlined into the bundle) or an external import
//! (recorded in the manifest and resolved, if at all, at load time).

use std::path::{Path, PathBuf};

use log::debug;

use crate::config::CompilerOptions;

/// Outcome of resolving one import specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// A module on disk, to be inlined into the bundle
    Module(PathBuf),
    /// An external import with its ordered candidate paths
    External(Vec<String>),
    /// A relative specifier that matched nothing on disk
    Unresolved,
}

/// Resolves import specifiers against the filesystem and the configured
/// remapping table.
#[derive(Debug, Clone)]
pub(crate) struct ModuleResolver {
    options: CompilerOptions,
}

impl ModuleResolver {
    pub(crate) fn new(options: CompilerOptions) -> ModuleResolver {
        ModuleResolver { options }
    }

    /// Resolve `specifier` as imported from a module in `importer_dir`.
    ///
    /// Relative and absolute specifiers resolve on disk or not at all. Bare
    /// specifiers first go through the `paths` remapping table; a remap
    /// candidate that exists on disk is inlined like a relative import,
    /// otherwise the candidate list is reported as external. A bare
    /// specifier with no matching remap is external as written.
    pub(crate) fn resolve(&self, specifier: &str, importer_dir: &Path) -> Resolution {
        if is_path_specifier(specifier) {
            return match self.probe(specifier, importer_dir) {
                Some(path) => Resolution::Module(path),
                None => Resolution::Unresolved,
            };
        }

        if let Some(candidates) = self.remap(specifier) {
            for candidate in &candidates {
                if is_path_specifier(candidate) {
                    if let Some(path) = self.probe(candidate, importer_dir) {
                        debug!("remapped '{specifier}' -> {}", path.display());
                        return Resolution::Module(path);
                    }
                }
            }
            return Resolution::External(candidates);
        }

        Resolution::External(vec![specifier.to_owned()])
    }

    /// Apply the longest matching remap pattern, substituting a trailing `*`.
    fn remap(&self, specifier: &str) -> Option<Vec<String>> {
        let mut best: Option<(&str, &Vec<String>, String)> = None;
        for (pattern, candidates) in &self.options.paths {
            let suffix = if let Some(prefix) = pattern.strip_suffix('*') {
                match specifier.strip_prefix(prefix) {
                    Some(rest) => rest.to_owned(),
                    None => continue,
                }
            } else if specifier == pattern {
                String::new()
            } else {
                continue;
            };
            let longer = best
                .as_ref()
                .is_none_or(|(current, _, _)| pattern.len() > current.len());
            if longer {
                best = Some((pattern, candidates, suffix));
            }
        }
        best.map(|(_, candidates, suffix)| {
            candidates
                .iter()
                .map(|candidate| candidate.replace('*', &suffix))
                .collect()
        })
    }

    /// Probe a path specifier on disk: as written, with each configured
    /// extension appended, then as a directory index file.
    fn probe(&self, specifier: &str, importer_dir: &Path) -> Option<PathBuf> {
        let base = if Path::new(specifier).is_absolute() {
            PathBuf::from(specifier)
        } else {
            importer_dir.join(specifier)
        };

        if base.is_file() {
            return canonical(&base);
        }
        for ext in &self.options.extensions {
            let with_ext = base.with_file_name(format!(
                "{}.{ext}",
                base.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
            ));
            if with_ext.is_file() {
                return canonical(&with_ext);
            }
        }
        for ext in &self.options.extensions {
            let index = base.join(format!("index.{ext}"));
            if index.is_file() {
                return canonical(&index);
            }
        }
        None
    }
}

fn is_path_specifier(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || Path::new(specifier).is_absolute()
}

fn canonical(path: &Path) -> Option<PathBuf> {
    path.canonicalize().ok()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::types::FxIndexMap;

    fn options_with_paths(entries: &[(&str, &[&str])]) -> CompilerOptions {
        let mut paths = FxIndexMap::default();
        for (k, v) in entries {
            paths.insert(
                (*k).to_owned(),
                v.iter().map(|s| (*s).to_owned()).collect(),
            );
        }
        CompilerOptions {
            paths,
            ..Default::default()
        }
    }

    #[test]
    fn relative_specifier_probes_extensions_in_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("util.js"), "export const x = 1;").unwrap();
        fs::write(dir.path().join("util.ts"), "export const x = 2;").unwrap();

        let resolver = ModuleResolver::new(CompilerOptions::default());
        // Default probe order is ts before js
        match resolver.resolve("./util", dir.path()) {
            Resolution::Module(path) => assert!(path.to_string_lossy().ends_with("util.ts")),
            other => panic!("expected module resolution, got {other:?}"),
        }
    }

    #[test]
    fn directory_specifier_falls_back_to_index_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("widgets")).unwrap();
        fs::write(dir.path().join("widgets/index.ts"), "export const w = 1;").unwrap();

        let resolver = ModuleResolver::new(CompilerOptions::default());
        match resolver.resolve("./widgets", dir.path()) {
            Resolution::Module(path) => {
                assert!(path.to_string_lossy().ends_with("index.ts"));
            }
            other => panic!("expected module resolution, got {other:?}"),
        }
    }

    #[test]
    fn missing_relative_specifier_is_unresolved() {
        let dir = TempDir::new().unwrap();
        let resolver = ModuleResolver::new(CompilerOptions::default());
        assert_eq!(
            resolver.resolve("./missing", dir.path()),
            Resolution::Unresolved
        );
    }

    #[test]
    fn bare_specifier_without_remap_is_external_as_written() {
        let dir = TempDir::new().unwrap();
        let resolver = ModuleResolver::new(CompilerOptions::default());
        assert_eq!(
            resolver.resolve("svelte", dir.path()),
            Resolution::External(vec!["svelte".to_owned()])
        );
    }

    #[test]
    fn remap_candidate_on_disk_is_inlined() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("vendor")).unwrap();
        fs::write(dir.path().join("vendor/markup.ts"), "export const m = 1;").unwrap();

        let resolver = ModuleResolver::new(options_with_paths(&[("lib/*", &["./vendor/*"])]));
        match resolver.resolve("lib/markup", dir.path()) {
            Resolution::Module(path) => assert!(path.to_string_lossy().contains("vendor")),
            other => panic!("expected module resolution, got {other:?}"),
        }
    }

    #[test]
    fn remap_without_match_on_disk_reports_candidates_in_order() {
        let dir = TempDir::new().unwrap();
        let resolver = ModuleResolver::new(options_with_paths(&[(
            "ui/*",
            &["npm:ui-kit@2/*", "npm:ui-kit@1/*"],
        )]));
        assert_eq!(
            resolver.resolve("ui/button", dir.path()),
            Resolution::External(vec![
                "npm:ui-kit@2/button".to_owned(),
                "npm:ui-kit@1/button".to_owned(),
            ])
        );
    }

    #[test]
    fn longest_remap_pattern_wins() {
        let dir = TempDir::new().unwrap();
        let resolver = ModuleResolver::new(options_with_paths(&[
            ("ui/*", &["npm:ui-kit/*"]),
            ("ui/icons/*", &["npm:ui-icons/*"]),
        ]));
        assert_eq!(
            resolver.resolve("ui/icons/star", dir.path()),
            Resolution::External(vec!["npm:ui-icons/star".to_owned()])
        );
    }
}
