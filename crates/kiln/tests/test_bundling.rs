use std::{fs, path::PathBuf};

use kiln::{CompileError, CompileRequest, Compiler, CompilerOptions, GraphCompiler};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn write_module(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

fn request(entry: PathBuf, options: CompilerOptions) -> CompileRequest {
    CompileRequest {
        entry,
        options,
        dynamic_imports: false,
    }
}

#[test]
fn bundles_a_three_module_graph_into_one_unit() {
    let dir = TempDir::new().unwrap();
    write_module(&dir, "format.ts", "export const suffix = \"!\";\n");
    write_module(
        &dir,
        "greet.ts",
        "import {suffix} from './format';\nexport const greet = \"hi\";\n",
    );
    let entry = write_module(
        &dir,
        "app.ts",
        "import {greet} from './greet';\nexport default () => \"hi!\";\n",
    );

    let bundle = GraphCompiler
        .compile(&request(entry, CompilerOptions::default()))
        .unwrap();

    assert!(bundle.is_self_contained());
    // Dependencies appear before their importers, stripped of exports
    let format_at = bundle.code.find("const suffix").unwrap();
    let greet_at = bundle.code.find("const greet").unwrap();
    let entry_at = bundle.code.find("export default").unwrap();
    assert!(format_at < greet_at && greet_at < entry_at);
    assert!(!bundle.code.contains("import "));
}

#[test]
fn bare_specifiers_land_in_the_manifest_not_the_code() {
    let dir = TempDir::new().unwrap();
    let entry = write_module(
        &dir,
        "app.ts",
        "import {onMount} from 'svelte';\nimport {tick} from 'svelte';\nexport default () => 1;\n",
    );

    let bundle = GraphCompiler
        .compile(&request(entry, CompilerOptions::default()))
        .unwrap();

    assert!(!bundle.code.contains("svelte"));
    assert_eq!(
        bundle.external.get("svelte"),
        Some(&vec!["svelte".to_owned(), "svelte".to_owned()]),
        "one key, duplicate candidates in encounter order"
    );
}

#[test]
fn path_remapping_inlines_vendor_modules() {
    let dir = TempDir::new().unwrap();
    write_module(&dir, "vendor/color.ts", "export const red = \"#f00\";\n");
    let entry = write_module(
        &dir,
        "app.ts",
        "import {red} from 'palette/color';\nexport default () => \"#f00\";\n",
    );

    let mut options = CompilerOptions::default();
    options
        .paths
        .insert("palette/*".to_owned(), vec!["./vendor/*".to_owned()]);

    let bundle = GraphCompiler.compile(&request(entry, options)).unwrap();
    assert!(bundle.is_self_contained());
    assert!(bundle.code.contains("const red = \"#f00\";"));
}

#[test]
fn unresolvable_remap_candidates_stay_external_in_order() {
    let dir = TempDir::new().unwrap();
    let entry = write_module(
        &dir,
        "app.ts",
        "import {Button} from 'ui/button';\nexport default () => 1;\n",
    );

    let mut options = CompilerOptions::default();
    options.paths.insert(
        "ui/*".to_owned(),
        vec!["npm:ui-kit@2/*".to_owned(), "npm:ui-kit@1/*".to_owned()],
    );

    let bundle = GraphCompiler.compile(&request(entry, options)).unwrap();
    assert_eq!(
        bundle.external.get("ui/button"),
        Some(&vec![
            "npm:ui-kit@2/button".to_owned(),
            "npm:ui-kit@1/button".to_owned(),
        ])
    );
}

#[test]
fn compile_is_deterministic_for_an_unchanged_tree() {
    let dir = TempDir::new().unwrap();
    write_module(&dir, "dep.ts", "export const d = 1;\n");
    let entry = write_module(
        &dir,
        "app.ts",
        "import {d} from './dep';\nexport default () => 1;\n",
    );

    let first = GraphCompiler
        .compile(&request(entry.clone(), CompilerOptions::default()))
        .unwrap();
    let second = GraphCompiler
        .compile(&request(entry, CompilerOptions::default()))
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn unresolved_import_diagnostic_names_both_ends() {
    let dir = TempDir::new().unwrap();
    let entry = write_module(
        &dir,
        "app.ts",
        "import {x} from './nowhere';\nexport default () => 1;\n",
    );

    let err = GraphCompiler
        .compile(&request(entry, CompilerOptions::default()))
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("./nowhere"), "diagnostic: {message}");
    assert!(message.contains("app.ts"), "diagnostic: {message}");
}

#[test]
fn circular_graph_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_module(&dir, "a.ts", "import {b} from './b';\nexport const a = 1;\n");
    write_module(&dir, "b.ts", "import {a} from './a';\nexport const b = 2;\n");
    let entry = write_module(
        &dir,
        "app.ts",
        "import {a} from './a';\nexport default () => 1;\n",
    );

    let err = GraphCompiler
        .compile(&request(entry, CompilerOptions::default()))
        .unwrap_err();
    assert!(matches!(err, CompileError::CircularImport { .. }));
}
