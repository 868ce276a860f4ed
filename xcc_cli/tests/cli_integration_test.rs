//! Driver-level integration tests: the full pipeline behind the binary.

use xcc_backend::Target;
use xcc_cli::{compile_sources, Compiler};
use xcc_common::CompileError;

#[test]
fn single_file_compiles() {
    let image = compile_sources(
        &[("t.c", "int main() { return 42; }")],
        Target::Linux,
    )
    .unwrap();
    assert!(image.filesz > 0);
}

#[test]
fn multiple_files_share_one_namespace() {
    let image = compile_sources(
        &[
            ("a.c", "int add(int a, int b);\nint main() { return add(40, 2); }"),
            ("b.c", "int add(int a, int b) { return a + b; }"),
        ],
        Target::Linux,
    )
    .unwrap();
    assert!(image.filesz > 0);

    // Conflicting definitions across files are caught.
    let err = compile_sources(
        &[
            ("a.c", "int f() { return 1; }"),
            ("b.c", "int f() { return 2; }"),
        ],
        Target::Linux,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::Redeclaration { .. }));
}

#[test]
fn typedefs_carry_across_files() {
    compile_sources(
        &[
            ("a.c", "typedef long word;"),
            ("b.c", "word w = 7; int main() { return (int)w; }"),
        ],
        Target::Linux,
    )
    .unwrap();
}

#[test]
fn diagnostics_carry_file_line_and_caret() {
    let mut compiler = Compiler::new();
    compiler
        .add_source("main.c", "int main() {\n  return x;\n}\n")
        .unwrap();
    let err = compiler.finish(Target::Linux).unwrap_err();
    let rendered = compiler.sources().render(&err);
    assert!(rendered.starts_with("main.c:2:"), "rendered: {}", rendered);
    assert!(rendered.contains("undeclared"));
    assert!(rendered.contains("return x;"));
    assert!(rendered.lines().last().unwrap().contains('^'));
}

#[test]
fn lex_errors_are_fatal_too() {
    let mut compiler = Compiler::new();
    let err = compiler.add_source("bad.c", "int a = '\n").unwrap_err();
    assert!(matches!(err, CompileError::Lex { .. }));
}

#[test]
fn both_targets_produce_images() {
    for target in [Target::Linux, Target::Xv6] {
        compile_sources(&[("t.c", "int main() { return 0; }")], target).unwrap();
    }
}
