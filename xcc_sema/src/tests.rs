//! Semantic analyzer tests

use crate::analyze_program;
use xcc_common::{CompileError, CompileResult};
use xcc_lexer::Lexer;
use xcc_parser::{
    Declaration, Expr, ExprKind, GlobalTable, Initializer, ParseContext, Parser, Program, Stmt,
    StmtKind, Type,
};

fn check(source: &str) -> CompileResult<Program> {
    let tokens = Lexer::new(source, 0).tokenize()?;
    let mut ctx = ParseContext::new();
    let decls = Parser::new(tokens, &mut ctx).parse_program()?;
    let mut program = Program {
        decls,
        structs: ctx.structs,
        globals: GlobalTable::new(),
    };
    analyze_program(&mut program)?;
    Ok(program)
}

fn check_err(source: &str) -> CompileError {
    check(source).expect_err("analysis should fail")
}

fn function<'a>(program: &'a Program, name: &str) -> &'a xcc_parser::Function {
    program
        .decls
        .iter()
        .find_map(|d| match d {
            Declaration::Function(f) if f.name == name => Some(f),
            _ => None,
        })
        .expect("function not found")
}

/// Every expression in the statement tree must carry a type after sema.
fn assert_typed_stmt(stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Expr(e) => assert_typed_expr(e),
        StmtKind::Block(b) => b.stmts.iter().for_each(assert_typed_stmt),
        StmtKind::If { cond, then_stmt, else_stmt } => {
            assert_typed_expr(cond);
            assert_typed_stmt(then_stmt);
            if let Some(e) = else_stmt {
                assert_typed_stmt(e);
            }
        }
        StmtKind::Switch(sw) => {
            assert_typed_expr(&sw.value);
            assert_typed_stmt(&sw.body);
        }
        StmtKind::While { cond, body } | StmtKind::DoWhile { body, cond } => {
            assert_typed_expr(cond);
            assert_typed_stmt(body);
        }
        StmtKind::For { pre, cond, post, body } => {
            [pre, cond, post].into_iter().flatten().for_each(assert_typed_expr);
            assert_typed_stmt(body);
        }
        StmtKind::Return(Some(e)) => assert_typed_expr(e),
        StmtKind::Label { stmt, .. } => assert_typed_stmt(stmt),
        StmtKind::VarDecl(decl) => decl.inits.iter().for_each(assert_typed_stmt),
        _ => {}
    }
}

fn assert_typed_expr(expr: &Expr) {
    assert!(expr.ty.is_some(), "untyped expression: {:?}", expr.kind);
    match &expr.kind {
        ExprKind::Bin { lhs, rhs, .. }
        | ExprKind::Assign { lhs, rhs }
        | ExprKind::AssignWith { lhs, rhs, .. }
        | ExprKind::Comma { lhs, rhs } => {
            assert_typed_expr(lhs);
            assert_typed_expr(rhs);
        }
        ExprKind::Unary { sub, .. }
        | ExprKind::Cast { sub, .. }
        | ExprKind::IncDec { sub, .. } => assert_typed_expr(sub),
        ExprKind::Member { base, .. } => assert_typed_expr(base),
        ExprKind::Call { callee, args } => {
            assert_typed_expr(callee);
            args.iter().for_each(assert_typed_expr);
        }
        ExprKind::Ternary { cond, then_expr, else_expr } => {
            assert_typed_expr(cond);
            assert_typed_expr(then_expr);
            assert_typed_expr(else_expr);
        }
        _ => {}
    }
}

#[test]
fn types_are_total_after_analysis() {
    let program = check(
        "int fib(int n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }\n\
         int main() { return fib(10); }",
    )
    .unwrap();
    for name in ["fib", "main"] {
        let f = function(&program, name);
        f.body.as_ref().unwrap().iter().for_each(assert_typed_stmt);
    }
}

#[test]
fn undeclared_variable_is_rejected() {
    let err = check_err("int main() { return x; }");
    assert!(matches!(err, CompileError::Undeclared { ref name, .. } if name == "x"));
    assert_eq!(err.span().unwrap().start.line, 1);
}

#[test]
fn redeclaration_in_same_scope_is_rejected() {
    let err = check_err("int main() { int a; int a; return 0; }");
    assert!(matches!(err, CompileError::Redeclaration { .. }));
    // Shadowing in an inner scope is fine.
    check("int main() { int a = 1; { int a = 2; } return a; }").unwrap();
}

#[test]
fn pointer_arithmetic_is_scaled() {
    let program = check("int main(int argc, char **argv) { return *(argv + 1) != 0; }").unwrap();
    let f = function(&program, "main");
    f.body.as_ref().unwrap().iter().for_each(assert_typed_stmt);
}

#[test]
fn subscript_lowers_to_deref() {
    let program = check("int main() { int a[3] = {1, 2, 3}; return a[1]; }").unwrap();
    let f = function(&program, "main");
    let body = f.body.as_ref().unwrap();
    let StmtKind::Return(Some(ret)) = &body[1].kind else {
        panic!("expected return");
    };
    assert!(matches!(
        ret.kind,
        ExprKind::Unary { op: xcc_parser::UnaryOp::Deref, .. }
    ));
}

#[test]
fn local_array_initializer_produces_assignments() {
    let program = check("int main() { int a[3] = {1, 2}; return a[0]; }").unwrap();
    let f = function(&program, "main");
    let StmtKind::VarDecl(decl) = &f.body.as_ref().unwrap()[0].kind else {
        panic!("expected declaration");
    };
    // Two explicit values plus one zeroed slot.
    assert_eq!(decl.inits.len(), 3);
}

#[test]
fn designated_struct_initializer_zero_fills_the_rest() {
    let program =
        check("struct p { int x, y; }; int main() { struct p v = { .y = 7 }; return v.y; }")
            .unwrap();
    let f = function(&program, "main");
    let StmtKind::VarDecl(decl) = &f.body.as_ref().unwrap()[0].kind else {
        panic!("expected declaration");
    };
    // `.x` is zeroed, `.y` is assigned.
    assert_eq!(decl.inits.len(), 2);
}

#[test]
fn string_array_size_includes_terminator() {
    let program = check("char s[] = \"hi\"; int main() { return s[0]; }").unwrap();
    let info = program.globals.find("s").unwrap();
    assert_eq!(info.ty, Type::char_type().array_of(Some(3)));
    assert!(matches!(
        info.init,
        Some(Initializer::Single(Expr { kind: ExprKind::Str(_), .. }))
    ));
}

#[test]
fn char_pointer_from_string_is_hoisted() {
    let program = check("char *greeting = \"hello\"; int main() { return 0; }").unwrap();
    let info = program.globals.find("greeting").unwrap();
    let Some(Initializer::Single(Expr {
        kind: ExprKind::Var { name, global: true, .. },
        ..
    })) = &info.init
    else {
        panic!("expected hoisted reference, got {:?}", info.init);
    };
    let hoisted = program.globals.find(name).expect("hoisted global");
    assert!(hoisted.flags.is_static && hoisted.flags.is_const);
    assert_eq!(hoisted.ty, Type::char_type().array_of(Some(6)));
}

#[test]
fn static_local_is_hoisted_to_a_global() {
    let program = check("int counter() { static int n = 3; return n; }").unwrap();
    let hoisted = program
        .globals
        .iter()
        .find(|v| v.name.starts_with(".L"))
        .expect("hoisted static local");
    assert_eq!(hoisted.ty, Type::int_type());
    assert!(hoisted.init.is_some());
}

#[test]
fn control_flow_validation() {
    assert!(matches!(
        check_err("int main() { break; }"),
        CompileError::ControlFlow { .. }
    ));
    assert!(matches!(
        check_err("int main() { switch (1) { case 1: case 1: return 0; } return 1; }"),
        CompileError::ControlFlow { .. }
    ));
    assert!(matches!(
        check_err(
            "int main() { switch (1) { default: return 0; default: return 1; } return 2; }"
        ),
        CompileError::ControlFlow { .. }
    ));
    assert!(matches!(
        check_err("int main() { case 1: return 0; }"),
        CompileError::ControlFlow { .. }
    ));
    // `break` is valid directly inside a switch...
    check("int main() { switch (1) { case 1: break; } return 0; }").unwrap();
}

#[test]
fn continue_has_its_own_flag() {
    // ...but `continue` directly inside a switch is not.
    assert!(matches!(
        check_err("int main() { switch (1) { case 1: continue; } return 0; }"),
        CompileError::ControlFlow { .. }
    ));
    // Inside a loop containing the switch it is fine again.
    check(
        "int main() { int i; for (i = 0; i < 3; i++) { switch (i) { case 1: continue; } } \
         return 0; }",
    )
    .unwrap();
}

#[test]
fn goto_requires_a_matching_label() {
    assert!(matches!(
        check_err("int main() { goto out; return 0; }"),
        CompileError::ControlFlow { .. }
    ));
    check("int main() { goto out; out: return 0; }").unwrap();
}

#[test]
fn return_type_checks() {
    assert!(matches!(
        check_err("void f() { return 1; }"),
        CompileError::Type { .. }
    ));
    assert!(matches!(
        check_err("int f() { return; }"),
        CompileError::Type { .. }
    ));
    // The return value is cast to the declared type.
    check("char f() { return 300; }").unwrap();
}

#[test]
fn const_assignment_is_rejected() {
    assert!(matches!(
        check_err("int main() { const int x = 1; x = 2; return x; }"),
        CompileError::Type { .. }
    ));
}

#[test]
fn constant_folding_reaches_global_initializers() {
    let program = check("int x = 6 * 7; int main() { return x; }").unwrap();
    let info = program.globals.find("x").unwrap();
    let Some(Initializer::Single(expr)) = &info.init else {
        panic!("expected single initializer");
    };
    assert!(matches!(expr.kind, ExprKind::Num { value: 42, .. }));
}

#[test]
fn folded_division_by_zero_is_an_error() {
    assert!(matches!(
        check_err("int main() { return 1 / 0; }"),
        CompileError::Type { .. }
    ));
}

#[test]
fn builtins_are_predeclared() {
    check("int main() { _write(1, \"ok\", 2L); _exit(0); return 0; }").unwrap();
}

#[test]
fn call_argument_checks() {
    assert!(matches!(
        check_err("int f(int a) { return a; } int main() { return f(); }"),
        CompileError::Type { .. }
    ));
    assert!(matches!(
        check_err("int main() { int x = 0; return x(); }"),
        CompileError::Type { .. }
    ));
}

#[test]
fn duplicate_function_definition_is_rejected() {
    assert!(matches!(
        check_err("int f() { return 1; } int f() { return 2; }"),
        CompileError::Redeclaration { .. }
    ));
    // Prototype followed by a definition is fine.
    check("int f(int); int f(int a) { return a; } int main() { return f(1); }").unwrap();
}
