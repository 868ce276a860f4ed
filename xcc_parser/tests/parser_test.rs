//! Parser integration tests

use xcc_lexer::Lexer;
use xcc_parser::{
    BinaryOp, Declaration, ExprKind, Initializer, ParseContext, Parser, StmtKind, Type,
};

fn parse(source: &str) -> (Vec<Declaration>, ParseContext) {
    let tokens = Lexer::new(source, 0).tokenize().expect("lexing should succeed");
    let mut ctx = ParseContext::new();
    let decls = Parser::new(tokens, &mut ctx)
        .parse_program()
        .expect("parsing should succeed");
    (decls, ctx)
}

fn parse_err(source: &str) -> String {
    let tokens = Lexer::new(source, 0).tokenize().expect("lexing should succeed");
    let mut ctx = ParseContext::new();
    Parser::new(tokens, &mut ctx)
        .parse_program()
        .expect_err("parsing should fail")
        .to_string()
}

#[test]
fn function_definition() {
    let (decls, _) = parse("int main(int argc, char **argv) { return 0; }");
    assert_eq!(decls.len(), 1);
    match &decls[0] {
        Declaration::Function(f) => {
            assert_eq!(f.name, "main");
            assert_eq!(f.ret, Type::int_type());
            assert_eq!(f.params.len(), 2);
            assert_eq!(f.params[1].ty, Type::char_type().ptr_to().ptr_to());
            assert_eq!(f.body.as_ref().unwrap().len(), 1);
        }
        other => panic!("expected function, got {:?}", other),
    }
}

#[test]
fn declarator_spiral() {
    // `int *a[3]` is an array of three pointers to int.
    let (decls, _) = parse("int *a[3];");
    match &decls[0] {
        Declaration::Variables(vars) => {
            assert_eq!(vars[0].ty, Type::int_type().ptr_to().array_of(Some(3)));
        }
        other => panic!("expected variables, got {:?}", other),
    }

    // `int (*f)(int)` is a pointer to a function.
    let (decls, _) = parse("int (*f)(int);");
    match &decls[0] {
        Declaration::Variables(vars) => match &vars[0].ty {
            Type::Ptr(inner) => assert!(inner.is_func()),
            other => panic!("expected pointer, got {:?}", other),
        },
        other => panic!("expected variables, got {:?}", other),
    }
}

#[test]
fn typedef_names_become_types() {
    let (decls, ctx) = parse("typedef long word; word w;");
    assert_eq!(ctx.typedefs["word"], Type::long_type());
    match &decls[0] {
        Declaration::Variables(vars) => assert_eq!(vars[0].ty, Type::long_type()),
        other => panic!("expected variables, got {:?}", other),
    }
}

#[test]
fn struct_members_are_laid_out() {
    let (_, ctx) = parse("struct p { int x, y; };");
    let id = ctx.structs.lookup("p").unwrap();
    let info = ctx.structs.info(id);
    assert_eq!(info.members.len(), 2);
    assert_eq!(info.members[1].name, "y");
    assert_eq!(info.members[1].offset, 4);
    assert_eq!(info.size, 8);
}

#[test]
fn enum_constants_fold_into_literals() {
    let (decls, _) = parse("enum color { red, green = 5, blue }; int x[blue];");
    match &decls[0] {
        Declaration::Variables(vars) => {
            assert_eq!(vars[0].ty, Type::int_type().array_of(Some(6)));
        }
        other => panic!("expected variables, got {:?}", other),
    }
}

#[test]
fn designated_initializers() {
    let (decls, _) = parse("struct p { int x, y; }; struct p v = { .y = 7 };");
    match &decls[1] {
        Declaration::Variables(vars) => match vars[0].init.as_ref().unwrap() {
            Initializer::Multi(elems) => {
                assert_eq!(elems.len(), 1);
                match elems[0].as_ref().unwrap() {
                    Initializer::Dot { name, .. } => assert_eq!(name, "y"),
                    other => panic!("expected designator, got {:?}", other),
                }
            }
            other => panic!("expected multi initializer, got {:?}", other),
        },
        other => panic!("expected variables, got {:?}", other),
    }
}

#[test]
fn precedence_ladder() {
    // 1 + 2 * 3 parses as 1 + (2 * 3).
    let (decls, _) = parse("int main() { return 1 + 2 * 3; }");
    let f = match &decls[0] {
        Declaration::Function(f) => f,
        other => panic!("expected function, got {:?}", other),
    };
    let body = f.body.as_ref().unwrap();
    let ret = match &body[0].kind {
        StmtKind::Return(Some(expr)) => expr,
        other => panic!("expected return, got {:?}", other),
    };
    match &ret.kind {
        ExprKind::Bin { op: BinaryOp::Add, rhs, .. } => {
            assert!(matches!(rhs.kind, ExprKind::Bin { op: BinaryOp::Mul, .. }));
        }
        other => panic!("expected addition at the top, got {:?}", other),
    }
}

#[test]
fn for_with_declaration_desugars_to_block() {
    let (decls, _) = parse("int main() { for (int i = 0; i < 3; i++) ; return 0; }");
    let f = match &decls[0] {
        Declaration::Function(f) => f,
        other => panic!("expected function, got {:?}", other),
    };
    let body = f.body.as_ref().unwrap();
    match &body[0].kind {
        StmtKind::Block(block) => {
            assert!(matches!(block.stmts[0].kind, StmtKind::VarDecl(_)));
            assert!(matches!(block.stmts[1].kind, StmtKind::For { .. }));
        }
        other => panic!("expected desugared block, got {:?}", other),
    }
}

#[test]
fn array_size_from_constant_expression() {
    let (decls, _) = parse("char buf[4 * 2 + 1];");
    match &decls[0] {
        Declaration::Variables(vars) => {
            assert_eq!(vars[0].ty, Type::char_type().array_of(Some(9)));
        }
        other => panic!("expected variables, got {:?}", other),
    }
}

#[test]
fn parse_errors_are_fatal() {
    assert!(parse_err("int main() { return 1 }").contains("expected"));
    assert!(parse_err("int a = ;").contains("expected"));
    assert!(parse_err("int a[2/0];").contains("division by zero"));
}
