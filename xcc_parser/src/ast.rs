//! Abstract syntax tree for the C subset accepted by xcc.
//!
//! The parser builds this tree untyped; semantic analysis fills each
//! expression's `ty` slot, inserts explicit casts, resolves member indices
//! and rewrites initializers into their flattened positional form.

use crate::symbols::{GlobalTable, Scope, ScopeId, VarFlags};
use crate::types::{NumKind, StructTable, Type};
use xcc_common::Span;

/// A whole translation set: every parsed file contributes declarations into
/// the same program, struct table and global namespace.
#[derive(Debug, Default)]
pub struct Program {
    pub decls: Vec<Declaration>,
    pub structs: StructTable,
    pub globals: GlobalTable,
}

#[derive(Debug)]
pub enum Declaration {
    Function(Function),
    Variables(Vec<VarDecl>),
}

/// One declarator of a declaration statement, e.g. the `b` of `int a, *b;`.
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
    pub flags: VarFlags,
    pub init: Option<Initializer>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub span: Span,
}

/// A function definition or prototype.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub ret: Type,
    pub params: Vec<Param>,
    pub variadic: bool,
    pub flags: VarFlags,
    /// `None` for a prototype.
    pub body: Option<Vec<Stmt>>,
    pub span: Span,

    // Filled by semantic analysis.
    pub ty: Option<Type>,
    pub scopes: Vec<Scope>,
    pub top_scope: ScopeId,
    pub labels: Vec<String>,
    pub gotos: Vec<(String, Span)>,
}

impl Function {
    pub fn new(
        name: String,
        ret: Type,
        params: Vec<Param>,
        variadic: bool,
        flags: VarFlags,
        body: Option<Vec<Stmt>>,
        span: Span,
    ) -> Self {
        Self {
            name,
            ret,
            params,
            variadic,
            flags,
            body,
            span,
            ty: None,
            scopes: Vec::new(),
            top_scope: 0,
            labels: Vec::new(),
            gotos: Vec::new(),
        }
    }
}

/// Initializer as written, before flattening. `flatten_initializer` reduces
/// this to `Single` and positional `Multi` only, with `None` slots marking
/// elements to be zeroed.
#[derive(Debug, Clone)]
pub enum Initializer {
    Single(Expr),
    Multi(Vec<Option<Initializer>>),
    /// Designated struct field: `.name = value`.
    Dot { name: String, value: Box<Initializer> },
    /// Designated array element: `[index] = value`.
    Index { index: usize, value: Box<Initializer> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogAnd,
    LogOr,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation `-`.
    Neg,
    /// Logical not `!`.
    LogNot,
    /// Bitwise complement `~`.
    BitNot,
    /// Pointer dereference `*`.
    Deref,
    /// Address-of `&`.
    Ref,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    /// Set by semantic analysis; total after it succeeds.
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span, ty: None }
    }

    pub fn typed(kind: ExprKind, span: Span, ty: Type) -> Self {
        Self { kind, span, ty: Some(ty) }
    }

    /// The analysed type; may only be called after sema has run.
    pub fn ty(&self) -> &Type {
        self.ty.as_ref().expect("expression not yet typed")
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Num { value: i64, kind: NumKind, unsigned: bool },
    /// String literal bytes, without the trailing NUL.
    Str(Vec<u8>),
    /// Variable reference. Sema resolves it: either `global` is set, or
    /// `local` holds the `(scope, index)` of the variable's declaration.
    Var { name: String, global: bool, local: Option<(ScopeId, usize)> },
    Bin { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: UnaryOp, sub: Box<Expr> },
    Member { base: Box<Expr>, name: String, arrow: bool, index: Option<usize> },
    /// `a[i]`; sema rewrites it to `*(a + i)`.
    Subscript { base: Box<Expr>, index: Box<Expr> },
    Cast { to: Type, sub: Box<Expr>, implicit: bool },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Ternary { cond: Box<Expr>, then_expr: Box<Expr>, else_expr: Box<Expr> },
    Comma { lhs: Box<Expr>, rhs: Box<Expr> },
    Assign { lhs: Box<Expr>, rhs: Box<Expr> },
    AssignWith { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    IncDec { inc: bool, postfix: bool, sub: Box<Expr> },
    SizeofExpr(Box<Expr>),
    SizeofType(Type),
}

impl ExprKind {
    pub fn int(value: i64) -> ExprKind {
        ExprKind::Num { value, kind: NumKind::Int, unsigned: false }
    }
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    /// Scope opened by this block; assigned during semantic analysis.
    pub scope: Option<ScopeId>,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct SwitchStmt {
    pub value: Expr,
    pub body: Stmt,
    /// Case values in order of appearance, collected by sema.
    pub case_values: Vec<i64>,
    pub has_default: bool,
}

#[derive(Debug, Clone)]
pub struct VarDeclStmt {
    pub decls: Vec<VarDecl>,
    /// Synthetic assignment statements produced by initializer lowering.
    pub inits: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expr(Expr),
    Block(Block),
    If { cond: Expr, then_stmt: Box<Stmt>, else_stmt: Option<Box<Stmt>> },
    Switch(Box<SwitchStmt>),
    /// Marker labelling the statements that follow it inside a switch body.
    Case { value: i64 },
    Default,
    While { cond: Expr, body: Box<Stmt> },
    DoWhile { body: Box<Stmt>, cond: Expr },
    For {
        pre: Option<Expr>,
        cond: Option<Expr>,
        post: Option<Expr>,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Goto { label: String },
    Label { name: String, stmt: Box<Stmt> },
    VarDecl(VarDeclStmt),
}
