//! Recursive-descent parser for the C subset accepted by xcc.
//!
//! One token of lookahead via `consume`/`unget`. The parser is fail-fast:
//! the first unexpected token aborts with a parse error carrying the token's
//! span. Typedef names are resolved cooperatively: the parser consults the
//! typedef map when deciding whether an identifier starts a type.

use crate::ast::*;
use crate::symbols::VarFlags;
use crate::types::{FuncType, NumKind, StructId, StructTable, Type};
use hashbrown::HashMap;
use xcc_common::{CompileError, CompileResult, Span};
use xcc_lexer::{Token, TokenKind};

/// Parser state shared across all files of one compilation: struct tags,
/// typedef names and enum constants live in one namespace.
#[derive(Debug, Default)]
pub struct ParseContext {
    pub structs: StructTable,
    pub typedefs: HashMap<String, Type>,
    pub enum_constants: HashMap<String, i64>,
}

impl ParseContext {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    current: usize,
    ctx: &'a mut ParseContext,
}

/// Parsed declaration specifiers: base type plus storage class flags.
struct DeclSpec {
    ty: Type,
    flags: VarFlags,
    is_typedef: bool,
}

/// Syntactic declarator shape; `apply` folds it onto a base type following
/// the C "spiral" rule.
enum DeclNode {
    Ident(Option<(String, Span)>),
    Ptr(Box<DeclNode>),
    Array(Box<DeclNode>, Option<usize>),
    Func(Box<DeclNode>, Vec<Param>, bool),
}

impl DeclNode {
    /// Fold this declarator onto `base`. Returns the resulting type, the
    /// declared name, and the named parameter list when the declarator is
    /// directly a function (needed for function definitions).
    fn apply(self, base: Type) -> (Type, Option<(String, Span)>, Option<(Vec<Param>, bool)>) {
        match self {
            DeclNode::Ident(name) => (base, name, None),
            DeclNode::Ptr(inner) => inner.apply(base.ptr_to()),
            DeclNode::Array(inner, len) => inner.apply(base.array_of(len)),
            DeclNode::Func(inner, params, variadic) => {
                let func_ty = Type::Func(Box::new(FuncType {
                    ret: base,
                    params: params.iter().map(|p| p.ty.clone()).collect(),
                    variadic,
                }));
                let direct = matches!(*inner, DeclNode::Ident(_));
                let (ty, name, inner_params) = inner.apply(func_ty);
                let out = if inner_params.is_some() {
                    inner_params
                } else if direct {
                    Some((params, variadic))
                } else {
                    None
                };
                (ty, name, out)
            }
        }
    }
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, ctx: &'a mut ParseContext) -> Self {
        Self { tokens, current: 0, ctx }
    }

    /// Parse a whole file worth of top-level declarations.
    pub fn parse_program(&mut self) -> CompileResult<Vec<Declaration>> {
        let mut decls = Vec::new();
        while !self.check(&TokenKind::EndOfFile) {
            if let Some(decl) = self.parse_toplevel()? {
                decls.push(decl);
            }
        }
        log::debug!("parsed {} top-level declarations", decls.len());
        Ok(decls)
    }

    // ---- token cursor ----

    /// The current token; the stream always ends in `EndOfFile`.
    pub fn fetch(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.fetch().clone();
        if self.current < self.tokens.len() - 1 {
            self.current += 1;
        }
        token
    }

    /// Push back the single most recently consumed token.
    pub fn unget(&mut self) {
        debug_assert!(self.current > 0);
        self.current -= 1;
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.fetch().value == kind
    }

    fn peek_kind(&self, ahead: usize) -> &TokenKind {
        let index = (self.current + ahead).min(self.tokens.len() - 1);
        &self.tokens[index].value
    }

    /// Consume and return the next token when it has `kind`.
    pub fn consume(&mut self, kind: &TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> CompileResult<Token> {
        if let Some(token) = self.consume(kind) {
            Ok(token)
        } else {
            Err(self.error_here(format!("`{}` expected", expected)))
        }
    }

    fn consume_ident(&mut self) -> Option<(String, Span)> {
        if let TokenKind::Identifier(name) = &self.fetch().value {
            let name = name.clone();
            let span = self.fetch().span;
            self.advance();
            Some((name, span))
        } else {
            None
        }
    }

    fn expect_ident(&mut self, expected: &str) -> CompileResult<(String, Span)> {
        self.consume_ident()
            .ok_or_else(|| self.error_here(format!("{} expected", expected)))
    }

    fn error_here(&self, message: impl Into<String>) -> CompileError {
        CompileError::parse(message, self.fetch().span)
    }

    // ---- declaration specifiers ----

    /// Whether `kind` can start a type specifier, consulting the typedef map
    /// for identifiers.
    fn starts_type(&self, kind: &TokenKind) -> bool {
        match kind {
            TokenKind::KeywordVoid
            | TokenKind::KeywordChar
            | TokenKind::KeywordShort
            | TokenKind::KeywordInt
            | TokenKind::KeywordLong
            | TokenKind::KeywordUnsigned
            | TokenKind::KeywordConst
            | TokenKind::KeywordStruct
            | TokenKind::KeywordUnion
            | TokenKind::KeywordEnum => true,
            TokenKind::Identifier(name) => self.ctx.typedefs.contains_key(name),
            _ => false,
        }
    }

    /// Whether the current token can start a declaration statement.
    fn starts_declaration(&self) -> bool {
        matches!(
            self.fetch().value,
            TokenKind::KeywordStatic | TokenKind::KeywordExtern | TokenKind::KeywordTypedef
        ) || self.starts_type(&self.fetch().value)
    }

    /// Parse declaration specifiers. Returns `None` without consuming
    /// anything when the current token does not start a declaration.
    fn parse_decl_specs(&mut self) -> CompileResult<Option<DeclSpec>> {
        let mut flags = VarFlags::default();
        let mut is_typedef = false;
        let mut unsigned = false;
        let mut num: Option<NumKind> = None;
        let mut base: Option<Type> = None;
        let mut consumed = false;

        loop {
            let kind = self.fetch().value.clone();
            match kind {
                TokenKind::KeywordConst => {
                    flags.is_const = true;
                }
                TokenKind::KeywordStatic => {
                    flags.is_static = true;
                }
                TokenKind::KeywordExtern => {
                    flags.is_extern = true;
                }
                TokenKind::KeywordTypedef => {
                    is_typedef = true;
                }
                TokenKind::KeywordUnsigned => {
                    unsigned = true;
                }
                TokenKind::KeywordVoid => {
                    base = Some(Type::Void);
                }
                TokenKind::KeywordChar => {
                    num = Some(NumKind::Char);
                }
                TokenKind::KeywordShort => {
                    num = Some(NumKind::Short);
                }
                TokenKind::KeywordInt => {
                    // `short int` / `long int`: `int` adds nothing.
                    if num.is_none() {
                        num = Some(NumKind::Int);
                    }
                }
                TokenKind::KeywordLong => {
                    // `long long` collapses to long.
                    num = Some(NumKind::Long);
                }
                TokenKind::KeywordStruct | TokenKind::KeywordUnion => {
                    self.advance();
                    let is_union = kind == TokenKind::KeywordUnion;
                    let id = self.parse_struct_spec(is_union)?;
                    base = Some(Type::Struct(id));
                    consumed = true;
                    continue;
                }
                TokenKind::KeywordEnum => {
                    self.advance();
                    self.parse_enum_spec()?;
                    base = Some(Type::int_type());
                    consumed = true;
                    continue;
                }
                TokenKind::Identifier(ref name)
                    if base.is_none() && num.is_none() && !unsigned =>
                {
                    match self.ctx.typedefs.get(name) {
                        Some(ty) => base = Some(ty.clone()),
                        None => break,
                    }
                }
                _ => break,
            }
            self.advance();
            consumed = true;
        }

        if !consumed {
            return Ok(None);
        }
        let ty = match (base, num) {
            (Some(ty), None) => ty,
            (None, Some(kind)) => Type::Num { kind, unsigned },
            // Bare `unsigned`, `static`, `const`: default int.
            (None, None) => Type::Num { kind: NumKind::Int, unsigned },
            (Some(_), Some(_)) => {
                return Err(self.error_here("conflicting type specifiers"));
            }
        };
        Ok(Some(DeclSpec { ty, flags, is_typedef }))
    }

    /// `struct`/`union` keyword already consumed.
    fn parse_struct_spec(&mut self, is_union: bool) -> CompileResult<StructId> {
        let tag = self.consume_ident();
        if self.consume(&TokenKind::LeftBrace).is_some() {
            let tag_span = self.fetch().span;
            let tag = match tag {
                Some((name, _)) => name,
                None => self.ctx.structs.anon_tag(),
            };
            let id = self.ctx.structs.declare(&tag, is_union);
            if self.ctx.structs.is_defined(id) {
                return Err(CompileError::redeclaration(tag, tag_span));
            }
            let mut members = Vec::new();
            while self.consume(&TokenKind::RightBrace).is_none() {
                let spec = self
                    .parse_decl_specs()?
                    .ok_or_else(|| self.error_here("member declaration expected"))?;
                loop {
                    let node = self.parse_declarator_node()?;
                    let (ty, name, _) = node.apply(spec.ty.clone());
                    let (name, span) = name
                        .ok_or_else(|| self.error_here("member name expected"))?;
                    if ty.is_array() && matches!(ty, Type::Array { len: None, .. }) {
                        return Err(CompileError::parse("array size required", span));
                    }
                    members.push((name, ty));
                    if self.consume(&TokenKind::Comma).is_none() {
                        break;
                    }
                }
                self.expect(&TokenKind::Semicolon, ";")?;
            }
            self.ctx.structs.define(id, members);
            Ok(id)
        } else {
            let (name, _) = tag.ok_or_else(|| self.error_here("struct tag expected"))?;
            Ok(self.ctx.structs.declare(&name, is_union))
        }
    }

    /// `enum` keyword already consumed. Enumerators become global integer
    /// constants; the enum type itself is `int`.
    fn parse_enum_spec(&mut self) -> CompileResult<()> {
        let _tag = self.consume_ident();
        if self.consume(&TokenKind::LeftBrace).is_none() {
            return Ok(());
        }
        let mut value: i64 = 0;
        while self.consume(&TokenKind::RightBrace).is_none() {
            let (name, span) = self.expect_ident("enumerator name")?;
            if self.consume(&TokenKind::Assign).is_some() {
                let expr = self.parse_ternary()?;
                value = self.const_eval(&expr)?;
            }
            if self.ctx.enum_constants.contains_key(&name) {
                return Err(CompileError::redeclaration(name, span));
            }
            self.ctx.enum_constants.insert(name, value);
            value += 1;
            if self.consume(&TokenKind::Comma).is_none() {
                self.expect(&TokenKind::RightBrace, "}")?;
                break;
            }
        }
        Ok(())
    }

    // ---- declarators ----

    fn parse_declarator_node(&mut self) -> CompileResult<DeclNode> {
        if self.consume(&TokenKind::Multiply).is_some() {
            // `const` after `*` qualifies the pointer; not tracked.
            while self.consume(&TokenKind::KeywordConst).is_some() {}
            return Ok(DeclNode::Ptr(Box::new(self.parse_declarator_node()?)));
        }

        let mut node = if self.check(&TokenKind::LeftParen) && self.grouping_paren() {
            self.advance();
            let inner = self.parse_declarator_node()?;
            self.expect(&TokenKind::RightParen, ")")?;
            inner
        } else {
            DeclNode::Ident(self.consume_ident())
        };

        loop {
            if self.consume(&TokenKind::LeftBracket).is_some() {
                let len = if self.check(&TokenKind::RightBracket) {
                    None
                } else {
                    let expr = self.parse_ternary()?;
                    let value = self.const_eval(&expr)?;
                    if value < 0 {
                        return Err(CompileError::parse("negative array size", expr.span));
                    }
                    Some(value as usize)
                };
                self.expect(&TokenKind::RightBracket, "]")?;
                node = DeclNode::Array(Box::new(node), len);
            } else if self.consume(&TokenKind::LeftParen).is_some() {
                let (params, variadic) = self.parse_params()?;
                node = DeclNode::Func(Box::new(node), params, variadic);
            } else {
                break;
            }
        }
        Ok(node)
    }

    /// At the start of a direct declarator, decide whether `(` groups an
    /// inner declarator or opens a parameter list.
    fn grouping_paren(&self) -> bool {
        match self.peek_kind(1) {
            TokenKind::Multiply | TokenKind::LeftParen => true,
            TokenKind::Identifier(name) => !self.ctx.typedefs.contains_key(name),
            _ => false,
        }
    }

    /// Opening paren already consumed.
    fn parse_params(&mut self) -> CompileResult<(Vec<Param>, bool)> {
        let mut params = Vec::new();
        let mut variadic = false;
        if self.consume(&TokenKind::RightParen).is_some() {
            return Ok((params, variadic));
        }
        // `(void)` declares an empty parameter list.
        if self.check(&TokenKind::KeywordVoid) && *self.peek_kind(1) == TokenKind::RightParen {
            self.advance();
            self.advance();
            return Ok((params, variadic));
        }
        loop {
            if self.consume(&TokenKind::Ellipsis).is_some() {
                variadic = true;
                self.expect(&TokenKind::RightParen, ")")?;
                return Ok((params, variadic));
            }
            let spec = self
                .parse_decl_specs()?
                .ok_or_else(|| self.error_here("parameter type expected"))?;
            let node = self.parse_declarator_node()?;
            let span = self.fetch().span;
            let (ty, name, _) = node.apply(spec.ty);
            // Arrays and functions decay in parameter position.
            let ty = match ty {
                Type::Array { elem, .. } => elem.ptr_to(),
                func @ Type::Func(_) => func.ptr_to(),
                other => other,
            };
            let (name, span) = name.unwrap_or((String::new(), span));
            params.push(Param { name, ty, span });
            if self.consume(&TokenKind::Comma).is_none() {
                self.expect(&TokenKind::RightParen, ")")?;
                return Ok((params, variadic));
            }
        }
    }

    /// Type name for casts and sizeof: specifiers plus abstract declarator.
    fn parse_type_name(&mut self) -> CompileResult<Type> {
        let spec = self
            .parse_decl_specs()?
            .ok_or_else(|| self.error_here("type name expected"))?;
        let node = self.parse_declarator_node()?;
        let (ty, name, _) = node.apply(spec.ty);
        if let Some((name, span)) = name {
            return Err(CompileError::parse(
                format!("unexpected identifier `{}` in type name", name),
                span,
            ));
        }
        Ok(ty)
    }

    // ---- top level ----

    fn parse_toplevel(&mut self) -> CompileResult<Option<Declaration>> {
        let spec = self
            .parse_decl_specs()?
            .ok_or_else(|| self.error_here("declaration expected"))?;

        // Struct/union/enum declaration without declarators.
        if self.consume(&TokenKind::Semicolon).is_some() {
            return Ok(None);
        }

        let node = self.parse_declarator_node()?;
        let (ty, name, params) = node.apply(spec.ty.clone());
        let (name, span) = name.ok_or_else(|| self.error_here("identifier expected"))?;

        if spec.is_typedef {
            self.register_typedef(name, ty, span)?;
            while self.consume(&TokenKind::Comma).is_some() {
                let node = self.parse_declarator_node()?;
                let (ty, name, _) = node.apply(spec.ty.clone());
                let (name, span) =
                    name.ok_or_else(|| self.error_here("identifier expected"))?;
                self.register_typedef(name, ty, span)?;
            }
            self.expect(&TokenKind::Semicolon, ";")?;
            return Ok(None);
        }

        if let Type::Func(func_ty) = &ty {
            let (params, variadic) =
                params.unwrap_or_else(|| (Vec::new(), func_ty.variadic));
            if self.check(&TokenKind::LeftBrace) {
                self.advance();
                for param in &params {
                    if param.name.is_empty() {
                        return Err(CompileError::parse("parameter name omitted", param.span));
                    }
                }
                let mut stmts = Vec::new();
                while self.consume(&TokenKind::RightBrace).is_none() {
                    stmts.push(self.parse_stmt()?);
                }
                let func = Function::new(
                    name,
                    func_ty.ret.clone(),
                    params,
                    variadic,
                    spec.flags,
                    Some(stmts),
                    span,
                );
                return Ok(Some(Declaration::Function(func)));
            }
            // Prototype.
            self.expect(&TokenKind::Semicolon, ";")?;
            let func = Function::new(
                name,
                func_ty.ret.clone(),
                params,
                variadic,
                spec.flags,
                None,
                span,
            );
            return Ok(Some(Declaration::Function(func)));
        }

        // File-scope variables.
        let mut decls = Vec::new();
        let mut decl = VarDecl { name, ty, flags: spec.flags, init: None, span };
        loop {
            if self.consume(&TokenKind::Assign).is_some() {
                decl.init = Some(self.parse_initializer()?);
            }
            decls.push(decl);
            if self.consume(&TokenKind::Comma).is_none() {
                break;
            }
            let node = self.parse_declarator_node()?;
            let (ty, name, _) = node.apply(spec.ty.clone());
            let (name, span) = name.ok_or_else(|| self.error_here("identifier expected"))?;
            decl = VarDecl { name, ty, flags: spec.flags, init: None, span };
        }
        self.expect(&TokenKind::Semicolon, ";")?;
        Ok(Some(Declaration::Variables(decls)))
    }

    fn register_typedef(&mut self, name: String, ty: Type, span: Span) -> CompileResult<()> {
        if self.ctx.typedefs.contains_key(&name) {
            return Err(CompileError::redeclaration(name, span));
        }
        self.ctx.typedefs.insert(name, ty);
        Ok(())
    }

    // ---- initializers ----

    fn parse_initializer(&mut self) -> CompileResult<Initializer> {
        if self.consume(&TokenKind::LeftBrace).is_none() {
            return Ok(Initializer::Single(self.parse_assign()?));
        }
        let mut elems = Vec::new();
        if self.consume(&TokenKind::RightBrace).is_some() {
            return Ok(Initializer::Multi(elems));
        }
        loop {
            let elem = if self.consume(&TokenKind::Dot).is_some() {
                let (name, _) = self.expect_ident("member name")?;
                self.expect(&TokenKind::Assign, "=")?;
                Initializer::Dot { name, value: Box::new(self.parse_initializer()?) }
            } else if self.consume(&TokenKind::LeftBracket).is_some() {
                let expr = self.parse_ternary()?;
                let index = self.const_eval(&expr)?;
                if index < 0 {
                    return Err(CompileError::parse("negative designator index", expr.span));
                }
                self.expect(&TokenKind::RightBracket, "]")?;
                self.expect(&TokenKind::Assign, "=")?;
                Initializer::Index {
                    index: index as usize,
                    value: Box::new(self.parse_initializer()?),
                }
            } else {
                self.parse_initializer()?
            };
            elems.push(Some(elem));
            if self.consume(&TokenKind::Comma).is_some() {
                if self.consume(&TokenKind::RightBrace).is_some() {
                    break;
                }
            } else {
                self.expect(&TokenKind::RightBrace, "}")?;
                break;
            }
        }
        Ok(Initializer::Multi(elems))
    }

    // ---- statements ----

    fn parse_stmt(&mut self) -> CompileResult<Stmt> {
        let span = self.fetch().span;
        let kind = self.fetch().value.clone();
        match kind {
            TokenKind::LeftBrace => {
                self.advance();
                let block = self.parse_block()?;
                Ok(Stmt::new(StmtKind::Block(block), span))
            }
            TokenKind::KeywordIf => {
                self.advance();
                self.expect(&TokenKind::LeftParen, "(")?;
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::RightParen, ")")?;
                let then_stmt = Box::new(self.parse_stmt()?);
                let else_stmt = if self.consume(&TokenKind::KeywordElse).is_some() {
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt::new(StmtKind::If { cond, then_stmt, else_stmt }, span))
            }
            TokenKind::KeywordSwitch => {
                self.advance();
                self.expect(&TokenKind::LeftParen, "(")?;
                let value = self.parse_expr()?;
                self.expect(&TokenKind::RightParen, ")")?;
                let body = self.parse_stmt()?;
                Ok(Stmt::new(
                    StmtKind::Switch(Box::new(SwitchStmt {
                        value,
                        body,
                        case_values: Vec::new(),
                        has_default: false,
                    })),
                    span,
                ))
            }
            TokenKind::KeywordCase => {
                self.advance();
                let expr = self.parse_ternary()?;
                let value = self.const_eval(&expr)?;
                self.expect(&TokenKind::Colon, ":")?;
                Ok(Stmt::new(StmtKind::Case { value }, span))
            }
            TokenKind::KeywordDefault => {
                self.advance();
                self.expect(&TokenKind::Colon, ":")?;
                Ok(Stmt::new(StmtKind::Default, span))
            }
            TokenKind::KeywordWhile => {
                self.advance();
                self.expect(&TokenKind::LeftParen, "(")?;
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::RightParen, ")")?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::new(StmtKind::While { cond, body }, span))
            }
            TokenKind::KeywordDo => {
                self.advance();
                let body = Box::new(self.parse_stmt()?);
                self.expect(&TokenKind::KeywordWhile, "while")?;
                self.expect(&TokenKind::LeftParen, "(")?;
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::RightParen, ")")?;
                self.expect(&TokenKind::Semicolon, ";")?;
                Ok(Stmt::new(StmtKind::DoWhile { body, cond }, span))
            }
            TokenKind::KeywordFor => {
                self.advance();
                self.parse_for(span)
            }
            TokenKind::KeywordBreak => {
                self.advance();
                self.expect(&TokenKind::Semicolon, ";")?;
                Ok(Stmt::new(StmtKind::Break, span))
            }
            TokenKind::KeywordContinue => {
                self.advance();
                self.expect(&TokenKind::Semicolon, ";")?;
                Ok(Stmt::new(StmtKind::Continue, span))
            }
            TokenKind::KeywordReturn => {
                self.advance();
                let value = if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&TokenKind::Semicolon, ";")?;
                Ok(Stmt::new(StmtKind::Return(value), span))
            }
            TokenKind::KeywordGoto => {
                self.advance();
                let (label, _) = self.expect_ident("label name")?;
                self.expect(&TokenKind::Semicolon, ";")?;
                Ok(Stmt::new(StmtKind::Goto { label }, span))
            }
            TokenKind::Identifier(name)
                if *self.peek_kind(1) == TokenKind::Colon
                    && !self.ctx.typedefs.contains_key(&name) =>
            {
                self.advance();
                self.advance();
                let stmt = Box::new(self.parse_stmt()?);
                Ok(Stmt::new(StmtKind::Label { name, stmt }, span))
            }
            _ if self.starts_declaration() => self.parse_vardecl_stmt(span),
            _ => {
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::Semicolon, ";")?;
                Ok(Stmt::new(StmtKind::Expr(expr), span))
            }
        }
    }

    /// Opening brace already consumed.
    fn parse_block(&mut self) -> CompileResult<Block> {
        let mut stmts = Vec::new();
        while self.consume(&TokenKind::RightBrace).is_none() {
            stmts.push(self.parse_stmt()?);
        }
        Ok(Block { scope: None, stmts })
    }

    /// `for` keyword already consumed. A declaration in the first clause is
    /// desugared into an enclosing block so it scopes over the loop.
    fn parse_for(&mut self, span: Span) -> CompileResult<Stmt> {
        self.expect(&TokenKind::LeftParen, "(")?;

        let decl = if self.check(&TokenKind::Semicolon) {
            self.advance();
            None
        } else if self.starts_declaration() {
            Some(self.parse_vardecl_stmt(span)?)
        } else {
            let pre = self.parse_expr()?;
            self.expect(&TokenKind::Semicolon, ";")?;
            let cond_post_body = self.parse_for_tail(Some(pre), span)?;
            return Ok(cond_post_body);
        };

        let for_stmt = self.parse_for_tail(None, span)?;
        match decl {
            None => Ok(for_stmt),
            Some(decl_stmt) => Ok(Stmt::new(
                StmtKind::Block(Block { scope: None, stmts: vec![decl_stmt, for_stmt] }),
                span,
            )),
        }
    }

    fn parse_for_tail(&mut self, pre: Option<Expr>, span: Span) -> CompileResult<Stmt> {
        let cond = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::Semicolon, ";")?;
        let post = if self.check(&TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::RightParen, ")")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::new(StmtKind::For { pre, cond, post, body }, span))
    }

    fn parse_vardecl_stmt(&mut self, span: Span) -> CompileResult<Stmt> {
        let spec = self
            .parse_decl_specs()?
            .ok_or_else(|| self.error_here("declaration expected"))?;

        if self.consume(&TokenKind::Semicolon).is_some() {
            // Struct/enum declaration without declarators.
            return Ok(Stmt::new(
                StmtKind::VarDecl(VarDeclStmt { decls: Vec::new(), inits: Vec::new() }),
                span,
            ));
        }

        let mut decls = Vec::new();
        loop {
            let node = self.parse_declarator_node()?;
            let (ty, name, _) = node.apply(spec.ty.clone());
            let (name, name_span) =
                name.ok_or_else(|| self.error_here("identifier expected"))?;
            if spec.is_typedef {
                self.register_typedef(name, ty, name_span)?;
            } else {
                let init = if self.consume(&TokenKind::Assign).is_some() {
                    Some(self.parse_initializer()?)
                } else {
                    None
                };
                decls.push(VarDecl {
                    name,
                    ty,
                    flags: spec.flags,
                    init,
                    span: name_span,
                });
            }
            if self.consume(&TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(&TokenKind::Semicolon, ";")?;
        Ok(Stmt::new(StmtKind::VarDecl(VarDeclStmt { decls, inits: Vec::new() }), span))
    }

    // ---- expressions ----

    pub fn parse_expr(&mut self) -> CompileResult<Expr> {
        let mut expr = self.parse_assign()?;
        while self.consume(&TokenKind::Comma).is_some() {
            let rhs = self.parse_assign()?;
            let span = expr.span.merge(rhs.span);
            expr = Expr::new(
                ExprKind::Comma { lhs: Box::new(expr), rhs: Box::new(rhs) },
                span,
            );
        }
        Ok(expr)
    }

    fn parse_assign(&mut self) -> CompileResult<Expr> {
        let lhs = self.parse_ternary()?;
        let op = match self.fetch().value {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinaryOp::Add),
            TokenKind::MinusAssign => Some(BinaryOp::Sub),
            TokenKind::MultiplyAssign => Some(BinaryOp::Mul),
            TokenKind::DivideAssign => Some(BinaryOp::Div),
            TokenKind::ModuloAssign => Some(BinaryOp::Mod),
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_assign()?;
        let span = lhs.span.merge(rhs.span);
        let kind = match op {
            None => ExprKind::Assign { lhs: Box::new(lhs), rhs: Box::new(rhs) },
            Some(op) => ExprKind::AssignWith { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
        };
        Ok(Expr::new(kind, span))
    }

    fn parse_ternary(&mut self) -> CompileResult<Expr> {
        let cond = self.parse_logor()?;
        if self.consume(&TokenKind::Question).is_none() {
            return Ok(cond);
        }
        let then_expr = self.parse_expr()?;
        self.expect(&TokenKind::Colon, ":")?;
        let else_expr = self.parse_ternary()?;
        let span = cond.span.merge(else_expr.span);
        Ok(Expr::new(
            ExprKind::Ternary {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ))
    }

    fn parse_binary<F>(
        &mut self,
        next: F,
        table: &[(TokenKind, BinaryOp)],
    ) -> CompileResult<Expr>
    where
        F: Fn(&mut Self) -> CompileResult<Expr>,
    {
        let mut lhs = next(self)?;
        'outer: loop {
            for (kind, op) in table {
                if self.consume(kind).is_some() {
                    let rhs = next(self)?;
                    let span = lhs.span.merge(rhs.span);
                    lhs = Expr::new(
                        ExprKind::Bin { op: *op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                        span,
                    );
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn parse_logor(&mut self) -> CompileResult<Expr> {
        self.parse_binary(Self::parse_logand, &[(TokenKind::LogicalOr, BinaryOp::LogOr)])
    }

    fn parse_logand(&mut self) -> CompileResult<Expr> {
        self.parse_binary(Self::parse_bitor, &[(TokenKind::LogicalAnd, BinaryOp::LogAnd)])
    }

    fn parse_bitor(&mut self) -> CompileResult<Expr> {
        self.parse_binary(Self::parse_bitxor, &[(TokenKind::Pipe, BinaryOp::BitOr)])
    }

    fn parse_bitxor(&mut self) -> CompileResult<Expr> {
        self.parse_binary(Self::parse_bitand, &[(TokenKind::Caret, BinaryOp::BitXor)])
    }

    fn parse_bitand(&mut self) -> CompileResult<Expr> {
        self.parse_binary(Self::parse_equality, &[(TokenKind::Ampersand, BinaryOp::BitAnd)])
    }

    fn parse_equality(&mut self) -> CompileResult<Expr> {
        self.parse_binary(
            Self::parse_relational,
            &[(TokenKind::Equal, BinaryOp::Eq), (TokenKind::NotEqual, BinaryOp::Ne)],
        )
    }

    fn parse_relational(&mut self) -> CompileResult<Expr> {
        self.parse_binary(
            Self::parse_shift,
            &[
                (TokenKind::Less, BinaryOp::Lt),
                (TokenKind::LessEqual, BinaryOp::Le),
                (TokenKind::Greater, BinaryOp::Gt),
                (TokenKind::GreaterEqual, BinaryOp::Ge),
            ],
        )
    }

    fn parse_shift(&mut self) -> CompileResult<Expr> {
        self.parse_binary(
            Self::parse_additive,
            &[
                (TokenKind::LeftShift, BinaryOp::LShift),
                (TokenKind::RightShift, BinaryOp::RShift),
            ],
        )
    }

    fn parse_additive(&mut self) -> CompileResult<Expr> {
        self.parse_binary(
            Self::parse_multiplicative,
            &[(TokenKind::Plus, BinaryOp::Add), (TokenKind::Minus, BinaryOp::Sub)],
        )
    }

    fn parse_multiplicative(&mut self) -> CompileResult<Expr> {
        self.parse_binary(
            Self::parse_cast,
            &[
                (TokenKind::Multiply, BinaryOp::Mul),
                (TokenKind::Divide, BinaryOp::Div),
                (TokenKind::Modulo, BinaryOp::Mod),
            ],
        )
    }

    fn parse_cast(&mut self) -> CompileResult<Expr> {
        if self.check(&TokenKind::LeftParen) && self.starts_type(self.peek_kind(1)) {
            let span = self.fetch().span;
            self.advance();
            let to = self.parse_type_name()?;
            self.expect(&TokenKind::RightParen, ")")?;
            let sub = self.parse_cast()?;
            let span = span.merge(sub.span);
            return Ok(Expr::new(
                ExprKind::Cast { to, sub: Box::new(sub), implicit: false },
                span,
            ));
        }
        self.parse_unary()
    }

    fn parse_unary(&mut self) -> CompileResult<Expr> {
        let span = self.fetch().span;
        let unary = |op: UnaryOp, sub: Expr| {
            let span = span.merge(sub.span);
            Expr::new(ExprKind::Unary { op, sub: Box::new(sub) }, span)
        };
        match self.fetch().value {
            TokenKind::LogicalNot => {
                self.advance();
                Ok(unary(UnaryOp::LogNot, self.parse_cast()?))
            }
            TokenKind::Tilde => {
                self.advance();
                Ok(unary(UnaryOp::BitNot, self.parse_cast()?))
            }
            TokenKind::Minus => {
                self.advance();
                Ok(unary(UnaryOp::Neg, self.parse_cast()?))
            }
            TokenKind::Plus => {
                // Unary plus is a no-op.
                self.advance();
                self.parse_cast()
            }
            TokenKind::Multiply => {
                self.advance();
                Ok(unary(UnaryOp::Deref, self.parse_cast()?))
            }
            TokenKind::Ampersand => {
                self.advance();
                Ok(unary(UnaryOp::Ref, self.parse_cast()?))
            }
            TokenKind::Increment | TokenKind::Decrement => {
                let inc = self.fetch().value == TokenKind::Increment;
                self.advance();
                let sub = self.parse_unary()?;
                let span = span.merge(sub.span);
                Ok(Expr::new(
                    ExprKind::IncDec { inc, postfix: false, sub: Box::new(sub) },
                    span,
                ))
            }
            TokenKind::KeywordSizeof => {
                self.advance();
                if self.check(&TokenKind::LeftParen) && self.starts_type(self.peek_kind(1)) {
                    self.advance();
                    let ty = self.parse_type_name()?;
                    let close = self.expect(&TokenKind::RightParen, ")")?;
                    Ok(Expr::new(ExprKind::SizeofType(ty), span.merge(close.span)))
                } else {
                    let sub = self.parse_unary()?;
                    let span = span.merge(sub.span);
                    Ok(Expr::new(ExprKind::SizeofExpr(Box::new(sub)), span))
                }
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> CompileResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let span = self.fetch().span;
            match self.fetch().value {
                TokenKind::LeftParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if self.consume(&TokenKind::RightParen).is_none() {
                        loop {
                            args.push(self.parse_assign()?);
                            if self.consume(&TokenKind::Comma).is_none() {
                                break;
                            }
                        }
                        self.expect(&TokenKind::RightParen, ")")?;
                    }
                    let span = expr.span.merge(span);
                    expr = Expr::new(ExprKind::Call { callee: Box::new(expr), args }, span);
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    let close = self.expect(&TokenKind::RightBracket, "]")?;
                    let span = expr.span.merge(close.span);
                    expr = Expr::new(
                        ExprKind::Subscript { base: Box::new(expr), index: Box::new(index) },
                        span,
                    );
                }
                TokenKind::Dot | TokenKind::Arrow => {
                    let arrow = self.fetch().value == TokenKind::Arrow;
                    self.advance();
                    let (name, name_span) = self.expect_ident("member name")?;
                    let span = expr.span.merge(name_span);
                    expr = Expr::new(
                        ExprKind::Member { base: Box::new(expr), name, arrow, index: None },
                        span,
                    );
                }
                TokenKind::Increment | TokenKind::Decrement => {
                    let inc = self.fetch().value == TokenKind::Increment;
                    self.advance();
                    let span = expr.span.merge(span);
                    expr = Expr::new(
                        ExprKind::IncDec { inc, postfix: true, sub: Box::new(expr) },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> CompileResult<Expr> {
        let token = self.fetch().clone();
        match token.value {
            TokenKind::IntLiteral(value) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Num { value, kind: NumKind::Int, unsigned: false },
                    token.span,
                ))
            }
            TokenKind::LongLiteral(value) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Num { value, kind: NumKind::Long, unsigned: false },
                    token.span,
                ))
            }
            TokenKind::UnsignedLiteral(value) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Num { value, kind: NumKind::Int, unsigned: true },
                    token.span,
                ))
            }
            TokenKind::CharLiteral(value) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Num { value: value as i64, kind: NumKind::Char, unsigned: false },
                    token.span,
                ))
            }
            TokenKind::StrLiteral(bytes) => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(bytes), token.span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if let Some(&value) = self.ctx.enum_constants.get(&name) {
                    return Ok(Expr::new(ExprKind::int(value), token.span));
                }
                Ok(Expr::new(ExprKind::Var { name, global: false, local: None }, token.span))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RightParen, ")")?;
                Ok(expr)
            }
            _ => Err(self.error_here("number, identifier or open paren expected")),
        }
    }

    // ---- constant expressions ----

    /// Fold a parse-time constant expression: array sizes, case labels, enum
    /// values and designator indices.
    pub fn const_eval(&self, expr: &Expr) -> CompileResult<i64> {
        match &expr.kind {
            ExprKind::Num { value, .. } => Ok(*value),
            ExprKind::Unary { op, sub } => {
                let value = self.const_eval(sub)?;
                match op {
                    UnaryOp::Neg => Ok(value.wrapping_neg()),
                    UnaryOp::BitNot => Ok(!value),
                    UnaryOp::LogNot => Ok((value == 0) as i64),
                    _ => Err(CompileError::parse("constant expression expected", expr.span)),
                }
            }
            ExprKind::Bin { op, lhs, rhs } => {
                let l = self.const_eval(lhs)?;
                let r = self.const_eval(rhs)?;
                let value = match op {
                    BinaryOp::Add => l.wrapping_add(r),
                    BinaryOp::Sub => l.wrapping_sub(r),
                    BinaryOp::Mul => l.wrapping_mul(r),
                    BinaryOp::Div | BinaryOp::Mod => {
                        if r == 0 {
                            return Err(CompileError::parse(
                                "division by zero in constant expression",
                                expr.span,
                            ));
                        }
                        if *op == BinaryOp::Div { l / r } else { l % r }
                    }
                    BinaryOp::BitAnd => l & r,
                    BinaryOp::BitOr => l | r,
                    BinaryOp::BitXor => l ^ r,
                    BinaryOp::LShift => l.wrapping_shl(r as u32),
                    BinaryOp::RShift => l.wrapping_shr(r as u32),
                    BinaryOp::Eq => (l == r) as i64,
                    BinaryOp::Ne => (l != r) as i64,
                    BinaryOp::Lt => (l < r) as i64,
                    BinaryOp::Le => (l <= r) as i64,
                    BinaryOp::Gt => (l > r) as i64,
                    BinaryOp::Ge => (l >= r) as i64,
                    BinaryOp::LogAnd => ((l != 0) && (r != 0)) as i64,
                    BinaryOp::LogOr => ((l != 0) || (r != 0)) as i64,
                };
                Ok(value)
            }
            ExprKind::Ternary { cond, then_expr, else_expr } => {
                if self.const_eval(cond)? != 0 {
                    self.const_eval(then_expr)
                } else {
                    self.const_eval(else_expr)
                }
            }
            ExprKind::Cast { sub, .. } => self.const_eval(sub),
            ExprKind::SizeofType(ty) => Ok(ty.size(&self.ctx.structs) as i64),
            _ => Err(CompileError::parse("constant expression expected", expr.span)),
        }
    }
}
