//! Statement and declaration analysis.
//!
//! Scope construction, control-flow validation and the per-function driver.
//! Expression typing lives in `expr`, initializer lowering in `init`.

use xcc_common::{CompileError, CompileResult, Span};
use xcc_parser::{
    Declaration, Expr, ExprKind, Function, FuncType, GlobalTable, Program, Scope, ScopeId, Stmt,
    StmtKind, StructTable, Type, VarDecl, VarDeclStmt, VarFlags, VarInfo,
};

/// Per-switch bookkeeping while its body is being analysed.
#[derive(Debug, Default)]
pub(crate) struct SwitchCtx {
    pub case_values: Vec<i64>,
    pub has_default: bool,
}

/// State of the function currently being analysed.
pub(crate) struct FuncState {
    pub name: String,
    pub ret: Type,
    pub scopes: Vec<Scope>,
    pub scope_stack: Vec<ScopeId>,
    pub labels: Vec<String>,
    pub gotos: Vec<(String, Span)>,
    /// `break` and `continue` get separate flags, so `continue` directly
    /// inside a `switch` is still rejected.
    pub break_ok: bool,
    pub continue_ok: bool,
    pub switches: Vec<SwitchCtx>,
}

impl FuncState {
    fn new(name: String, ret: Type) -> Self {
        Self {
            name,
            ret,
            scopes: Vec::new(),
            scope_stack: Vec::new(),
            labels: Vec::new(),
            gotos: Vec::new(),
            break_ok: false,
            continue_ok: false,
            switches: Vec::new(),
        }
    }
}

pub struct Analyzer<'a> {
    pub(crate) structs: &'a mut StructTable,
    pub(crate) globals: &'a mut GlobalTable,
    pub(crate) label_count: u32,
    pub(crate) func: Option<FuncState>,
}

/// Analyse a parsed program in place. Seeds the builtin runtime symbols,
/// then types and lowers every declaration.
pub fn analyze_program(program: &mut Program) -> CompileResult<()> {
    let mut analyzer = Analyzer {
        structs: &mut program.structs,
        globals: &mut program.globals,
        label_count: 0,
        func: None,
    };
    analyzer.declare_builtins();
    let mut decls = std::mem::take(&mut program.decls);
    for decl in &mut decls {
        analyzer.check_declaration(decl)?;
    }
    program.decls = decls;
    Ok(())
}

impl<'a> Analyzer<'a> {
    /// The startup shim provides `_exit` and `_write`; seed their prototypes
    /// so user code can call them.
    fn declare_builtins(&mut self) {
        let span = Span::single(xcc_common::Position::start(), 0);
        for (name, func_ty) in [
            (
                "_exit",
                FuncType { ret: Type::Void, params: vec![Type::int_type()], variadic: false },
            ),
            (
                "_write",
                FuncType {
                    ret: Type::int_type(),
                    params: vec![
                        Type::int_type(),
                        Type::char_type().ptr_to(),
                        Type::long_type(),
                    ],
                    variadic: false,
                },
            ),
        ] {
            let flags = VarFlags { is_const: true, ..VarFlags::default() };
            let mut info = VarInfo::new(name, Type::Func(Box::new(func_ty)), flags, span);
            info.label = Some(name.to_string());
            self.globals.define(info);
        }
    }

    fn check_declaration(&mut self, decl: &mut Declaration) -> CompileResult<()> {
        match decl {
            Declaration::Function(func) => self.check_function(func),
            Declaration::Variables(decls) => self.check_global_vardecl(decls),
        }
    }

    // ---- functions ----

    fn check_function(&mut self, func: &mut Function) -> CompileResult<()> {
        log::debug!("analyzing function `{}`", func.name);
        if func.ret.is_struct() {
            return Err(CompileError::type_error(
                "returning a struct by value is not supported",
                func.span,
            ));
        }
        if let Some(param) = func.params.iter().find(|p| p.ty.is_struct()) {
            return Err(CompileError::type_error(
                "passing a struct by value is not supported",
                param.span,
            ));
        }
        let func_ty = Type::Func(Box::new(FuncType {
            ret: func.ret.clone(),
            params: func.params.iter().map(|p| p.ty.clone()).collect(),
            variadic: func.variadic,
        }));
        func.ty = Some(func_ty.clone());

        if !self.globals.contains(&func.name) {
            let flags = VarFlags { is_const: true, ..func.flags };
            let mut info = VarInfo::new(&*func.name, func_ty, flags, func.span);
            info.label = Some(func.name.clone());
            info.is_defined = func.body.is_some();
            self.globals.define(info);
        } else {
            let existing = self.globals.find_mut(&func.name).expect("checked above");
            if !existing.ty.is_func() {
                return Err(CompileError::type_error(
                    format!("definition conflict: `{}`", func.name),
                    func.span,
                ));
            }
            if func.body.is_some() {
                if existing.is_defined {
                    return Err(CompileError::redeclaration(&*func.name, func.span));
                }
                existing.is_defined = true;
                existing.ty = func_ty;
            }
        }

        let Some(mut body) = func.body.take() else {
            return Ok(());
        };

        self.func = Some(FuncState::new(func.name.clone(), func.ret.clone()));

        // Parameter scope, then the body's own scope.
        self.enter_scope();
        for param in &func.params {
            let info = VarInfo::new(&*param.name, param.ty.clone(), VarFlags::default(), param.span);
            self.add_cur_scope(info)?;
        }
        func.top_scope = self.enter_scope();

        for stmt in &mut body {
            self.check_stmt(stmt)?;
        }

        self.exit_scope();
        self.exit_scope();

        let state = self.func.take().expect("function state active");
        // Scope hygiene: back at the global scope.
        debug_assert!(state.scope_stack.is_empty());

        for (label, span) in &state.gotos {
            if !state.labels.contains(label) {
                return Err(CompileError::control_flow(
                    format!("label `{}` not found", label),
                    *span,
                ));
            }
        }

        func.body = Some(body);
        func.scopes = state.scopes;
        func.labels = state.labels;
        func.gotos = state.gotos;
        Ok(())
    }

    // ---- scopes ----

    pub(crate) fn state(&mut self) -> &mut FuncState {
        // Statements and locals are only analysed inside a function body.
        self.func.as_mut().expect("not inside a function")
    }

    fn enter_scope(&mut self) -> ScopeId {
        let state = self.state();
        let parent = state.scope_stack.last().copied();
        state.scopes.push(Scope::with_parent(parent));
        let id = state.scopes.len() - 1;
        state.scope_stack.push(id);
        id
    }

    fn exit_scope(&mut self) {
        let state = self.state();
        state.scope_stack.pop().expect("scope stack underflow");
    }

    /// Record a variable in the current scope; redeclaration within the same
    /// scope is an error.
    fn add_cur_scope(&mut self, mut info: VarInfo) -> CompileResult<()> {
        // Aggregates always live in memory.
        if info.ty.is_array() || info.ty.is_struct() {
            info.force_stack = true;
        }
        let state = self.state();
        let scope_id = *state.scope_stack.last().expect("no current scope");
        let scope = &mut state.scopes[scope_id];
        if scope.find(&info.name).is_some() {
            return Err(CompileError::redeclaration(&*info.name, info.span));
        }
        scope.vars.push(info);
        Ok(())
    }

    /// Walk the scope chain for `name`.
    pub(crate) fn find_var(&self, name: &str) -> Option<(ScopeId, usize)> {
        let state = self.func.as_ref()?;
        let mut cur = state.scope_stack.last().copied();
        while let Some(id) = cur {
            if let Some(index) = state.scopes[id].find(name) {
                return Some((id, index));
            }
            cur = state.scopes[id].parent;
        }
        None
    }

    pub(crate) fn alloc_label(&mut self) -> String {
        let label = format!(".L{}", self.label_count);
        self.label_count += 1;
        label
    }

    // ---- statements ----

    fn check_stmt(&mut self, stmt: &mut Stmt) -> CompileResult<()> {
        let span = stmt.span;
        match &mut stmt.kind {
            StmtKind::Expr(expr) => self.check_expr(expr),

            StmtKind::Block(block) => {
                let id = self.enter_scope();
                block.scope = Some(id);
                for stmt in &mut block.stmts {
                    self.check_stmt(stmt)?;
                }
                self.exit_scope();
                Ok(())
            }

            StmtKind::If { cond, then_stmt, else_stmt } => {
                self.check_cond(cond)?;
                self.check_stmt(then_stmt)?;
                if let Some(else_stmt) = else_stmt {
                    self.check_stmt(else_stmt)?;
                }
                Ok(())
            }

            StmtKind::Switch(sw) => {
                self.check_expr(&mut sw.value)?;
                if !sw.value.ty().is_num() {
                    return Err(CompileError::type_error(
                        "switch value must be an integer",
                        sw.value.span,
                    ));
                }
                let state = self.state();
                let saved_break = state.break_ok;
                state.break_ok = true;
                state.switches.push(SwitchCtx::default());

                self.check_stmt(&mut sw.body)?;

                let state = self.state();
                let ctx = state.switches.pop().expect("switch context active");
                state.break_ok = saved_break;
                sw.case_values = ctx.case_values;
                sw.has_default = ctx.has_default;
                Ok(())
            }

            StmtKind::Case { value } => {
                let value = *value;
                let state = self.state();
                let Some(ctx) = state.switches.last_mut() else {
                    return Err(CompileError::control_flow(
                        "`case` cannot be used outside of `switch`",
                        span,
                    ));
                };
                if ctx.case_values.contains(&value) {
                    return Err(CompileError::control_flow(
                        format!("case value `{}` already defined", value),
                        span,
                    ));
                }
                ctx.case_values.push(value);
                Ok(())
            }

            StmtKind::Default => {
                let state = self.state();
                let Some(ctx) = state.switches.last_mut() else {
                    return Err(CompileError::control_flow(
                        "`default` cannot be used outside of `switch`",
                        span,
                    ));
                };
                if ctx.has_default {
                    return Err(CompileError::control_flow(
                        "`default` already defined in `switch`",
                        span,
                    ));
                }
                ctx.has_default = true;
                Ok(())
            }

            StmtKind::While { cond, body } => {
                self.check_cond(cond)?;
                self.check_loop_body(body)
            }

            StmtKind::DoWhile { body, cond } => {
                self.check_loop_body(body)?;
                self.check_cond(cond)
            }

            StmtKind::For { pre, cond, post, body } => {
                if let Some(pre) = pre {
                    self.check_expr(pre)?;
                }
                if let Some(cond) = cond {
                    self.check_cond(cond)?;
                }
                if let Some(post) = post {
                    self.check_expr(post)?;
                }
                self.check_loop_body(body)
            }

            StmtKind::Break => {
                if !self.state().break_ok {
                    return Err(CompileError::control_flow(
                        "`break` cannot be used outside of loop",
                        span,
                    ));
                }
                Ok(())
            }

            StmtKind::Continue => {
                if !self.state().continue_ok {
                    return Err(CompileError::control_flow(
                        "`continue` cannot be used outside of loop",
                        span,
                    ));
                }
                Ok(())
            }

            StmtKind::Return(value) => {
                let ret = self.state().ret.clone();
                match value {
                    None => {
                        if !ret.is_void() {
                            return Err(CompileError::type_error(
                                "`return` requires a value",
                                span,
                            ));
                        }
                    }
                    Some(expr) => {
                        if ret.is_void() {
                            return Err(CompileError::type_error(
                                "void function returns a value",
                                span,
                            ));
                        }
                        self.check_expr(expr)?;
                        let old = std::mem::replace(expr, Expr::new(ExprKind::int(0), span));
                        *expr = self.make_cast(ret, old, true)?;
                    }
                }
                Ok(())
            }

            StmtKind::Goto { label } => {
                let label = label.clone();
                self.state().gotos.push((label, span));
                Ok(())
            }

            StmtKind::Label { name, stmt } => {
                let name = name.clone();
                let state = self.state();
                if state.labels.contains(&name) {
                    return Err(CompileError::redeclaration(name, span));
                }
                state.labels.push(name);
                self.check_stmt(stmt)
            }

            StmtKind::VarDecl(node) => self.check_vardecl(node),
        }
    }

    fn check_loop_body(&mut self, body: &mut Stmt) -> CompileResult<()> {
        let state = self.state();
        let saved = (state.break_ok, state.continue_ok);
        state.break_ok = true;
        state.continue_ok = true;

        self.check_stmt(body)?;

        let state = self.state();
        (state.break_ok, state.continue_ok) = saved;
        Ok(())
    }

    /// Condition of `if`/`while`/`for`: any scalar value.
    fn check_cond(&mut self, cond: &mut Expr) -> CompileResult<()> {
        self.check_expr(cond)?;
        let ty = cond.ty();
        if !(ty.is_num() || ty.is_ptr() || ty.is_array()) {
            return Err(CompileError::type_error("scalar condition expected", cond.span));
        }
        Ok(())
    }

    // ---- variable declarations ----

    /// Local declarations: register in the current scope and lower
    /// initializers to synthetic assignment statements.
    fn check_vardecl(&mut self, node: &mut VarDeclStmt) -> CompileResult<()> {
        let mut inits = Vec::new();
        for decl in &mut node.decls {
            if decl.ty.is_array() {
                if let Some(init) = &decl.init {
                    crate::init::fix_array_size(&mut decl.ty, init, decl.span)?;
                }
            }

            if decl.flags.is_extern {
                if decl.init.is_some() {
                    return Err(CompileError::illegal_initializer(
                        "extern with initializer",
                        decl.span,
                    ));
                }
                // The reference resolves through the global table.
                if !self.globals.contains(&decl.name) {
                    let mut info =
                        VarInfo::new(&*decl.name, decl.ty.clone(), decl.flags, decl.span);
                    info.label = Some(decl.name.clone());
                    self.globals.define(info);
                }
                continue;
            }

            if decl.flags.is_static {
                // Hoist to an anonymous global; the initializer is handled
                // like a global variable's.
                let label = self.alloc_label();
                let mut init = decl.init.take();
                if let Some(init) = &mut init {
                    self.analyze_initializer(init)?;
                }
                let checked = self.check_global_initializer(&decl.ty, init, decl.span)?;
                let mut global =
                    VarInfo::new(&*label, decl.ty.clone(), decl.flags, decl.span);
                global.init = checked;
                global.label = Some(label.clone());
                self.globals.define(global);

                let mut info = VarInfo::new(&*decl.name, decl.ty.clone(), decl.flags, decl.span);
                info.label = Some(label);
                self.add_cur_scope(info)?;
                continue;
            }

            let info = VarInfo::new(&*decl.name, decl.ty.clone(), decl.flags, decl.span);
            self.add_cur_scope(info)?;

            if let Some(mut init) = decl.init.take() {
                self.analyze_initializer(&mut init)?;
                let mut target = Expr::new(
                    ExprKind::Var { name: decl.name.clone(), global: false, local: None },
                    decl.span,
                );
                self.check_expr(&mut target)?;
                self.assign_initial_value(target, &init, &mut inits)?;
            }
        }
        node.inits = inits;
        Ok(())
    }

    /// File-scope declarations.
    fn check_global_vardecl(&mut self, decls: &mut Vec<VarDecl>) -> CompileResult<()> {
        for decl in decls {
            if decl.flags.is_extern && decl.init.is_some() {
                return Err(CompileError::illegal_initializer(
                    "extern with initializer",
                    decl.span,
                ));
            }
            if decl.ty.is_array() {
                if let Some(init) = &decl.init {
                    crate::init::fix_array_size(&mut decl.ty, init, decl.span)?;
                }
            }

            let existing_extern =
                self.globals.find(&decl.name).map(|info| info.flags.is_extern);
            match existing_extern {
                Some(was_extern) => {
                    // A matching extern declaration is harmless; anything
                    // else is a redeclaration.
                    if !(was_extern || decl.flags.is_extern) {
                        return Err(CompileError::redeclaration(&*decl.name, decl.span));
                    }
                    if was_extern && !decl.flags.is_extern {
                        let info =
                            self.globals.find_mut(&decl.name).expect("checked above");
                        info.flags = decl.flags;
                        info.ty = decl.ty.clone();
                    } else {
                        continue;
                    }
                }
                None => {
                    let mut info =
                        VarInfo::new(&*decl.name, decl.ty.clone(), decl.flags, decl.span);
                    info.label = Some(decl.name.clone());
                    self.globals.define(info);
                }
            }

            let mut init = decl.init.take();
            if let Some(init) = &mut init {
                self.analyze_initializer(init)?;
            }
            let checked = self.check_global_initializer(&decl.ty, init, decl.span)?;
            let info = self.globals.find_mut(&decl.name).expect("just defined");
            info.ty = decl.ty.clone();
            info.init = checked;
        }
        Ok(())
    }
}
