//! Lowering from the typed AST to the three-address IR.
//!
//! Expressions spawn a fresh virtual register per value; statements shape the
//! basic-block graph. Short-circuit operators and conditionals branch to
//! merge blocks; `switch` becomes a compare-and-jump chain. Every block ends
//! in its terminator: after an unconditional jump a fresh block is opened.

use crate::ir::*;
use crate::regalloc::alloc_real_registers;
use hashbrown::HashMap;
use smallvec::SmallVec;
use xcc_common::{CompileError, CompileResult};
use xcc_parser::{
    BinaryOp, Declaration, Expr, ExprKind, Function, Program, ScopeId, Stmt, StmtKind, Type,
    UnaryOp, WORD_SIZE,
};

/// Lower every defined function of `program`.
pub fn lower_program(program: &Program) -> CompileResult<IrModule> {
    let mut strings = StringPool::default();
    let mut funcs = Vec::new();
    for decl in &program.decls {
        if let Declaration::Function(func) = decl {
            if func.body.is_some() {
                funcs.push(FuncBuilder::new(program, &mut strings, func).build()?);
            }
        }
    }
    log::debug!(
        "lowered {} functions, {} pooled strings",
        funcs.len(),
        strings.entries.len()
    );
    Ok(IrModule { funcs, strings: strings.entries })
}

/// Labels for string literals used in expression context.
#[derive(Default)]
struct StringPool {
    entries: Vec<(String, Vec<u8>)>,
}

impl StringPool {
    fn intern(&mut self, bytes: &[u8]) -> String {
        if let Some((label, _)) = self.entries.iter().find(|(_, b)| b == bytes) {
            return label.clone();
        }
        let label = format!(".Lstr{}", self.entries.len());
        self.entries.push((label.clone(), bytes.to_vec()));
        label
    }
}

struct SwitchFrame {
    case_bbs: Vec<BBId>,
    cursor: usize,
    default_bb: Option<BBId>,
}

struct FuncBuilder<'a> {
    program: &'a Program,
    func: &'a Function,
    strings: &'a mut StringPool,
    vregs: Vec<VReg>,
    bbs: Vec<BB>,
    layout: Vec<BBId>,
    cur_bb: BBId,
    var_map: HashMap<(ScopeId, usize), VRegId>,
    params: Vec<VRegId>,
    break_stack: Vec<BBId>,
    continue_stack: Vec<BBId>,
    switch_stack: Vec<SwitchFrame>,
    label_bbs: HashMap<String, BBId>,
    exit_bb: BBId,
}

impl<'a> FuncBuilder<'a> {
    fn new(program: &'a Program, strings: &'a mut StringPool, func: &'a Function) -> Self {
        Self {
            program,
            func,
            strings,
            vregs: Vec::new(),
            bbs: Vec::new(),
            layout: Vec::new(),
            cur_bb: 0,
            var_map: HashMap::new(),
            params: Vec::new(),
            break_stack: Vec::new(),
            continue_stack: Vec::new(),
            switch_stack: Vec::new(),
            label_bbs: HashMap::new(),
            exit_bb: 0,
        }
    }

    fn build(mut self) -> CompileResult<IrFunction> {
        self.spawn_var_regs();

        let entry = self.new_bb();
        self.exit_bb = self.new_bb();
        self.set_curbb(entry);

        for stmt in self.func.body.as_ref().expect("function has a body") {
            self.gen_stmt(stmt)?;
        }
        let exit = self.exit_bb;
        self.set_curbb(exit);

        let mut func = IrFunction {
            name: self.func.name.clone(),
            params: self.params,
            bbs: self.bbs,
            layout: self.layout,
            vregs: self.vregs,
            frame_size: 0,
            used_reg_bits: 0,
        };
        func.frame_size = alloc_real_registers(&mut func);
        log::debug!(
            "`{}`: {} blocks, {} vregs, frame {} bytes",
            func.name,
            func.layout.len(),
            func.vregs.len(),
            func.frame_size
        );
        Ok(func)
    }

    /// Create a virtual register for every local in every scope. Parameters
    /// are always spilled; stack-passed parameters get their caller-side
    /// offset up front.
    fn spawn_var_regs(&mut self) {
        for (scope_id, scope) in self.func.scopes.iter().enumerate() {
            for (index, var) in scope.vars.iter().enumerate() {
                if var.label.is_some() {
                    // Static local: lives in the data segment.
                    continue;
                }
                let size = var.ty.size(&self.program.structs).max(1);
                let align = var.ty.align(&self.program.structs).max(1);
                let vreg = self.new_vreg(size, align);
                if var.force_stack {
                    self.vregs[vreg].spill = true;
                }
                if scope_id == 0 {
                    // Parameter scope.
                    let param_index = self.params.len();
                    self.vregs[vreg].spill = true;
                    if param_index >= MAX_REG_ARGS {
                        self.vregs[vreg].offset =
                            (16 + (param_index - MAX_REG_ARGS) * WORD_SIZE) as i32;
                    }
                    self.params.push(vreg);
                }
                self.var_map.insert((scope_id, index), vreg);
            }
        }
    }

    // ---- plumbing ----

    fn new_vreg(&mut self, size: usize, align: usize) -> VRegId {
        let id = self.vregs.len();
        self.vregs.push(VReg { id, rreg: None, spill: false, offset: 0, size, align });
        id
    }

    fn new_bb(&mut self) -> BBId {
        self.bbs.push(BB::default());
        self.bbs.len() - 1
    }

    /// Append `bb` to the layout and make it current; the previous block
    /// falls through into it.
    fn set_curbb(&mut self, bb: BBId) {
        self.layout.push(bb);
        self.cur_bb = bb;
    }

    fn emit(&mut self, ir: Ir) {
        self.bbs[self.cur_bb].irs.push(ir);
    }

    fn size_of(&self, ty: &Type) -> usize {
        ty.size(&self.program.structs)
    }

    fn is_aggregate(ty: &Type) -> bool {
        ty.is_array() || ty.is_struct()
    }

    fn internal(expr: &Expr, what: &str) -> CompileError {
        CompileError::internal_at(format!("lowering: {}", what), expr.span)
    }

    // ---- statements ----

    fn gen_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.gen_expr(expr)?;
                Ok(())
            }

            StmtKind::Block(block) => {
                for stmt in &block.stmts {
                    self.gen_stmt(stmt)?;
                }
                Ok(())
            }

            StmtKind::If { cond, then_stmt, else_stmt } => {
                let false_bb = self.new_bb();
                self.gen_cond_jmp(cond, false, false_bb)?;
                self.gen_stmt(then_stmt)?;
                match else_stmt {
                    None => self.set_curbb(false_bb),
                    Some(else_stmt) => {
                        let end_bb = self.new_bb();
                        self.emit(Ir::new(IrKind::Jmp { bb: end_bb, cond: Cond::Any }, WORD_SIZE));
                        self.set_curbb(false_bb);
                        self.gen_stmt(else_stmt)?;
                        self.set_curbb(end_bb);
                    }
                }
                Ok(())
            }

            StmtKind::Switch(sw) => self.gen_switch(sw),

            StmtKind::Case { .. } => {
                let frame = self
                    .switch_stack
                    .last_mut()
                    .expect("case marker outside switch survived sema");
                let bb = frame.case_bbs[frame.cursor];
                frame.cursor += 1;
                self.set_curbb(bb);
                Ok(())
            }

            StmtKind::Default => {
                let frame = self
                    .switch_stack
                    .last_mut()
                    .expect("default marker outside switch survived sema");
                let bb = frame.default_bb.expect("switch has a default block");
                self.set_curbb(bb);
                Ok(())
            }

            StmtKind::While { cond, body } => {
                let cond_bb = self.new_bb();
                let break_bb = self.new_bb();
                self.set_curbb(cond_bb);
                self.gen_cond_jmp(cond, false, break_bb)?;

                self.continue_stack.push(cond_bb);
                self.break_stack.push(break_bb);
                self.gen_stmt(body)?;
                self.continue_stack.pop();
                self.break_stack.pop();

                self.emit(Ir::new(IrKind::Jmp { bb: cond_bb, cond: Cond::Any }, WORD_SIZE));
                self.set_curbb(break_bb);
                Ok(())
            }

            StmtKind::DoWhile { body, cond } => {
                let body_bb = self.new_bb();
                let cond_bb = self.new_bb();
                let break_bb = self.new_bb();
                self.set_curbb(body_bb);

                self.continue_stack.push(cond_bb);
                self.break_stack.push(break_bb);
                self.gen_stmt(body)?;
                self.continue_stack.pop();
                self.break_stack.pop();

                self.set_curbb(cond_bb);
                self.gen_cond_jmp(cond, true, body_bb)?;
                self.set_curbb(break_bb);
                Ok(())
            }

            StmtKind::For { pre, cond, post, body } => {
                if let Some(pre) = pre {
                    self.gen_expr(pre)?;
                }
                let cond_bb = self.new_bb();
                let continue_bb = self.new_bb();
                let break_bb = self.new_bb();
                self.set_curbb(cond_bb);
                if let Some(cond) = cond {
                    self.gen_cond_jmp(cond, false, break_bb)?;
                }

                self.continue_stack.push(continue_bb);
                self.break_stack.push(break_bb);
                self.gen_stmt(body)?;
                self.continue_stack.pop();
                self.break_stack.pop();

                self.set_curbb(continue_bb);
                if let Some(post) = post {
                    self.gen_expr(post)?;
                }
                self.emit(Ir::new(IrKind::Jmp { bb: cond_bb, cond: Cond::Any }, WORD_SIZE));
                self.set_curbb(break_bb);
                Ok(())
            }

            StmtKind::Break => {
                let target = *self.break_stack.last().expect("break outside loop survived sema");
                self.jump_away(target);
                Ok(())
            }

            StmtKind::Continue => {
                let target = *self
                    .continue_stack
                    .last()
                    .expect("continue outside loop survived sema");
                self.jump_away(target);
                Ok(())
            }

            StmtKind::Return(value) => {
                if let Some(value) = value {
                    let v = self.gen_expr(value)?;
                    let size = self.size_of(value.ty());
                    self.emit(Ir::new(IrKind::Result, size).with_opr1(v));
                }
                let exit = self.exit_bb;
                self.jump_away(exit);
                Ok(())
            }

            StmtKind::Goto { label } => {
                let bb = self.label_bb(label);
                self.jump_away(bb);
                Ok(())
            }

            StmtKind::Label { name, stmt } => {
                let bb = self.label_bb(name);
                self.set_curbb(bb);
                self.gen_stmt(stmt)
            }

            StmtKind::VarDecl(decl) => {
                for stmt in &decl.inits {
                    self.gen_stmt(stmt)?;
                }
                Ok(())
            }
        }
    }

    fn gen_switch(&mut self, sw: &xcc_parser::SwitchStmt) -> CompileResult<()> {
        let value = self.gen_expr(&sw.value)?;
        let size = self.size_of(sw.value.ty());

        let case_bbs: Vec<BBId> = sw.case_values.iter().map(|_| self.new_bb()).collect();
        let default_bb = if sw.has_default { Some(self.new_bb()) } else { None };
        let break_bb = self.new_bb();

        // Compare-and-jump chain.
        for (i, &case_value) in sw.case_values.iter().enumerate() {
            let tmp = self.new_vreg(size, size);
            self.emit(Ir::new(IrKind::Imm { value: case_value }, size).with_dst(tmp));
            self.emit(Ir::new(IrKind::Cmp, size).with_opr1(value).with_opr2(tmp));
            self.emit(Ir::new(IrKind::Jmp { bb: case_bbs[i], cond: Cond::Eq }, size));
        }
        let fallback = default_bb.unwrap_or(break_bb);
        self.jump_away(fallback);

        self.break_stack.push(break_bb);
        self.switch_stack.push(SwitchFrame { case_bbs, cursor: 0, default_bb });
        self.gen_stmt(&sw.body)?;
        self.switch_stack.pop();
        self.break_stack.pop();

        self.set_curbb(break_bb);
        Ok(())
    }

    /// Emit an unconditional jump and open a fresh block so that later
    /// (unreachable) statements do not trail a terminator.
    fn jump_away(&mut self, target: BBId) {
        self.emit(Ir::new(IrKind::Jmp { bb: target, cond: Cond::Any }, WORD_SIZE));
        let cont = self.new_bb();
        self.set_curbb(cont);
    }

    fn label_bb(&mut self, name: &str) -> BBId {
        if let Some(&bb) = self.label_bbs.get(name) {
            return bb;
        }
        let bb = self.new_bb();
        self.label_bbs.insert(name.to_string(), bb);
        bb
    }

    // ---- conditions ----

    /// Jump to `target` when `cond` is true (or false). Comparisons compile
    /// straight to a flag test; everything else is tested against zero.
    fn gen_cond_jmp(&mut self, cond: &Expr, jump_if_true: bool, target: BBId) -> CompileResult<()> {
        if let ExprKind::Bin { op, lhs, rhs } = &cond.kind {
            if op.is_comparison() {
                let l = self.gen_expr(lhs)?;
                let r = self.gen_expr(rhs)?;
                let size = self.size_of(lhs.ty());
                self.emit(Ir::new(IrKind::Cmp, size).with_opr1(l).with_opr2(r));
                let mut cc = compare_cond(*op, comparison_is_unsigned(lhs.ty()));
                if !jump_if_true {
                    cc = cc.inverted();
                }
                self.emit(Ir::new(IrKind::Jmp { bb: target, cond: cc }, size));
                return Ok(());
            }
        }
        let v = self.gen_expr(cond)?;
        let size = self.size_of(cond.ty());
        self.emit(Ir::new(IrKind::Test, size).with_opr1(v));
        let cc = if jump_if_true { Cond::Ne } else { Cond::Eq };
        self.emit(Ir::new(IrKind::Jmp { bb: target, cond: cc }, size));
        Ok(())
    }

    // ---- expressions ----

    fn gen_expr(&mut self, expr: &Expr) -> CompileResult<VRegId> {
        let ty = expr.ty();
        let size = self.size_of(ty);
        match &expr.kind {
            ExprKind::Num { value, .. } => {
                let dst = self.new_vreg(size, size);
                self.emit(Ir::new(IrKind::Imm { value: *value }, size).with_dst(dst));
                Ok(dst)
            }

            ExprKind::Str(bytes) => {
                let label = self.strings.intern(bytes);
                let dst = self.new_vreg(WORD_SIZE, WORD_SIZE);
                self.emit(Ir::new(IrKind::Iofs { label }, WORD_SIZE).with_dst(dst));
                Ok(dst)
            }

            ExprKind::Var { name, global, local } => {
                if *global {
                    let addr = self.new_vreg(WORD_SIZE, WORD_SIZE);
                    self.emit(
                        Ir::new(IrKind::Iofs { label: name.clone() }, WORD_SIZE).with_dst(addr),
                    );
                    if Self::is_aggregate(ty) || ty.is_func() {
                        return Ok(addr);
                    }
                    let dst = self.new_vreg(size, size);
                    self.emit(
                        Ir::new(IrKind::Load { unsigned: ty.is_unsigned() }, size)
                            .with_dst(dst)
                            .with_opr1(addr),
                    );
                    return Ok(dst);
                }
                let key = local.ok_or_else(|| Self::internal(expr, "unresolved local"))?;
                let vreg = *self
                    .var_map
                    .get(&key)
                    .ok_or_else(|| Self::internal(expr, "local without register"))?;
                if Self::is_aggregate(ty) {
                    let dst = self.new_vreg(WORD_SIZE, WORD_SIZE);
                    self.emit(Ir::new(IrKind::Bofs { src: vreg }, WORD_SIZE).with_dst(dst));
                    return Ok(dst);
                }
                Ok(vreg)
            }

            ExprKind::Bin { op, lhs, rhs } => self.gen_bin(expr, *op, lhs, rhs),

            ExprKind::Unary { op, sub } => match op {
                UnaryOp::Neg | UnaryOp::BitNot => {
                    let v = self.gen_expr(sub)?;
                    let dst = self.new_vreg(size, size);
                    let kind = if *op == UnaryOp::Neg { IrKind::Neg } else { IrKind::BitNot };
                    self.emit(Ir::new(kind, size).with_dst(dst).with_opr1(v));
                    Ok(dst)
                }
                UnaryOp::LogNot => {
                    let v = self.gen_expr(sub)?;
                    let dst = self.new_vreg(4, 4);
                    let sub_size = self.size_of(sub.ty());
                    self.emit(Ir::new(IrKind::Not, sub_size).with_dst(dst).with_opr1(v));
                    Ok(dst)
                }
                UnaryOp::Deref => {
                    let addr = self.gen_expr(sub)?;
                    if Self::is_aggregate(ty) {
                        return Ok(addr);
                    }
                    let dst = self.new_vreg(size, size);
                    self.emit(
                        Ir::new(IrKind::Load { unsigned: ty.is_unsigned() }, size)
                            .with_dst(dst)
                            .with_opr1(addr),
                    );
                    Ok(dst)
                }
                UnaryOp::Ref => self.gen_lval(sub),
            },

            ExprKind::Member { .. } => {
                let addr = self.gen_lval(expr)?;
                if Self::is_aggregate(ty) {
                    return Ok(addr);
                }
                let dst = self.new_vreg(size, size);
                self.emit(
                    Ir::new(IrKind::Load { unsigned: ty.is_unsigned() }, size)
                        .with_dst(dst)
                        .with_opr1(addr),
                );
                Ok(dst)
            }

            ExprKind::Cast { to, sub, .. } => {
                let v = self.gen_expr(sub)?;
                let src_ty = sub.ty();
                if Self::is_aggregate(src_ty) || src_ty.is_func() {
                    // Arrays and functions are already addresses.
                    return Ok(v);
                }
                let src_size = self.size_of(src_ty);
                if src_size == size {
                    return Ok(v);
                }
                let dst = self.new_vreg(size, size);
                self.emit(
                    Ir::new(
                        IrKind::Cast {
                            src_size,
                            src_unsigned: src_ty.is_unsigned(),
                            dst_unsigned: to.is_unsigned(),
                        },
                        size,
                    )
                    .with_dst(dst)
                    .with_opr1(v),
                );
                Ok(dst)
            }

            ExprKind::Call { callee, args } => self.gen_call(expr, callee, args),

            ExprKind::Ternary { cond, then_expr, else_expr } => {
                // Aggregates flow through as addresses.
                let size = if Self::is_aggregate(ty) { WORD_SIZE } else { size.max(1) };
                let result = self.new_vreg(size, size);
                let else_bb = self.new_bb();
                let end_bb = self.new_bb();
                self.gen_cond_jmp(cond, false, else_bb)?;
                let t = self.gen_expr(then_expr)?;
                self.emit(Ir::new(IrKind::Mov, size).with_dst(result).with_opr1(t));
                self.emit(Ir::new(IrKind::Jmp { bb: end_bb, cond: Cond::Any }, size));
                self.set_curbb(else_bb);
                let e = self.gen_expr(else_expr)?;
                self.emit(Ir::new(IrKind::Mov, size).with_dst(result).with_opr1(e));
                self.set_curbb(end_bb);
                Ok(result)
            }

            ExprKind::Comma { lhs, rhs } => {
                self.gen_expr(lhs)?;
                self.gen_expr(rhs)
            }

            ExprKind::Assign { lhs, rhs } => self.gen_assign(lhs, rhs),

            ExprKind::AssignWith { op, lhs, rhs } => self.gen_assign_with(expr, *op, lhs, rhs),

            ExprKind::IncDec { inc, postfix, sub } => {
                self.gen_incdec(expr, *inc, *postfix, sub)
            }

            ExprKind::SizeofExpr(_) | ExprKind::SizeofType(_) | ExprKind::Subscript { .. } => {
                Err(Self::internal(expr, "node should have been lowered by sema"))
            }
        }
    }

    fn gen_bin(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> CompileResult<VRegId> {
        use BinaryOp::*;
        match op {
            LogAnd | LogOr => self.gen_logical(op, lhs, rhs),

            Eq | Ne | Lt | Le | Gt | Ge => {
                let l = self.gen_expr(lhs)?;
                let r = self.gen_expr(rhs)?;
                let size = self.size_of(lhs.ty());
                self.emit(Ir::new(IrKind::Cmp, size).with_opr1(l).with_opr2(r));
                let cc = compare_cond(op, comparison_is_unsigned(lhs.ty()));
                let dst = self.new_vreg(4, 4);
                self.emit(Ir::new(IrKind::Set { cond: cc }, 4).with_dst(dst));
                Ok(dst)
            }

            _ => {
                let ty = expr.ty();
                let size = self.size_of(ty);
                let l = self.gen_expr(lhs)?;
                let r = self.gen_expr(rhs)?;
                let dst = self.new_vreg(size, size);
                let kind = binop_kind(op, ty.is_unsigned());
                self.emit(Ir::new(kind, size).with_dst(dst).with_opr1(l).with_opr2(r));
                Ok(dst)
            }
        }
    }

    /// Short-circuit `&&` / `||` materialised as 0 or 1.
    fn gen_logical(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> CompileResult<VRegId> {
        let result = self.new_vreg(4, 4);
        let shortcut_bb = self.new_bb();
        let end_bb = self.new_bb();
        let and = op == BinaryOp::LogAnd;

        // For `&&` jump to the 0-block on false; for `||` to the 1-block
        // on true.
        self.gen_cond_jmp(lhs, !and, shortcut_bb)?;
        self.gen_cond_jmp(rhs, !and, shortcut_bb)?;
        let through = if and { 1 } else { 0 };
        self.emit(Ir::new(IrKind::Imm { value: through }, 4).with_dst(result));
        self.emit(Ir::new(IrKind::Jmp { bb: end_bb, cond: Cond::Any }, 4));
        self.set_curbb(shortcut_bb);
        self.emit(Ir::new(IrKind::Imm { value: 1 - through }, 4).with_dst(result));
        self.set_curbb(end_bb);
        Ok(result)
    }

    fn gen_call(&mut self, expr: &Expr, callee: &Expr, args: &[Expr]) -> CompileResult<VRegId> {
        let arg_vregs = args
            .iter()
            .map(|a| self.gen_expr(a))
            .collect::<CompileResult<SmallVec<[VRegId; MAX_REG_ARGS]>>>()?;
        for &arg in arg_vregs.iter().rev() {
            self.emit(Ir::new(IrKind::PushArg, WORD_SIZE).with_opr1(arg));
        }

        let mut call = match &callee.kind {
            ExprKind::Var { name, global: true, .. } if callee.ty().is_func() => {
                Ir::new(IrKind::Call { label: Some(name.clone()), arg_count: args.len() }, WORD_SIZE)
            }
            _ => {
                let f = self.gen_expr(callee)?;
                Ir::new(IrKind::Call { label: None, arg_count: args.len() }, WORD_SIZE)
                    .with_opr1(f)
            }
        };

        let ret_ty = expr.ty();
        if ret_ty.is_void() {
            self.emit(call);
            // Value never read; a placeholder keeps the signature simple.
            return Ok(self.new_vreg(WORD_SIZE, WORD_SIZE));
        }
        let size = self.size_of(ret_ty);
        call.size = size;
        self.emit(call);
        let dst = self.new_vreg(size, size);
        self.emit(Ir::new(IrKind::Result, size).with_dst(dst));
        Ok(dst)
    }

    fn gen_assign(&mut self, lhs: &Expr, rhs: &Expr) -> CompileResult<VRegId> {
        let ty = lhs.ty();
        let size = self.size_of(ty);

        if ty.is_struct() {
            let src = self.gen_expr(rhs)?;
            let dst = self.gen_lval(lhs)?;
            self.emit(
                Ir::new(IrKind::Memcpy { size }, WORD_SIZE).with_opr1(src).with_opr2(dst),
            );
            return Ok(src);
        }

        if let Some(vreg) = self.local_scalar(lhs) {
            let v = self.gen_expr(rhs)?;
            self.emit(Ir::new(IrKind::Mov, size).with_dst(vreg).with_opr1(v));
            return Ok(v);
        }

        let v = self.gen_expr(rhs)?;
        let addr = self.gen_lval(lhs)?;
        self.emit(Ir::new(IrKind::Store, size).with_opr1(v).with_opr2(addr));
        Ok(v)
    }

    fn gen_assign_with(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> CompileResult<VRegId> {
        let ty = expr.ty();
        let size = self.size_of(ty);
        let kind = binop_kind(op, ty.is_unsigned());

        if let Some(vreg) = self.local_scalar(lhs) {
            let r = self.gen_expr(rhs)?;
            let dst = self.new_vreg(size, size);
            self.emit(Ir::new(kind, size).with_dst(dst).with_opr1(vreg).with_opr2(r));
            self.emit(Ir::new(IrKind::Mov, size).with_dst(vreg).with_opr1(dst));
            return Ok(dst);
        }

        let addr = self.gen_lval(lhs)?;
        let cur = self.new_vreg(size, size);
        self.emit(
            Ir::new(IrKind::Load { unsigned: ty.is_unsigned() }, size)
                .with_dst(cur)
                .with_opr1(addr),
        );
        let r = self.gen_expr(rhs)?;
        let dst = self.new_vreg(size, size);
        self.emit(Ir::new(kind, size).with_dst(dst).with_opr1(cur).with_opr2(r));
        self.emit(Ir::new(IrKind::Store, size).with_opr1(dst).with_opr2(addr));
        Ok(dst)
    }

    fn gen_incdec(
        &mut self,
        expr: &Expr,
        inc: bool,
        postfix: bool,
        sub: &Expr,
    ) -> CompileResult<VRegId> {
        let ty = expr.ty();
        let size = self.size_of(ty);
        let delta = match ty.pointee() {
            Some(elem) => self.size_of(elem) as i64,
            None => 1,
        };
        let kind = if inc { IrKind::Add } else { IrKind::Sub };

        let one = self.new_vreg(size, size);
        if let Some(vreg) = self.local_scalar(sub) {
            let old = if postfix {
                let old = self.new_vreg(size, size);
                self.emit(Ir::new(IrKind::Mov, size).with_dst(old).with_opr1(vreg));
                Some(old)
            } else {
                None
            };
            self.emit(Ir::new(IrKind::Imm { value: delta }, size).with_dst(one));
            let dst = self.new_vreg(size, size);
            self.emit(Ir::new(kind, size).with_dst(dst).with_opr1(vreg).with_opr2(one));
            self.emit(Ir::new(IrKind::Mov, size).with_dst(vreg).with_opr1(dst));
            return Ok(old.unwrap_or(dst));
        }

        let addr = self.gen_lval(sub)?;
        let cur = self.new_vreg(size, size);
        self.emit(
            Ir::new(IrKind::Load { unsigned: ty.is_unsigned() }, size)
                .with_dst(cur)
                .with_opr1(addr),
        );
        self.emit(Ir::new(IrKind::Imm { value: delta }, size).with_dst(one));
        let dst = self.new_vreg(size, size);
        self.emit(Ir::new(kind, size).with_dst(dst).with_opr1(cur).with_opr2(one));
        self.emit(Ir::new(IrKind::Store, size).with_opr1(dst).with_opr2(addr));
        Ok(if postfix { cur } else { dst })
    }

    /// The backing register of a plain scalar local, if `expr` is one.
    fn local_scalar(&self, expr: &Expr) -> Option<VRegId> {
        match &expr.kind {
            ExprKind::Var { global: false, local: Some(key), .. }
                if !Self::is_aggregate(expr.ty()) =>
            {
                self.var_map.get(key).copied()
            }
            _ => None,
        }
    }

    /// Compute the address of an lvalue into a fresh register.
    fn gen_lval(&mut self, expr: &Expr) -> CompileResult<VRegId> {
        match &expr.kind {
            ExprKind::Var { name, global: true, .. } => {
                let dst = self.new_vreg(WORD_SIZE, WORD_SIZE);
                self.emit(Ir::new(IrKind::Iofs { label: name.clone() }, WORD_SIZE).with_dst(dst));
                Ok(dst)
            }

            ExprKind::Var { local: Some(key), .. } => {
                let vreg = *self
                    .var_map
                    .get(key)
                    .ok_or_else(|| Self::internal(expr, "local without register"))?;
                if !self.vregs[vreg].spill {
                    return Err(Self::internal(expr, "address of unspilled local"));
                }
                let dst = self.new_vreg(WORD_SIZE, WORD_SIZE);
                self.emit(Ir::new(IrKind::Bofs { src: vreg }, WORD_SIZE).with_dst(dst));
                Ok(dst)
            }

            ExprKind::Str(bytes) => {
                let label = self.strings.intern(bytes);
                let dst = self.new_vreg(WORD_SIZE, WORD_SIZE);
                self.emit(Ir::new(IrKind::Iofs { label }, WORD_SIZE).with_dst(dst));
                Ok(dst)
            }

            ExprKind::Unary { op: UnaryOp::Deref, sub } => self.gen_expr(sub),

            ExprKind::Member { base, index, .. } => {
                let index = index.ok_or_else(|| Self::internal(expr, "unresolved member"))?;
                let base_addr = self.gen_lval(base)?;
                let Type::Struct(id) = base.ty() else {
                    return Err(Self::internal(expr, "member of non-struct"));
                };
                let offset = self.program.structs.info(*id).members[index].offset;
                if offset == 0 {
                    return Ok(base_addr);
                }
                let off = self.new_vreg(WORD_SIZE, WORD_SIZE);
                self.emit(
                    Ir::new(IrKind::Imm { value: offset as i64 }, WORD_SIZE).with_dst(off),
                );
                let dst = self.new_vreg(WORD_SIZE, WORD_SIZE);
                self.emit(
                    Ir::new(IrKind::Add, WORD_SIZE)
                        .with_dst(dst)
                        .with_opr1(base_addr)
                        .with_opr2(off),
                );
                Ok(dst)
            }

            _ => Err(Self::internal(expr, "not an lvalue")),
        }
    }
}

fn binop_kind(op: BinaryOp, unsigned: bool) -> IrKind {
    match op {
        BinaryOp::Add => IrKind::Add,
        BinaryOp::Sub => IrKind::Sub,
        BinaryOp::Mul => IrKind::Mul,
        BinaryOp::Div => IrKind::Div { unsigned },
        BinaryOp::Mod => IrKind::Mod { unsigned },
        BinaryOp::BitAnd => IrKind::BitAnd,
        BinaryOp::BitOr => IrKind::BitOr,
        BinaryOp::BitXor => IrKind::BitXor,
        BinaryOp::LShift => IrKind::LShift,
        BinaryOp::RShift => IrKind::RShift { unsigned },
        _ => unreachable!("not a two-operand arithmetic operator"),
    }
}

fn compare_cond(op: BinaryOp, unsigned: bool) -> Cond {
    match (op, unsigned) {
        (BinaryOp::Eq, _) => Cond::Eq,
        (BinaryOp::Ne, _) => Cond::Ne,
        (BinaryOp::Lt, false) => Cond::Lt,
        (BinaryOp::Le, false) => Cond::Le,
        (BinaryOp::Gt, false) => Cond::Gt,
        (BinaryOp::Ge, false) => Cond::Ge,
        (BinaryOp::Lt, true) => Cond::ULt,
        (BinaryOp::Le, true) => Cond::ULe,
        (BinaryOp::Gt, true) => Cond::UGt,
        (BinaryOp::Ge, true) => Cond::UGe,
        _ => unreachable!("not a comparison"),
    }
}

/// Pointers compare unsigned; integers follow their type.
fn comparison_is_unsigned(ty: &Type) -> bool {
    ty.is_unsigned() || !ty.is_num()
}
