//! Expression typing.
//!
//! Implements the usual arithmetic conversions, pointer arithmetic scaling,
//! member resolution, call checking and constant folding. Every analysed
//! expression carries a concrete type; implicit conversions become explicit
//! `Cast` nodes.

use crate::checker::Analyzer;
use xcc_common::{CompileError, CompileResult, Span};
use xcc_parser::{BinaryOp, Expr, ExprKind, NumKind, Type, UnaryOp};

impl Analyzer<'_> {
    /// Type `expr` in place.
    pub(crate) fn check_expr(&mut self, expr: &mut Expr) -> CompileResult<()> {
        let taken = std::mem::replace(expr, Expr::new(ExprKind::int(0), expr.span));
        *expr = self.analyze_expr(taken)?;
        Ok(())
    }

    pub(crate) fn analyze_expr(&mut self, expr: Expr) -> CompileResult<Expr> {
        let span = expr.span;
        match expr.kind {
            ExprKind::Num { value, kind, unsigned } => Ok(Expr::typed(
                ExprKind::Num { value, kind, unsigned },
                span,
                Type::Num { kind, unsigned },
            )),

            // A string literal is an array of char including the terminator.
            ExprKind::Str(bytes) => {
                let ty = Type::char_type().array_of(Some(bytes.len() + 1));
                Ok(Expr::typed(ExprKind::Str(bytes), span, ty))
            }

            ExprKind::Var { name, .. } => self.analyze_var(name, span),

            ExprKind::Bin { op, lhs, rhs } => {
                let lhs = self.analyze_expr(*lhs)?;
                let rhs = self.analyze_expr(*rhs)?;
                self.analyze_bin(op, lhs, rhs, span)
            }

            ExprKind::Unary { op, sub } => {
                let sub = self.analyze_expr(*sub)?;
                self.analyze_unary(op, sub, span)
            }

            ExprKind::Member { base, name, arrow, .. } => {
                let base = self.analyze_expr(*base)?;
                self.analyze_member(base, name, arrow, span)
            }

            ExprKind::Subscript { base, index } => {
                let base = self.analyze_expr(*base)?;
                let index = self.analyze_expr(*index)?;
                // a[i] is *(a + i); i[a] is also accepted.
                let (ptr, idx) = if base.ty().pointee().is_some() {
                    (base, index)
                } else if index.ty().pointee().is_some() {
                    (index, base)
                } else {
                    return Err(CompileError::type_error("cannot subscript", span));
                };
                let sum = self.pointer_add(BinaryOp::Add, ptr, idx, span)?;
                let elem = sum.ty().pointee().cloned().expect("pointer sum");
                Ok(Expr::typed(
                    ExprKind::Unary { op: UnaryOp::Deref, sub: Box::new(sum) },
                    span,
                    elem,
                ))
            }

            ExprKind::Cast { to, sub, implicit } => {
                let sub = self.analyze_expr(*sub)?;
                self.make_cast(to, sub, implicit)
            }

            ExprKind::Call { callee, args } => {
                let callee = self.analyze_expr(*callee)?;
                let args = args
                    .into_iter()
                    .map(|a| self.analyze_expr(a))
                    .collect::<CompileResult<Vec<_>>>()?;
                self.analyze_call(callee, args, span)
            }

            ExprKind::Ternary { cond, then_expr, else_expr } => {
                let cond = self.analyze_expr(*cond)?;
                self.require_scalar(&cond)?;
                let then_expr = self.analyze_expr(*then_expr)?;
                let else_expr = self.analyze_expr(*else_expr)?;
                let ty = if then_expr.ty().is_num() && else_expr.ty().is_num() {
                    usual_arith_type(then_expr.ty(), else_expr.ty())
                } else if decayed(then_expr.ty()) == decayed(else_expr.ty()) {
                    decayed(then_expr.ty())
                } else {
                    return Err(CompileError::type_error(
                        "incompatible conditional branches",
                        span,
                    ));
                };
                let then_expr = self.make_cast(ty.clone(), then_expr, true)?;
                let else_expr = self.make_cast(ty.clone(), else_expr, true)?;
                Ok(Expr::typed(
                    ExprKind::Ternary {
                        cond: Box::new(cond),
                        then_expr: Box::new(then_expr),
                        else_expr: Box::new(else_expr),
                    },
                    span,
                    ty,
                ))
            }

            ExprKind::Comma { lhs, rhs } => {
                let lhs = self.analyze_expr(*lhs)?;
                let rhs = self.analyze_expr(*rhs)?;
                let ty = rhs.ty().clone();
                Ok(Expr::typed(
                    ExprKind::Comma { lhs: Box::new(lhs), rhs: Box::new(rhs) },
                    span,
                    ty,
                ))
            }

            ExprKind::Assign { lhs, rhs } => {
                let lhs = self.analyze_expr(*lhs)?;
                self.check_assignable(&lhs)?;
                let rhs = self.analyze_expr(*rhs)?;
                let ty = lhs.ty().clone();
                let rhs = self.make_cast(ty.clone(), rhs, true)?;
                Ok(Expr::typed(
                    ExprKind::Assign { lhs: Box::new(lhs), rhs: Box::new(rhs) },
                    span,
                    ty,
                ))
            }

            ExprKind::AssignWith { op, lhs, rhs } => {
                let lhs = self.analyze_expr(*lhs)?;
                self.check_assignable(&lhs)?;
                let rhs = self.analyze_expr(*rhs)?;
                let ty = lhs.ty().clone();
                let rhs = if ty.pointee().is_some()
                    && matches!(op, BinaryOp::Add | BinaryOp::Sub)
                {
                    if !rhs.ty().is_num() {
                        return Err(CompileError::type_error("integer expected", rhs.span));
                    }
                    self.scale_index(rhs, ty.pointee().cloned().expect("pointer"), span)?
                } else if ty.is_num() && rhs.ty().is_num() {
                    self.make_cast(ty.clone(), rhs, true)?
                } else {
                    return Err(CompileError::type_error("invalid operands", span));
                };
                Ok(Expr::typed(
                    ExprKind::AssignWith { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                    span,
                    ty,
                ))
            }

            ExprKind::IncDec { inc, postfix, sub } => {
                let sub = self.analyze_expr(*sub)?;
                self.check_assignable(&sub)?;
                let ty = sub.ty().clone();
                if !(ty.is_num() || ty.is_ptr()) {
                    return Err(CompileError::type_error(
                        "number or pointer expected",
                        span,
                    ));
                }
                Ok(Expr::typed(
                    ExprKind::IncDec { inc, postfix, sub: Box::new(sub) },
                    span,
                    ty,
                ))
            }

            ExprKind::SizeofExpr(sub) => {
                let sub = self.analyze_expr(*sub)?;
                let size = sub.ty().size(self.structs) as i64;
                Ok(Expr::typed(
                    ExprKind::Num { value: size, kind: NumKind::Long, unsigned: true },
                    span,
                    Type::Num { kind: NumKind::Long, unsigned: true },
                ))
            }

            ExprKind::SizeofType(ty) => {
                let size = ty.size(self.structs) as i64;
                Ok(Expr::typed(
                    ExprKind::Num { value: size, kind: NumKind::Long, unsigned: true },
                    span,
                    Type::Num { kind: NumKind::Long, unsigned: true },
                ))
            }
        }
    }

    fn analyze_var(&mut self, name: String, span: Span) -> CompileResult<Expr> {
        if let Some((scope, index)) = self.find_var(&name) {
            let state = self.func.as_ref().expect("inside a function");
            let info = &state.scopes[scope].vars[index];
            if let Some(label) = &info.label {
                // Static local: refer to its hoisted global.
                let label = label.clone();
                let ty = info.ty.clone();
                return Ok(Expr::typed(
                    ExprKind::Var { name: label, global: true, local: None },
                    span,
                    ty,
                ));
            }
            let ty = info.ty.clone();
            return Ok(Expr::typed(
                ExprKind::Var { name, global: false, local: Some((scope, index)) },
                span,
                ty,
            ));
        }
        if let Some(info) = self.globals.find(&name) {
            let ty = info.ty.clone();
            return Ok(Expr::typed(
                ExprKind::Var { name, global: true, local: None },
                span,
                ty,
            ));
        }
        Err(CompileError::undeclared(name, span))
    }

    fn analyze_bin(
        &mut self,
        op: BinaryOp,
        lhs: Expr,
        rhs: Expr,
        span: Span,
    ) -> CompileResult<Expr> {
        use BinaryOp::*;
        match op {
            LogAnd | LogOr => {
                self.require_scalar(&lhs)?;
                self.require_scalar(&rhs)?;
                if let (Some(l), Some(r)) = (const_value(&lhs), const_value(&rhs)) {
                    let value = match op {
                        LogAnd => (l != 0 && r != 0) as i64,
                        _ => (l != 0 || r != 0) as i64,
                    };
                    return Ok(Expr::typed(ExprKind::int(value), span, Type::int_type()));
                }
                Ok(Expr::typed(
                    ExprKind::Bin { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                    span,
                    Type::int_type(),
                ))
            }

            Add | Sub => {
                if lhs.ty().is_num() && rhs.ty().is_num() {
                    self.arith_bin(op, lhs, rhs, span)
                } else if lhs.ty().pointee().is_some() && rhs.ty().is_num() {
                    self.pointer_add(op, lhs, rhs, span)
                } else if op == Add && lhs.ty().is_num() && rhs.ty().pointee().is_some() {
                    self.pointer_add(op, rhs, lhs, span)
                } else if op == Sub
                    && lhs.ty().pointee().is_some()
                    && rhs.ty().pointee().is_some()
                {
                    self.pointer_diff(lhs, rhs, span)
                } else {
                    Err(CompileError::type_error("invalid operands", span))
                }
            }

            Mul | Div | Mod | BitAnd | BitOr | BitXor => {
                if !(lhs.ty().is_num() && rhs.ty().is_num()) {
                    return Err(CompileError::type_error("number expected", span));
                }
                self.arith_bin(op, lhs, rhs, span)
            }

            LShift | RShift => {
                if !(lhs.ty().is_num() && rhs.ty().is_num()) {
                    return Err(CompileError::type_error("number expected", span));
                }
                let ty = promoted(lhs.ty());
                let lhs = self.make_cast(ty.clone(), lhs, true)?;
                let rhs = self.make_cast(Type::int_type(), rhs, true)?;
                if let (Some(l), Some(r)) = (const_value(&lhs), const_value(&rhs)) {
                    let value = fold_bin(op, l, r, &ty, span)?;
                    return Ok(num_expr(value, ty, span));
                }
                Ok(Expr::typed(
                    ExprKind::Bin { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                    span,
                    ty,
                ))
            }

            Eq | Ne | Lt | Le | Gt | Ge => self.compare_bin(op, lhs, rhs, span),
        }
    }

    /// Arithmetic on two numbers: usual arithmetic conversions, then fold
    /// if both sides are constants.
    fn arith_bin(
        &mut self,
        op: BinaryOp,
        lhs: Expr,
        rhs: Expr,
        span: Span,
    ) -> CompileResult<Expr> {
        let ty = usual_arith_type(lhs.ty(), rhs.ty());
        let lhs = self.make_cast(ty.clone(), lhs, true)?;
        let rhs = self.make_cast(ty.clone(), rhs, true)?;
        if let (Some(l), Some(r)) = (const_value(&lhs), const_value(&rhs)) {
            let value = fold_bin(op, l, r, &ty, span)?;
            return Ok(num_expr(value, ty, span));
        }
        Ok(Expr::typed(
            ExprKind::Bin { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
            span,
            ty,
        ))
    }

    fn compare_bin(
        &mut self,
        op: BinaryOp,
        lhs: Expr,
        rhs: Expr,
        span: Span,
    ) -> CompileResult<Expr> {
        let (lhs, rhs) = if lhs.ty().is_num() && rhs.ty().is_num() {
            let ty = usual_arith_type(lhs.ty(), rhs.ty());
            (
                self.make_cast(ty.clone(), lhs, true)?,
                self.make_cast(ty, rhs, true)?,
            )
        } else if lhs.ty().pointee().is_some() && rhs.ty().pointee().is_some() {
            (lhs, rhs)
        } else if lhs.ty().pointee().is_some() && rhs.ty().is_num() {
            let ty = decayed(lhs.ty());
            let rhs = self.make_cast(ty, rhs, true)?;
            (lhs, rhs)
        } else if lhs.ty().is_num() && rhs.ty().pointee().is_some() {
            let ty = decayed(rhs.ty());
            let lhs = self.make_cast(ty, lhs, true)?;
            (lhs, rhs)
        } else {
            return Err(CompileError::type_error("invalid comparison", span));
        };
        if let (Some(l), Some(r)) = (const_value(&lhs), const_value(&rhs)) {
            let value = fold_bin(op, l, r, lhs.ty(), span)?;
            return Ok(Expr::typed(ExprKind::int(value), span, Type::int_type()));
        }
        Ok(Expr::typed(
            ExprKind::Bin { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
            span,
            Type::int_type(),
        ))
    }

    fn analyze_unary(&mut self, op: UnaryOp, sub: Expr, span: Span) -> CompileResult<Expr> {
        match op {
            UnaryOp::Neg | UnaryOp::BitNot => {
                if !sub.ty().is_num() {
                    return Err(CompileError::type_error("number expected", sub.span));
                }
                let ty = promoted(sub.ty());
                let sub = self.make_cast(ty.clone(), sub, true)?;
                if let Some(v) = const_value(&sub) {
                    let value = if op == UnaryOp::Neg { v.wrapping_neg() } else { !v };
                    return Ok(num_expr(normalize_const(value, &ty), ty, span));
                }
                Ok(Expr::typed(
                    ExprKind::Unary { op, sub: Box::new(sub) },
                    span,
                    ty,
                ))
            }

            UnaryOp::LogNot => {
                self.require_scalar(&sub)?;
                if let Some(v) = const_value(&sub) {
                    return Ok(Expr::typed(
                        ExprKind::int((v == 0) as i64),
                        span,
                        Type::int_type(),
                    ));
                }
                Ok(Expr::typed(
                    ExprKind::Unary { op, sub: Box::new(sub) },
                    span,
                    Type::int_type(),
                ))
            }

            UnaryOp::Deref => {
                let Some(elem) = sub.ty().pointee().cloned() else {
                    return Err(CompileError::type_error("cannot dereference", span));
                };
                Ok(Expr::typed(
                    ExprKind::Unary { op, sub: Box::new(sub) },
                    span,
                    elem,
                ))
            }

            UnaryOp::Ref => {
                match &sub.kind {
                    ExprKind::Var { local: Some((scope, index)), .. } => {
                        // The variable's address escapes; it needs a slot.
                        let (scope, index) = (*scope, *index);
                        let state = self.func.as_mut().expect("inside a function");
                        state.scopes[scope].vars[index].force_stack = true;
                    }
                    ExprKind::Var { global: true, .. }
                    | ExprKind::Unary { op: UnaryOp::Deref, .. }
                    | ExprKind::Member { .. }
                    | ExprKind::Str(_) => {}
                    _ => {
                        return Err(CompileError::type_error("lvalue expected", sub.span));
                    }
                }
                let ty = sub.ty().clone().ptr_to();
                Ok(Expr::typed(
                    ExprKind::Unary { op, sub: Box::new(sub) },
                    span,
                    ty,
                ))
            }
        }
    }

    fn analyze_member(
        &mut self,
        base: Expr,
        name: String,
        arrow: bool,
        span: Span,
    ) -> CompileResult<Expr> {
        // `p->m` auto-dereferences a struct pointer.
        let base = if arrow {
            let Some(Type::Struct(_)) = base.ty().pointee() else {
                return Err(CompileError::type_error(
                    "struct pointer expected before `->`",
                    base.span,
                ));
            };
            let elem = base.ty().pointee().cloned().expect("struct pointer");
            Expr::typed(
                ExprKind::Unary { op: UnaryOp::Deref, sub: Box::new(base) },
                span,
                elem,
            )
        } else {
            base
        };

        let Type::Struct(id) = *base.ty() else {
            return Err(CompileError::type_error(
                "struct or union expected before `.`",
                base.span,
            ));
        };
        let info = self.structs.info(id);
        if !info.defined {
            return Err(CompileError::type_error(
                format!("incomplete struct `{}`", info.tag),
                span,
            ));
        }
        let Some(index) = info.member_index(&name) else {
            return Err(CompileError::type_error(
                format!("`{}` is not a member of struct `{}`", name, info.tag),
                span,
            ));
        };
        let ty = info.members[index].ty.clone();
        Ok(Expr::typed(
            ExprKind::Member { base: Box::new(base), name, arrow: false, index: Some(index) },
            span,
            ty,
        ))
    }

    fn analyze_call(
        &mut self,
        callee: Expr,
        mut args: Vec<Expr>,
        span: Span,
    ) -> CompileResult<Expr> {
        let Some(func_ty) = callee.ty().func_type().cloned() else {
            return Err(CompileError::type_error("cannot call non-function", callee.span));
        };
        if func_ty.ret.is_struct() {
            return Err(CompileError::type_error(
                "returning a struct by value is not supported",
                span,
            ));
        }
        if args.len() < func_ty.params.len()
            || (!func_ty.variadic && args.len() > func_ty.params.len())
        {
            return Err(CompileError::type_error(
                format!(
                    "wrong number of arguments: {} expected, {} given",
                    func_ty.params.len(),
                    args.len()
                ),
                span,
            ));
        }
        let mut converted = Vec::with_capacity(args.len());
        for (i, arg) in args.drain(..).enumerate() {
            if arg.ty().is_struct() {
                return Err(CompileError::type_error(
                    "passing a struct by value is not supported",
                    arg.span,
                ));
            }
            let arg = match func_ty.params.get(i) {
                Some(param_ty) => self.make_cast(param_ty.clone(), arg, true)?,
                // Extra variadic arguments: arrays and functions decay.
                None => {
                    let ty = decayed(arg.ty());
                    self.make_cast(ty, arg, true)?
                }
            };
            converted.push(arg);
        }
        Ok(Expr::typed(
            ExprKind::Call { callee: Box::new(callee), args: converted },
            span,
            func_ty.ret.clone(),
        ))
    }

    // ---- pointer arithmetic ----

    /// `ptr + n` / `ptr - n`: scale the integer by the pointee size.
    fn pointer_add(
        &mut self,
        op: BinaryOp,
        ptr: Expr,
        index: Expr,
        span: Span,
    ) -> CompileResult<Expr> {
        let elem = ptr.ty().pointee().cloned().expect("pointer operand");
        let scaled = self.scale_index(index, elem.clone(), span)?;
        Ok(Expr::typed(
            ExprKind::Bin { op, lhs: Box::new(ptr), rhs: Box::new(scaled) },
            span,
            elem.ptr_to(),
        ))
    }

    pub(crate) fn scale_index(
        &mut self,
        index: Expr,
        elem: Type,
        span: Span,
    ) -> CompileResult<Expr> {
        let size = elem.size(self.structs) as i64;
        let index = self.make_cast(Type::long_type(), index, true)?;
        if size == 1 {
            return Ok(index);
        }
        if let Some(v) = const_value(&index) {
            return Ok(num_expr(v.wrapping_mul(size), Type::long_type(), span));
        }
        let size_expr = num_expr(size, Type::long_type(), span);
        Ok(Expr::typed(
            ExprKind::Bin {
                op: BinaryOp::Mul,
                lhs: Box::new(index),
                rhs: Box::new(size_expr),
            },
            span,
            Type::long_type(),
        ))
    }

    /// `p - q` in element units yields a signed integer.
    fn pointer_diff(&mut self, lhs: Expr, rhs: Expr, span: Span) -> CompileResult<Expr> {
        let l_elem = lhs.ty().pointee().cloned().expect("pointer operand");
        let r_elem = rhs.ty().pointee().cloned().expect("pointer operand");
        if l_elem != r_elem {
            return Err(CompileError::type_error("incompatible pointer difference", span));
        }
        let size = l_elem.size(self.structs) as i64;
        let lhs = self.make_cast(Type::long_type(), lhs, true)?;
        let rhs = self.make_cast(Type::long_type(), rhs, true)?;
        let diff = Expr::typed(
            ExprKind::Bin { op: BinaryOp::Sub, lhs: Box::new(lhs), rhs: Box::new(rhs) },
            span,
            Type::long_type(),
        );
        if size == 1 {
            return Ok(diff);
        }
        let size_expr = num_expr(size, Type::long_type(), span);
        Ok(Expr::typed(
            ExprKind::Bin {
                op: BinaryOp::Div,
                lhs: Box::new(diff),
                rhs: Box::new(size_expr),
            },
            span,
            Type::long_type(),
        ))
    }

    // ---- casts ----

    /// Convert `expr` to `to`, folding constant conversions and dropping
    /// no-op casts.
    pub(crate) fn make_cast(&mut self, to: Type, expr: Expr, implicit: bool) -> CompileResult<Expr> {
        if *expr.ty() == to {
            return Ok(expr);
        }
        if !can_cast(&to, expr.ty()) {
            return Err(CompileError::type_error(
                format!("cannot convert `{}` to `{}`", expr.ty(), to),
                expr.span,
            ));
        }
        // Fold numeric constant casts.
        if to.is_num() {
            if let Some(v) = const_value(&expr) {
                return Ok(num_expr(normalize_const(v, &to), to, expr.span));
            }
        }
        let span = expr.span;
        Ok(Expr::typed(
            ExprKind::Cast { to: to.clone(), sub: Box::new(expr), implicit },
            span,
            to,
        ))
    }

    fn require_scalar(&self, expr: &Expr) -> CompileResult<()> {
        let ty = expr.ty();
        if !(ty.is_num() || ty.is_ptr() || ty.is_array()) {
            return Err(CompileError::type_error("scalar expected", expr.span));
        }
        Ok(())
    }

    /// Assignment destination: an lvalue whose variable is not const.
    pub(crate) fn check_assignable(&self, lhs: &Expr) -> CompileResult<()> {
        match &lhs.kind {
            ExprKind::Var { name, global, local } => {
                let is_const = if *global {
                    self.globals.find(name).map(|v| v.flags.is_const).unwrap_or(false)
                } else {
                    let (scope, index) = local.expect("resolved local");
                    let state = self.func.as_ref().expect("inside a function");
                    state.scopes[scope].vars[index].flags.is_const
                };
                if is_const {
                    return Err(CompileError::type_error(
                        format!("cannot assign to const `{}`", name),
                        lhs.span,
                    ));
                }
                Ok(())
            }
            ExprKind::Unary { op: UnaryOp::Deref, .. } | ExprKind::Member { .. } => Ok(()),
            _ => Err(CompileError::type_error("cannot assign", lhs.span)),
        }
    }
}

// ---- type algebra helpers ----

/// Integer promotion: `char` and `short` become `int`.
pub(crate) fn promoted(ty: &Type) -> Type {
    match ty {
        Type::Num { kind: NumKind::Char | NumKind::Short, .. } => Type::int_type(),
        other => other.clone(),
    }
}

/// The usual arithmetic conversions for two integer types.
pub(crate) fn usual_arith_type(lhs: &Type, rhs: &Type) -> Type {
    let (lk, lu) = num_parts(&promoted(lhs));
    let (rk, ru) = num_parts(&promoted(rhs));
    if lk == NumKind::Long || rk == NumKind::Long {
        let unsigned = (lk == NumKind::Long && lu) || (rk == NumKind::Long && ru);
        Type::Num { kind: NumKind::Long, unsigned }
    } else {
        Type::Num { kind: NumKind::Int, unsigned: lu || ru }
    }
}

fn num_parts(ty: &Type) -> (NumKind, bool) {
    match ty {
        Type::Num { kind, unsigned } => (*kind, *unsigned),
        _ => (NumKind::Int, false),
    }
}

/// Rvalue type with arrays and functions decayed to pointers.
pub(crate) fn decayed(ty: &Type) -> Type {
    match ty {
        Type::Array { elem, .. } => elem.as_ref().clone().ptr_to(),
        func @ Type::Func(_) => func.clone().ptr_to(),
        other => other.clone(),
    }
}

pub(crate) fn can_cast(dst: &Type, src: &Type) -> bool {
    if dst == src {
        return true;
    }
    match dst {
        Type::Void => true,
        Type::Num { .. } => src.is_num() || matches!(src, Type::Ptr(_) | Type::Array { .. }),
        Type::Ptr(_) => matches!(
            src,
            Type::Num { .. } | Type::Ptr(_) | Type::Array { .. } | Type::Func(_)
        ),
        _ => false,
    }
}

pub(crate) fn const_value(expr: &Expr) -> Option<i64> {
    match &expr.kind {
        ExprKind::Num { value, .. } => Some(*value),
        _ => None,
    }
}

pub(crate) fn num_expr(value: i64, ty: Type, span: Span) -> Expr {
    let (kind, unsigned) = num_parts(&ty);
    Expr::typed(ExprKind::Num { value, kind, unsigned }, span, ty)
}

/// Wrap a folded constant to the width and signedness of `ty`.
pub(crate) fn normalize_const(value: i64, ty: &Type) -> i64 {
    let (kind, unsigned) = num_parts(ty);
    match (kind.size(), unsigned) {
        (1, false) => value as i8 as i64,
        (1, true) => value as u8 as i64,
        (2, false) => value as i16 as i64,
        (2, true) => value as u16 as i64,
        (4, false) => value as i32 as i64,
        (4, true) => value as u32 as i64,
        _ => value,
    }
}

/// Fold a binary operation over constants, honouring the signedness of `ty`.
/// Folded division or modulo by zero is a compile-time error.
pub(crate) fn fold_bin(
    op: BinaryOp,
    l: i64,
    r: i64,
    ty: &Type,
    span: Span,
) -> CompileResult<i64> {
    use BinaryOp::*;
    let unsigned = ty.is_unsigned();
    let value = match op {
        Add => l.wrapping_add(r),
        Sub => l.wrapping_sub(r),
        Mul => l.wrapping_mul(r),
        Div | Mod => {
            if r == 0 {
                return Err(CompileError::type_error("division by zero", span));
            }
            match (op, unsigned) {
                (Div, false) => l.wrapping_div(r),
                (Div, true) => ((l as u64) / (r as u64)) as i64,
                (_, false) => l.wrapping_rem(r),
                (_, true) => ((l as u64) % (r as u64)) as i64,
            }
        }
        BitAnd => l & r,
        BitOr => l | r,
        BitXor => l ^ r,
        LShift => l.wrapping_shl(r as u32),
        RShift => {
            if unsigned {
                ((l as u64).wrapping_shr(r as u32)) as i64
            } else {
                l.wrapping_shr(r as u32)
            }
        }
        Eq => return Ok((l == r) as i64),
        Ne => return Ok((l != r) as i64),
        Lt => {
            return Ok(if unsigned { ((l as u64) < (r as u64)) as i64 } else { (l < r) as i64 })
        }
        Le => {
            return Ok(if unsigned { ((l as u64) <= (r as u64)) as i64 } else { (l <= r) as i64 })
        }
        Gt => {
            return Ok(if unsigned { ((l as u64) > (r as u64)) as i64 } else { (l > r) as i64 })
        }
        Ge => {
            return Ok(if unsigned { ((l as u64) >= (r as u64)) as i64 } else { (l >= r) as i64 })
        }
        LogAnd => (l != 0 && r != 0) as i64,
        LogOr => (l != 0 || r != 0) as i64,
    };
    Ok(normalize_const(value, ty))
}
