//! Initializer analysis and lowering.
//!
//! `fix_array_size` completes unsized array types from their initializer.
//! `flatten_initializer` resolves designators into positional slots.
//! Local objects are initialised by synthetic assignment statements
//! (`assign_initial_value` / `clear_initial_value`); global objects get a
//! normalised initializer the emitter writes into the data segment
//! (`check_global_initializer`).

use crate::checker::Analyzer;
use crate::expr::{const_value, num_expr};
use xcc_common::{CompileError, CompileResult, Span};
use xcc_parser::{
    BinaryOp, Expr, ExprKind, Initializer, Stmt, StmtKind, Type, UnaryOp, VarFlags, VarInfo,
};

/// Fix the length of an unsized array from its initializer, and reject
/// initializers longer than a fixed length.
pub fn fix_array_size(ty: &mut Type, init: &Initializer, span: Span) -> CompileResult<()> {
    let Type::Array { elem, len } = ty else {
        return Err(CompileError::internal_at("fix_array_size on non-array", span));
    };

    let str_len = match init {
        Initializer::Single(Expr { kind: ExprKind::Str(bytes), .. }) if elem.is_char() => {
            // Terminating NUL included.
            Some(bytes.len() + 1)
        }
        _ => None,
    };
    let elems = match init {
        Initializer::Multi(elems) => Some(elems),
        _ => None,
    };
    if str_len.is_none() && elems.is_none() {
        return Err(CompileError::illegal_initializer("illegal array initializer", span));
    }

    match *len {
        None => {
            let new_len = match (str_len, elems) {
                (Some(n), _) => n,
                (None, Some(elems)) => {
                    let mut index = 0usize;
                    let mut max_index = 0usize;
                    for elem in elems.iter().flatten() {
                        if let Initializer::Index { index: designated, .. } = elem {
                            index = *designated;
                        }
                        index += 1;
                        max_index = max_index.max(index);
                    }
                    max_index
                }
                (None, None) => unreachable!(),
            };
            *len = Some(new_len);
        }
        Some(n) => {
            let init_len = str_len.unwrap_or_else(|| elems.map(|e| e.len()).unwrap_or(0));
            if init_len > n {
                return Err(CompileError::illegal_initializer(
                    "initializer more than array size",
                    span,
                ));
            }
        }
    }
    Ok(())
}

impl Analyzer<'_> {
    /// Type every expression inside an initializer tree.
    pub(crate) fn analyze_initializer(&mut self, init: &mut Initializer) -> CompileResult<()> {
        match init {
            Initializer::Single(expr) => self.check_expr(expr),
            Initializer::Multi(elems) => {
                for elem in elems.iter_mut().flatten() {
                    self.analyze_initializer(elem)?;
                }
                Ok(())
            }
            Initializer::Dot { value, .. } | Initializer::Index { value, .. } => {
                self.analyze_initializer(value)
            }
        }
    }

    /// Hoist a string literal into a fresh const static global array and
    /// return a reference to it.
    pub(crate) fn hoist_string(&mut self, bytes: Vec<u8>, span: Span) -> Expr {
        let ty = Type::char_type().array_of(Some(bytes.len() + 1));
        let label = self.alloc_label();
        let flags = VarFlags { is_const: true, is_static: true, is_extern: false };
        let mut info = VarInfo::new(&*label, ty.clone(), flags, span);
        info.init = Some(Initializer::Single(Expr::typed(
            ExprKind::Str(bytes),
            span,
            ty.clone(),
        )));
        info.label = Some(label.clone());
        self.globals.define(info);
        Expr::typed(ExprKind::Var { name: label, global: true, local: None }, span, ty)
    }

    /// Resolve designators into positional slots. Struct and array targets
    /// come out as positional `Multi` with `None` marking untouched slots.
    pub(crate) fn flatten_initializer(
        &mut self,
        ty: &Type,
        init: Initializer,
        span: Span,
    ) -> CompileResult<Initializer> {
        match ty {
            Type::Struct(id) => {
                let Initializer::Multi(elems) = init else {
                    return Err(CompileError::illegal_initializer(
                        "`{...}` expected for initializer",
                        span,
                    ));
                };
                let id = *id;
                if !self.structs.is_defined(id) {
                    return Err(CompileError::type_error("incomplete struct", span));
                }
                let info = self.structs.info(id);
                let is_union = info.is_union;
                let n = info.members.len();
                let member_count = elems.iter().flatten().count();
                if n == 0 && member_count > 0 {
                    return Err(CompileError::illegal_initializer(
                        "initializer for empty struct",
                        span,
                    ));
                }
                if is_union && member_count > 1 {
                    return Err(CompileError::illegal_initializer(
                        "more than one initializer for union",
                        span,
                    ));
                }

                let mut values: Vec<Option<Initializer>> = vec![None; n];
                let mut index = 0usize;
                for elem in elems.into_iter().flatten() {
                    let elem = match elem {
                        Initializer::Index { .. } => {
                            return Err(CompileError::illegal_initializer(
                                "indexed initializer for struct",
                                span,
                            ));
                        }
                        Initializer::Dot { name, value } => {
                            let info = self.structs.info(id);
                            index = info.member_index(&name).ok_or_else(|| {
                                CompileError::type_error(
                                    format!(
                                        "`{}` is not a member of struct `{}`",
                                        name, info.tag
                                    ),
                                    span,
                                )
                            })?;
                            *value
                        }
                        other => other,
                    };
                    if index >= n {
                        return Err(CompileError::illegal_initializer(
                            "too many initial values",
                            span,
                        ));
                    }
                    // A char pointer member initialised from a string
                    // literal points at a hoisted array.
                    let member_ty = self.structs.info(id).members[index].ty.clone();
                    let elem = match (member_ty.pointee(), elem) {
                        (
                            Some(p),
                            Initializer::Single(Expr { kind: ExprKind::Str(bytes), .. }),
                        ) if member_ty.is_ptr() && p.is_char() => {
                            Initializer::Single(self.hoist_string(bytes, span))
                        }
                        (_, elem) => elem,
                    };
                    values[index] = Some(elem);
                    index += 1;
                }
                Ok(Initializer::Multi(values))
            }

            Type::Array { elem, len } => match init {
                Initializer::Multi(elems) => {
                    let mut max_index = 0usize;
                    let mut cursor = 0usize;
                    for e in elems.iter().flatten() {
                        match e {
                            Initializer::Dot { .. } => {
                                return Err(CompileError::illegal_initializer(
                                    "designated member initializer for array",
                                    span,
                                ));
                            }
                            Initializer::Index { index, .. } => cursor = *index,
                            _ => {}
                        }
                        cursor += 1;
                        max_index = max_index.max(cursor);
                    }
                    let slots = len.unwrap_or(max_index).max(max_index);
                    let mut values: Vec<Option<Initializer>> = vec![None; slots];
                    let mut index = 0usize;
                    for e in elems.into_iter().flatten() {
                        let e = match e {
                            Initializer::Index { index: designated, value } => {
                                index = designated;
                                *value
                            }
                            other => other,
                        };
                        if index >= slots {
                            return Err(CompileError::illegal_initializer(
                                "initializer more than array size",
                                span,
                            ));
                        }
                        values[index] = Some(e);
                        index += 1;
                    }
                    Ok(Initializer::Multi(values))
                }
                Initializer::Single(expr) => {
                    // A char array may be initialised from a string literal.
                    if elem.is_char() && matches!(expr.kind, ExprKind::Str(_)) {
                        Ok(Initializer::Single(expr))
                    } else {
                        Err(CompileError::illegal_initializer("illegal initializer", span))
                    }
                }
                _ => Err(CompileError::illegal_initializer("illegal initializer", span)),
            },

            _ => Ok(init),
        }
    }

    // ---- local objects ----

    /// Produce assignment statements that initialise a local object at
    /// runtime. Slots the initializer does not mention are explicitly
    /// zeroed to preserve C semantics.
    pub(crate) fn assign_initial_value(
        &mut self,
        target: Expr,
        init: &Initializer,
        inits: &mut Vec<Stmt>,
    ) -> CompileResult<()> {
        let span = target.span;
        let init = self.flatten_initializer(target.ty(), init.clone(), span)?;

        match target.ty().clone() {
            Type::Array { elem, len } => match init {
                Initializer::Multi(elems) => {
                    let arr_len = len.ok_or_else(|| {
                        CompileError::internal_at("array length not fixed", span)
                    })?;
                    if elems.len() > arr_len {
                        return Err(CompileError::illegal_initializer(
                            "initializer more than array size",
                            span,
                        ));
                    }
                    for i in 0..arr_len {
                        let elem_target = self.array_element(&target, i, &elem);
                        match elems.get(i) {
                            Some(Some(e)) => {
                                self.assign_initial_value(elem_target, e, inits)?
                            }
                            _ => self.clear_initial_value(elem_target, inits)?,
                        }
                    }
                    Ok(())
                }
                Initializer::Single(Expr { kind: ExprKind::Str(bytes), .. }) => {
                    let arr_len = len.ok_or_else(|| {
                        CompileError::internal_at("array length not fixed", span)
                    })?;
                    self.string_initializer(&target, bytes, arr_len, inits)
                }
                _ => Err(CompileError::illegal_initializer("illegal initializer", span)),
            },

            Type::Struct(id) => {
                let Initializer::Multi(elems) = init else {
                    return Err(CompileError::illegal_initializer(
                        "`{...}` expected for initializer",
                        span,
                    ));
                };
                let info = self.structs.info(id);
                let is_union = info.is_union;
                let members: Vec<Type> =
                    info.members.iter().map(|m| m.ty.clone()).collect();
                if is_union {
                    // At most one initializer; the rest of the union is
                    // left alone.
                    for (i, elem) in elems.iter().enumerate() {
                        if let Some(e) = elem {
                            let member = self.member_expr(&target, i, &members[i]);
                            self.assign_initial_value(member, e, inits)?;
                            break;
                        }
                    }
                    return Ok(());
                }
                for (i, member_ty) in members.iter().enumerate() {
                    let member = self.member_expr(&target, i, member_ty);
                    match elems.get(i) {
                        Some(Some(e)) => self.assign_initial_value(member, e, inits)?,
                        _ => self.clear_initial_value(member, inits)?,
                    }
                }
                Ok(())
            }

            ty => {
                let Initializer::Single(value) = init else {
                    return Err(CompileError::illegal_initializer(
                        "illegal initializer",
                        span,
                    ));
                };
                let rhs = self.make_cast(ty.clone(), value, true)?;
                self.push_assign(target, rhs, inits);
                Ok(())
            }
        }
    }

    /// Explicitly zero a local object, element by element.
    pub(crate) fn clear_initial_value(
        &mut self,
        target: Expr,
        inits: &mut Vec<Stmt>,
    ) -> CompileResult<()> {
        let span = target.span;
        match target.ty().clone() {
            ty @ Type::Num { .. } => {
                let zero = num_expr(0, ty, span);
                self.push_assign(target, zero, inits);
                Ok(())
            }
            ty @ Type::Ptr(_) => {
                let zero = num_expr(0, Type::long_type(), span);
                let zero = self.make_cast(ty, zero, true)?;
                self.push_assign(target, zero, inits);
                Ok(())
            }
            Type::Array { elem, len } => {
                for i in 0..len.unwrap_or(0) {
                    let elem_target = self.array_element(&target, i, &elem);
                    self.clear_initial_value(elem_target, inits)?;
                }
                Ok(())
            }
            Type::Struct(id) => {
                let info = self.structs.info(id);
                let members: Vec<(usize, Type)> = if info.is_union {
                    // Zeroing the largest member zeroes the whole union.
                    info.members
                        .iter()
                        .enumerate()
                        .max_by_key(|(_, m)| m.ty.size(self.structs))
                        .map(|(i, m)| vec![(i, m.ty.clone())])
                        .unwrap_or_default()
                } else {
                    info.members.iter().enumerate().map(|(i, m)| (i, m.ty.clone())).collect()
                };
                for (i, member_ty) in members {
                    let member = self.member_expr(&target, i, &member_ty);
                    self.clear_initial_value(member, inits)?;
                }
                Ok(())
            }
            _ => Err(CompileError::internal_at("cannot zero-initialise value", span)),
        }
    }

    /// `char s[N] = "...";` copies the string bytes (including the NUL) and
    /// zero-fills the rest of the buffer.
    fn string_initializer(
        &mut self,
        dst: &Expr,
        bytes: Vec<u8>,
        dst_len: usize,
        inits: &mut Vec<Stmt>,
    ) -> CompileResult<()> {
        let span = dst.span;
        let src_len = bytes.len() + 1;
        if dst_len < src_len {
            return Err(CompileError::illegal_initializer(
                format!("buffer is shorter than string: {} for {} bytes", dst_len, src_len),
                span,
            ));
        }
        let src = self.hoist_string(bytes, span);
        let char_ty = Type::char_type();
        for i in 0..src_len {
            let dst_elem = self.array_element(dst, i, &char_ty);
            let src_elem = self.array_element(&src, i, &char_ty);
            self.push_assign(dst_elem, src_elem, inits);
        }
        for i in src_len..dst_len {
            let dst_elem = self.array_element(dst, i, &char_ty);
            let zero = num_expr(0, char_ty.clone(), span);
            self.push_assign(dst_elem, zero, inits);
        }
        Ok(())
    }

    fn push_assign(&mut self, lhs: Expr, rhs: Expr, inits: &mut Vec<Stmt>) {
        let span = lhs.span;
        let ty = lhs.ty().clone();
        let assign = Expr::typed(
            ExprKind::Assign { lhs: Box::new(lhs), rhs: Box::new(rhs) },
            span,
            ty,
        );
        inits.push(Stmt::new(StmtKind::Expr(assign), span));
    }

    /// `*(base + i)`, with the offset pre-scaled to a constant.
    fn array_element(&mut self, base: &Expr, i: usize, elem: &Type) -> Expr {
        let span = base.span;
        let offset = (i * elem.size(self.structs)) as i64;
        let sum = Expr::typed(
            ExprKind::Bin {
                op: BinaryOp::Add,
                lhs: Box::new(base.clone()),
                rhs: Box::new(num_expr(offset, Type::long_type(), span)),
            },
            span,
            elem.clone().ptr_to(),
        );
        Expr::typed(
            ExprKind::Unary { op: UnaryOp::Deref, sub: Box::new(sum) },
            span,
            elem.clone(),
        )
    }

    fn member_expr(&self, base: &Expr, index: usize, member_ty: &Type) -> Expr {
        let span = base.span;
        Expr::typed(
            ExprKind::Member {
                base: Box::new(base.clone()),
                name: String::new(),
                arrow: false,
                index: Some(index),
            },
            span,
            member_ty.clone(),
        )
    }

    // ---- global objects ----

    /// Validate and normalise a global initializer so the emitter can write
    /// it straight into the data segment.
    pub(crate) fn check_global_initializer(
        &mut self,
        ty: &Type,
        init: Option<Initializer>,
        span: Span,
    ) -> CompileResult<Option<Initializer>> {
        let Some(init) = init else {
            return Ok(None);
        };
        let init = self.flatten_initializer(ty, init, span)?;

        match ty {
            Type::Num { .. } => match &init {
                Initializer::Single(expr) if const_value(expr).is_some() => Ok(Some(init)),
                _ => Err(CompileError::illegal_initializer("initializer type error", span)),
            },

            Type::Ptr(pointee) => {
                let Initializer::Single(value) = init else {
                    return Err(CompileError::illegal_initializer(
                        "initializer type error",
                        span,
                    ));
                };
                match &value.kind {
                    // &global
                    ExprKind::Unary { op: UnaryOp::Ref, sub } => {
                        let ExprKind::Var { name, global, .. } = &sub.kind else {
                            return Err(CompileError::illegal_initializer(
                                "pointer initializer must reference a variable",
                                span,
                            ));
                        };
                        if !*global {
                            return Err(CompileError::illegal_initializer(
                                "global reference only",
                                span,
                            ));
                        }
                        let info = self.globals.find(name).ok_or_else(|| {
                            CompileError::undeclared(name.clone(), span)
                        })?;
                        if info.ty != **pointee {
                            return Err(CompileError::type_error("illegal type", span));
                        }
                        Ok(Some(Initializer::Single(value)))
                    }
                    // A global array decays to a pointer to its first element.
                    ExprKind::Var { name, global, .. } => {
                        if !*global {
                            return Err(CompileError::illegal_initializer(
                                "global reference only",
                                span,
                            ));
                        }
                        let info = self.globals.find(name).ok_or_else(|| {
                            CompileError::undeclared(name.clone(), span)
                        })?;
                        match &info.ty {
                            Type::Array { elem, .. } if **elem == **pointee => {
                                Ok(Some(Initializer::Single(value)))
                            }
                            _ => Err(CompileError::type_error("illegal type", span)),
                        }
                    }
                    // Numeric constant (e.g. NULL), possibly behind casts.
                    ExprKind::Num { .. } => Ok(Some(Initializer::Single(value))),
                    ExprKind::Cast { .. } => {
                        let mut inner = &value;
                        while let ExprKind::Cast { sub, .. } = &inner.kind {
                            inner = sub;
                        }
                        if let Some(v) = const_value(inner) {
                            Ok(Some(Initializer::Single(num_expr(
                                v,
                                Type::long_type(),
                                span,
                            ))))
                        } else {
                            Err(CompileError::illegal_initializer(
                                "initializer type error",
                                span,
                            ))
                        }
                    }
                    // String literal: hoist and point at it.
                    ExprKind::Str(_) => {
                        if !pointee.is_char() {
                            return Err(CompileError::type_error("illegal type", span));
                        }
                        let ExprKind::Str(bytes) = value.kind else { unreachable!() };
                        let var = self.hoist_string(bytes, span);
                        Ok(Some(Initializer::Single(var)))
                    }
                    _ => Err(CompileError::illegal_initializer(
                        "initializer type error",
                        span,
                    )),
                }
            }

            Type::Array { elem, len } => match init {
                Initializer::Multi(elems) => {
                    let mut checked = Vec::with_capacity(elems.len());
                    for e in elems {
                        match e {
                            Some(e) => checked
                                .push(self.check_global_initializer(elem, Some(e), span)?),
                            None => checked.push(None),
                        }
                    }
                    Ok(Some(Initializer::Multi(checked)))
                }
                Initializer::Single(expr) => match &expr.kind {
                    ExprKind::Str(bytes) if elem.is_char() => {
                        let n = len.ok_or_else(|| {
                            CompileError::internal_at("array length not fixed", span)
                        })?;
                        if n < bytes.len() + 1 {
                            return Err(CompileError::illegal_initializer(
                                "array size shorter than initializer",
                                span,
                            ));
                        }
                        Ok(Some(Initializer::Single(expr)))
                    }
                    _ => Err(CompileError::illegal_initializer("illegal initializer", span)),
                },
                _ => Err(CompileError::illegal_initializer("illegal initializer", span)),
            },

            Type::Struct(id) => {
                let Initializer::Multi(elems) = init else {
                    return Err(CompileError::illegal_initializer(
                        "`{...}` expected for initializer",
                        span,
                    ));
                };
                let members: Vec<Type> = self
                    .structs
                    .info(*id)
                    .members
                    .iter()
                    .map(|m| m.ty.clone())
                    .collect();
                let mut checked = Vec::with_capacity(members.len());
                for (i, member_ty) in members.iter().enumerate() {
                    match elems.get(i).cloned().flatten() {
                        Some(e) => checked
                            .push(self.check_global_initializer(member_ty, Some(e), span)?),
                        None => checked.push(None),
                    }
                }
                Ok(Some(Initializer::Multi(checked)))
            }

            _ => Err(CompileError::illegal_initializer(
                format!("global initializer not supported for `{}`", ty),
                span,
            )),
        }
    }
}
