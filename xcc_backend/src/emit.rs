//! Translation of allocated IR into machine code, plus data and BSS layout.
//!
//! Functions are emitted in definition order, then the startup shim
//! (`_start`, `_exit`, `_write`), then initialised data and pooled string
//! literals. Uninitialised globals are laid out past the end of the file
//! image as the BSS tail. All label references resolve in a final fixup
//! pass.

use crate::x86::{CodeBuf, Reg, ALLOC_REGS, ARG_REGS, SPILL_TEMP};
use crate::Target;
use xcc_common::{CompileError, CompileResult};
use xcc_ir::{Cond, Ir, IrFunction, IrKind, IrModule, MAX_REG_ARGS};
use xcc_parser::{Expr, ExprKind, Initializer, Program, StructTable, Type, UnaryOp, VarInfo};

/// A finished machine-code image, ready for the ELF writer.
#[derive(Debug)]
pub struct Image {
    pub bytes: Vec<u8>,
    pub entry_offset: usize,
    pub filesz: usize,
    pub memsz: usize,
}

/// Emit the whole program for `target`.
pub fn emit_program(
    program: &Program,
    module: &IrModule,
    target: Target,
) -> CompileResult<Image> {
    let mut buf = CodeBuf::new();

    for func in &module.funcs {
        emit_function(&mut buf, func);
    }
    emit_startup(&mut buf, target);
    emit_data(&mut buf, program, module)?;

    let filesz = buf.offset();
    let memsz = layout_bss(&mut buf, program, filesz);

    buf.resolve(target.load_address())?;
    let entry_offset = buf
        .label_offset("_start")
        .ok_or_else(|| CompileError::internal("cannot find label `_start`"))?;
    log::debug!(
        "image: {} code/data bytes, {} bss bytes, entry at {:#x}",
        filesz,
        memsz - filesz,
        entry_offset
    );
    Ok(Image { bytes: buf.bytes, entry_offset, filesz, memsz })
}

fn bb_label(func: &IrFunction, bb: usize) -> String {
    format!(".Lbb.{}.{}", func.name, bb)
}

/// Map a virtual register to its real register; spilled registers read and
/// write through the reserved temporary.
fn real(func: &IrFunction, vreg: Option<usize>) -> Reg {
    let vreg = vreg.expect("operand present");
    match func.vregs[vreg].rreg {
        Some(r) => ALLOC_REGS[r],
        None => SPILL_TEMP,
    }
}

/// Arithmetic happens at 32 or 64 bits; narrower values are kept extended.
fn eff(size: usize) -> usize {
    if size == 8 { 8 } else { 4 }
}

fn emit_function(buf: &mut CodeBuf, func: &IrFunction) {
    buf.add_label(func.name.clone());

    // Prologue.
    buf.push_r(Reg::Rbp);
    buf.mov_rr(8, Reg::Rbp, Reg::Rsp);
    if func.frame_size > 0 {
        buf.sub_rsp(func.frame_size as i32);
    }
    for (i, reg) in ALLOC_REGS.iter().enumerate() {
        if func.used_reg_bits & (1 << i) != 0 {
            buf.push_r(*reg);
        }
    }
    // Store register-passed parameters into their frame slots.
    for (i, &param) in func.params.iter().enumerate().take(MAX_REG_ARGS) {
        let vreg = &func.vregs[param];
        if vreg.offset < 0 {
            buf.store(vreg.size.min(8), ARG_REGS[i], Reg::Rbp, vreg.offset);
        }
    }

    for &bb_id in &func.layout {
        buf.add_label(bb_label(func, bb_id));
        for ir in &func.bbs[bb_id].irs {
            emit_ir(buf, func, ir);
        }
    }

    // Epilogue.
    for (i, reg) in ALLOC_REGS.iter().enumerate().rev() {
        if func.used_reg_bits & (1 << i) != 0 {
            buf.pop_r(*reg);
        }
    }
    buf.leave();
    buf.ret();
}

fn emit_ir(buf: &mut CodeBuf, func: &IrFunction, ir: &Ir) {
    let size = ir.size;
    match &ir.kind {
        IrKind::Imm { value } => {
            buf.mov_ri(eff(size), real(func, ir.dst), *value);
        }

        IrKind::Bofs { src } => {
            buf.lea_rbp(real(func, ir.dst), func.vregs[*src].offset);
        }

        IrKind::Iofs { label } => {
            buf.lea_rip_label(real(func, ir.dst), label.clone());
        }

        IrKind::Mov => {
            buf.mov_rr(eff(size), real(func, ir.dst), real(func, ir.opr1));
        }

        IrKind::Add => buf.add_rr(eff(size), real(func, ir.dst), real(func, ir.opr2)),
        IrKind::Sub => buf.sub_rr(eff(size), real(func, ir.dst), real(func, ir.opr2)),
        IrKind::BitAnd => buf.and_rr(eff(size), real(func, ir.dst), real(func, ir.opr2)),
        IrKind::BitOr => buf.or_rr(eff(size), real(func, ir.dst), real(func, ir.opr2)),
        IrKind::BitXor => buf.xor_rr(eff(size), real(func, ir.dst), real(func, ir.opr2)),
        IrKind::Mul => buf.imul_rr(eff(size), real(func, ir.dst), real(func, ir.opr2)),

        IrKind::Div { unsigned } | IrKind::Mod { unsigned } => {
            let dst = real(func, ir.dst);
            let divisor = real(func, ir.opr2);
            buf.mov_rr(eff(size), Reg::Rax, dst);
            if *unsigned {
                buf.xor_rr(4, Reg::Rdx, Reg::Rdx);
                buf.div_r(eff(size), divisor);
            } else {
                buf.cqo(eff(size));
                buf.idiv_r(eff(size), divisor);
            }
            let result = if matches!(ir.kind, IrKind::Div { .. }) { Reg::Rax } else { Reg::Rdx };
            buf.mov_rr(eff(size), dst, result);
        }

        IrKind::LShift => {
            buf.mov_rr(8, Reg::Rcx, real(func, ir.opr2));
            buf.shl_cl(eff(size), real(func, ir.dst));
        }

        IrKind::RShift { unsigned } => {
            buf.mov_rr(8, Reg::Rcx, real(func, ir.opr2));
            if *unsigned {
                buf.shr_cl(eff(size), real(func, ir.dst));
            } else {
                buf.sar_cl(eff(size), real(func, ir.dst));
            }
        }

        IrKind::Neg => buf.neg_r(eff(size), real(func, ir.dst)),
        IrKind::BitNot => buf.not_r(eff(size), real(func, ir.dst)),

        IrKind::Not => {
            let src = real(func, ir.opr1);
            buf.test_rr(eff(size), src, src);
            buf.setcc(Cond::Eq, real(func, ir.dst));
        }

        IrKind::Cmp => {
            buf.cmp_rr(eff(size), real(func, ir.opr1), real(func, ir.opr2));
        }

        IrKind::Set { cond } => {
            buf.setcc(*cond, real(func, ir.dst));
        }

        IrKind::Test => {
            let src = real(func, ir.opr1);
            buf.test_rr(eff(size), src, src);
        }

        IrKind::Cast { src_size, src_unsigned, dst_unsigned } => {
            let dst = real(func, ir.dst);
            let src = real(func, ir.opr1);
            if size > *src_size {
                buf.extend(dst, src, *src_size, *src_unsigned, size == 8);
            } else {
                buf.extend(dst, src, size, *dst_unsigned, false);
            }
        }

        IrKind::Load { unsigned } => {
            buf.load(size, *unsigned, real(func, ir.dst), real(func, ir.opr1), 0);
        }

        IrKind::Store => {
            buf.store(size, real(func, ir.opr1), real(func, ir.opr2), 0);
        }

        IrKind::Memcpy { size } => {
            // Copy through rax in word-sized chunks.
            let src = real(func, ir.opr1);
            let dst = real(func, ir.opr2);
            let mut off = 0usize;
            for chunk in [8usize, 4, 2, 1] {
                while *size - off >= chunk {
                    buf.load(chunk, true, Reg::Rax, src, off as i32);
                    buf.store(chunk, Reg::Rax, dst, off as i32);
                    off += chunk;
                }
            }
        }

        IrKind::PushArg => {
            buf.push_r(real(func, ir.opr1));
        }

        IrKind::Call { label, arg_count } => {
            // Arguments were pushed right-to-left; pop them into the
            // argument registers in order.
            for arg_reg in ARG_REGS.iter().take((*arg_count).min(MAX_REG_ARGS)) {
                buf.pop_r(*arg_reg);
            }
            match label {
                Some(label) => buf.call_label(label.clone()),
                None => buf.call_r(real(func, ir.opr1)),
            }
            if *arg_count > MAX_REG_ARGS {
                buf.add_rsp(((arg_count - MAX_REG_ARGS) * 8) as i32);
            }
        }

        IrKind::Result => match ir.dst {
            Some(_) => buf.mov_rr(eff(size), real(func, ir.dst), Reg::Rax),
            None => buf.mov_rr(eff(size), Reg::Rax, real(func, ir.opr1)),
        },

        IrKind::Jmp { bb, cond } => {
            let label = bb_label(func, *bb);
            match cond {
                Cond::Any => buf.jmp_label(label),
                cond => buf.jcc_label(*cond, label),
            }
        }

        IrKind::LoadSpilled { offset } => {
            buf.load(size, false, SPILL_TEMP, Reg::Rbp, *offset);
        }

        IrKind::StoreSpilled { offset } => {
            buf.store(size, SPILL_TEMP, Reg::Rbp, *offset);
        }
    }
}

/// The hand-written startup shim. `_start` forwards `argc`/`argv`, calls
/// `main` and falls through into `_exit`; `_exit` and `_write` are bare
/// syscall stubs.
fn emit_startup(buf: &mut CodeBuf, target: Target) {
    buf.add_label("_start");
    if target == Target::Linux {
        buf.mov_r_rsp0(Reg::Rdi);
        buf.lea_rsp(Reg::Rsi, 8);
    }
    buf.call_label("main");
    buf.mov_rr(4, Reg::Rdi, Reg::Rax);
    // Fall through.
    buf.add_label("_exit");
    buf.mov_ri(4, Reg::Rax, target.syscall_exit() as i64);
    emit_syscall(buf, target);
    buf.ret();

    buf.add_label("_write");
    buf.mov_ri(4, Reg::Rax, target.syscall_write() as i64);
    emit_syscall(buf, target);
    buf.ret();
}

fn emit_syscall(buf: &mut CodeBuf, target: Target) {
    match target {
        Target::Linux => buf.syscall(),
        // XV6 enters the kernel through the T_SYSCALL trap gate.
        Target::Xv6 => buf.int_n(64),
    }
}

// ---- data segment ----

fn emit_data(buf: &mut CodeBuf, program: &Program, module: &IrModule) -> CompileResult<()> {
    for var in program.globals.iter() {
        if var.ty.is_func() || var.flags.is_extern || var.init.is_none() {
            continue;
        }
        pad_to(buf, var.ty.align(&program.structs));
        buf.add_label(global_label(var));
        emit_global_value(buf, &var.ty, var.init.as_ref(), &program.structs, var)?;
    }
    for (label, bytes) in &module.strings {
        buf.add_label(label.clone());
        buf.put(bytes);
        buf.put(&[0]);
    }
    Ok(())
}

fn global_label(var: &VarInfo) -> String {
    var.label.clone().unwrap_or_else(|| var.name.clone())
}

fn pad_to(buf: &mut CodeBuf, align: usize) {
    while buf.offset() % align.max(1) != 0 {
        buf.put(&[0]);
    }
}

/// Write the bytes of one initialised object. `None` writes zeros.
fn emit_global_value(
    buf: &mut CodeBuf,
    ty: &Type,
    init: Option<&Initializer>,
    structs: &StructTable,
    var: &VarInfo,
) -> CompileResult<()> {
    let total = ty.size(structs);
    let Some(init) = init else {
        buf.put(&vec![0u8; total]);
        return Ok(());
    };

    match (ty, init) {
        (Type::Num { .. }, Initializer::Single(expr)) => {
            let ExprKind::Num { value, .. } = expr.kind else {
                return Err(bad_global(var));
            };
            buf.put(&value.to_le_bytes()[..total]);
            Ok(())
        }

        (Type::Ptr(_), Initializer::Single(expr)) => {
            match &expr.kind {
                ExprKind::Num { value, .. } => buf.put(&value.to_le_bytes()),
                ExprKind::Var { name, global: true, .. } => buf.put_abs64(name.clone()),
                ExprKind::Unary { op: UnaryOp::Ref, sub } => {
                    let Expr { kind: ExprKind::Var { name, .. }, .. } = sub.as_ref() else {
                        return Err(bad_global(var));
                    };
                    buf.put_abs64(name.clone());
                }
                _ => return Err(bad_global(var)),
            }
            Ok(())
        }

        (Type::Array { elem, .. }, Initializer::Single(expr)) => {
            let ExprKind::Str(bytes) = &expr.kind else {
                return Err(bad_global(var));
            };
            debug_assert!(elem.is_char());
            buf.put(bytes);
            buf.put(&vec![0u8; total - bytes.len()]);
            Ok(())
        }

        (Type::Array { elem, len }, Initializer::Multi(elems)) => {
            let len = len.unwrap_or(elems.len());
            for i in 0..len {
                let slot = elems.get(i).and_then(|e| e.as_ref());
                emit_global_value(buf, elem, slot, structs, var)?;
            }
            Ok(())
        }

        (Type::Struct(id), Initializer::Multi(elems)) => {
            let info = structs.info(*id);
            let base = buf.offset();
            if info.is_union {
                if let Some((index, Some(elem))) =
                    elems.iter().enumerate().find(|(_, e)| e.is_some()).map(|(i, e)| (i, e.as_ref()))
                {
                    emit_global_value(buf, &info.members[index].ty, Some(elem), structs, var)?;
                }
            } else {
                for (index, member) in info.members.iter().enumerate() {
                    while buf.offset() - base < member.offset {
                        buf.put(&[0]);
                    }
                    let slot = elems.get(index).and_then(|e| e.as_ref());
                    emit_global_value(buf, &member.ty, slot, structs, var)?;
                }
            }
            while buf.offset() - base < info.size {
                buf.put(&[0]);
            }
            Ok(())
        }

        _ => Err(bad_global(var)),
    }
}

fn bad_global(var: &VarInfo) -> CompileError {
    CompileError::internal_at(
        format!("unemittable global initializer for `{}`", var.name),
        var.span,
    )
}

/// Place uninitialised globals in the zero-filled tail past the file image.
fn layout_bss(buf: &mut CodeBuf, program: &Program, filesz: usize) -> usize {
    let mut offset = filesz;
    for var in program.globals.iter() {
        if var.ty.is_func() || var.flags.is_extern || var.init.is_some() {
            continue;
        }
        let align = var.ty.align(&program.structs).max(1);
        offset = (offset + align - 1) / align * align;
        buf.add_label_at(global_label(var), offset);
        offset += var.ty.size(&program.structs).max(1);
    }
    offset
}
