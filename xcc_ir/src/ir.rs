//! Three-address IR definitions.
//!
//! Instructions operate on virtual registers; the allocator later maps each
//! virtual register to a real register or a stack slot. Basic blocks are
//! identified by index; the block layout list gives program order, and a
//! block falls through to the next block in layout order unless it ends in
//! an unconditional jump.

use serde::{Deserialize, Serialize};

/// Number of allocatable real registers (the callee-saved file).
pub const REG_COUNT: usize = 5;

/// Index of the reserved spill temporary, just past the allocatable file.
pub const SPILLED_REG: usize = REG_COUNT;

/// Register arguments passed per the calling convention.
pub const MAX_REG_ARGS: usize = 6;

pub type VRegId = usize;
pub type BBId = usize;

/// A virtual register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VReg {
    pub id: VRegId,
    /// Assigned real register, `None` once spilled.
    pub rreg: Option<usize>,
    /// Forced or decided spill.
    pub spill: bool,
    /// Stack slot offset from the frame pointer. Zero means unassigned;
    /// stack-passed parameters carry their positive offset from lowering.
    pub offset: i32,
    pub size: usize,
    pub align: usize,
}

/// Condition codes for `Jmp` and `Set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cond {
    Any,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    ULt,
    ULe,
    UGt,
    UGe,
}

impl Cond {
    /// The condition that jumps when this one falls through.
    pub fn inverted(self) -> Cond {
        match self {
            Cond::Any => Cond::Any,
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Lt => Cond::Ge,
            Cond::Le => Cond::Gt,
            Cond::Gt => Cond::Le,
            Cond::Ge => Cond::Lt,
            Cond::ULt => Cond::UGe,
            Cond::ULe => Cond::UGt,
            Cond::UGt => Cond::ULe,
            Cond::UGe => Cond::ULt,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IrKind {
    /// dst = immediate
    Imm { value: i64 },
    /// dst = address of the stack slot backing `src`
    Bofs { src: VRegId },
    /// dst = address of `label`
    Iofs { label: String },
    /// dst = opr1
    Mov,
    Add,
    Sub,
    Mul,
    Div { unsigned: bool },
    Mod { unsigned: bool },
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift { unsigned: bool },
    /// dst = -opr1
    Neg,
    /// dst = ~opr1
    BitNot,
    /// dst = (opr1 == 0)
    Not,
    /// flags = opr1 cmp opr2
    Cmp,
    /// dst = flags per cond
    Set { cond: Cond },
    /// flags = opr1 & opr1 (zero test)
    Test,
    /// dst = opr1 converted from `src_size`
    Cast { src_size: usize, src_unsigned: bool, dst_unsigned: bool },
    /// dst = *opr1
    Load { unsigned: bool },
    /// *opr2 = opr1
    Store,
    /// copy `size` bytes from *opr1 to *opr2
    Memcpy { size: usize },
    /// push opr1 as a call argument
    PushArg,
    /// call `label`, or *opr1 when label is None; `arg_count` arguments
    /// were pushed right-to-left
    Call { label: Option<String>, arg_count: usize },
    /// dst = return register, or return register = opr1
    Result,
    /// jump to `bb` (conditionally, per `cond`)
    Jmp { bb: BBId, cond: Cond },
    /// spill temporary = [frame + offset]
    LoadSpilled { offset: i32 },
    /// [frame + offset] = spill temporary
    StoreSpilled { offset: i32 },
}

/// One three-address instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ir {
    pub kind: IrKind,
    pub dst: Option<VRegId>,
    pub opr1: Option<VRegId>,
    pub opr2: Option<VRegId>,
    /// Operand size in bytes: 1, 2, 4 or 8.
    pub size: usize,
}

impl Ir {
    pub fn new(kind: IrKind, size: usize) -> Self {
        Self { kind, dst: None, opr1: None, opr2: None, size }
    }

    pub fn with_dst(mut self, dst: VRegId) -> Self {
        self.dst = Some(dst);
        self
    }

    pub fn with_opr1(mut self, opr1: VRegId) -> Self {
        self.opr1 = Some(opr1);
        self
    }

    pub fn with_opr2(mut self, opr2: VRegId) -> Self {
        self.opr2 = Some(opr2);
        self
    }
}

/// A basic block: straight-line instructions plus liveness sets computed by
/// the allocator. Insertion order of the sets is preserved for determinism.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BB {
    pub irs: Vec<Ir>,
    pub in_regs: Vec<VRegId>,
    pub out_regs: Vec<VRegId>,
    pub assigned_regs: Vec<VRegId>,
}

/// A lowered function, before and after register allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrFunction {
    pub name: String,
    /// Parameter virtual registers in declaration order.
    pub params: Vec<VRegId>,
    pub bbs: Vec<BB>,
    /// Program order of the basic blocks.
    pub layout: Vec<BBId>,
    pub vregs: Vec<VReg>,
    pub frame_size: usize,
    /// Bitmask of real registers the function touches.
    pub used_reg_bits: u16,
}

impl IrFunction {
    /// The layout successors of the block at layout position `pos`:
    /// `(fallthrough, branch target)`.
    pub fn successors(&self, pos: usize) -> (Option<BBId>, Option<BBId>) {
        let bb = &self.bbs[self.layout[pos]];
        let mut fallthrough = self.layout.get(pos + 1).copied();
        let mut target = None;
        if let Some(Ir { kind: IrKind::Jmp { bb, cond }, .. }) = bb.irs.last() {
            target = Some(*bb);
            if *cond == Cond::Any {
                fallthrough = None;
            }
        }
        (fallthrough, target)
    }
}

/// The whole lowered program: functions plus the pooled string literals
/// referenced from expression context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrModule {
    pub funcs: Vec<IrFunction>,
    pub strings: Vec<(String, Vec<u8>)>,
}
