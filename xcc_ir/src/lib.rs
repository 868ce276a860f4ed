//! Intermediate representation for the xcc compiler.
//!
//! The typed AST is lowered into a basic-block graph of three-address
//! instructions over virtual registers; the linear-scan allocator then maps
//! virtual registers onto the real register file, spilling to stack slots
//! where necessary, and computes the stack frame layout.

pub mod ir;
pub mod lower;
pub mod regalloc;

pub use ir::*;
pub use lower::*;
pub use regalloc::*;
