//! Backend for the xcc compiler: direct x86-64 instruction encoding, label
//! fixups, and the ELF64 executable writer. No external assembler or linker
//! is involved; machine-code bytes are produced straight into the output
//! image.

pub mod elf;
pub mod emit;
pub mod x86;

pub use elf::*;
pub use emit::*;
pub use x86::*;

/// Code generation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    #[default]
    Linux,
    Xv6,
}

impl Target {
    /// Virtual address the program header loads the image at.
    pub fn load_address(self) -> u64 {
        match self {
            // The code starts right after the headers.
            Target::Linux => 0x100_0000 + PROG_START as u64,
            Target::Xv6 => 0x1000,
        }
    }

    pub fn syscall_exit(self) -> u32 {
        match self {
            Target::Linux => 60,
            Target::Xv6 => 2,
        }
    }

    pub fn syscall_write(self) -> u32 {
        match self {
            Target::Linux => 1,
            Target::Xv6 => 16,
        }
    }
}

/// File offset of the first code byte; headers are padded up to it.
pub const PROG_START: usize = 0x80;
