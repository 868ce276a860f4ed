//! Library surface of the xcc driver: the compilation pipeline from source
//! text to an ELF image, shared by the binary and the integration tests.

pub mod compiler;

pub use compiler::*;
