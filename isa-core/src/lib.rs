//! Shared opcode table, image format and error types for the assembler, VM and
//! disassembler binaries.

pub mod constants;
pub mod error;
pub mod header;
pub mod mnemonic;
pub mod opcode;

pub use error::{AsmError, ImageError, VmError};
pub use header::ImageHeader;
pub use mnemonic::Mnemonic;
pub use opcode::{OperandKind, Opcode, BY_CODE, BY_MNEMONIC, OPCODES};
