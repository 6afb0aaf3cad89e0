//! Revision-fixed constants for the 64-bit, 32-register ISA revision.
//!
//! The earlier 16-bit revision used a 64 KiB memory map with `HEAP_START = 0x4000`
//! and a stack top equal to `MEM_SIZE`; this revision scales the memory map to 4 MiB
//! and keeps the same 1/4-of-memory heap split.

/// Number of addressable registers, R0..=R31.
pub const MAX_REG: usize = 32;

/// Register width in bits.
pub const REG_WIDTH_BITS: u32 = 64;

/// Total addressable memory.
pub const MEM_SIZE: usize = 4 * 1024 * 1024;

/// Byte width of the ADDR operand kind (CALL/JMP/J* targets) in this revision.
pub const ADDR_WIDTH: usize = 8;

/// Byte width of the SYS port operand; fixed across revisions.
pub const PORT_WIDTH: usize = 2;

/// Image header size in bytes.
pub const HEADER_LENGTH: usize = 16;

/// Literal magic byte pair at the start of every image.
pub const MAGIC: [u8; 2] = [0x41, 0x4E];

/// First free heap address, used for argv marshaling.
pub const HEAP_START: u64 = 0x0010_0000;

/// Initial stack pointer value. spec.md §4.5 gives this as a fixed constant for
/// the 64-bit revision (`STACK_END = 0x3FFFFF`), one byte short of `MEM_SIZE`
/// rather than `MEM_SIZE` itself — the top byte of the address space is left
/// outside the stack's reach. PUSH decrements SP by 8 before writing; POP is the
/// exact reverse and this is also the ceiling SP can climb back to when the
/// stack is empty.
pub const STACK_TOP: u64 = 0x3F_FFFF;

/// Sign bit of a register-width value.
pub const SIGN_BIT: u64 = 1 << (REG_WIDTH_BITS - 1);

/// First descriptor handed out by FILE_OPEN; 0/1/2 are reserved for stdio.
pub const FIRST_FD: u16 = 3;
