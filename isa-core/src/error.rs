use thiserror::Error;

/// Failures validating a binary image header, raised by the VM loader (spec §7.2).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("bad magic number: found {found:02X?}, expected 41 4E")]
    BadMagic { found: [u8; 2] },

    #[error("truncated header: got {got} bytes, need 16")]
    TruncatedHeader { got: usize },

    #[error("DATA_OFFSET must be 16, found {data_offset}")]
    BadDataOffset { data_offset: u16 },

    #[error("CODE_OFFSET must equal 16 + DATA_LENGTH ({expected}), found {code_offset}")]
    BadCodeOffset { code_offset: u16, expected: u16 },

    #[error("image too large for memory: {total} bytes")]
    ImageTooLarge { total: usize },
}

/// Fatal assembler failures (spec §7.1). Every variant aborts assembly with no
/// partial image written; the offending source line is carried where known.
#[derive(Debug, Error)]
pub enum AsmError {
    #[error("line {line}: unknown mnemonic '{mnemonic}'")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("line {line}: malformed operand for {mnemonic}: {detail}")]
    MalformedOperand {
        line: usize,
        mnemonic: String,
        detail: String,
    },

    #[error("line {line}: unknown symbol '{symbol}'")]
    UnknownSymbol { line: usize, symbol: String },

    #[error("line {line}: value {value} out of range ({lower}..{upper})")]
    OutOfRange {
        line: usize,
        value: i128,
        lower: i128,
        upper: i128,
    },

    #[error("line {line}: register R{index} out of range (0..{max_reg})")]
    RegisterOutOfRange {
        line: usize,
        index: i64,
        max_reg: usize,
    },

    #[error("line {line}: symbol '{symbol}' already defined")]
    DuplicateSymbol { line: usize, symbol: String },

    #[error("line {line}: {detail}")]
    Syntax { line: usize, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal VM failures (spec §7.3). Soft faults (stack under/overflow, unknown SYS
/// port, stack-overflow on push) are *not* errors — they are silent no-ops handled
/// inline, per spec §4.6/§4.7/§7.4.
#[derive(Debug, Error)]
pub enum VmError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("division by zero in R{divisor_reg}")]
    DivisionByZero { divisor_reg: u8 },

    #[error("invalid register index {index} decoded at pc={pc:#x}")]
    InvalidRegister { index: u8, pc: u64 },

    #[error("unknown opcode byte {byte:#04x} at pc={pc:#x}")]
    UnknownOpcode { byte: u8, pc: u64 },

    #[error("memory access out of bounds: address {addr:#x}, size {size}")]
    OutOfBounds { addr: u64, size: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
