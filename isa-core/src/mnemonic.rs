use std::fmt;
use std::str::FromStr;

/// The 38 mnemonics of the mature ISA revision, numbered exactly as the canonical
/// opcode table (NOP = 0 .. JGE = 37).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    NOP,
    RET,
    HALT,
    INC,
    DEC,
    NOT,
    SHL,
    SHR,
    PUSH,
    POP,
    LB,
    LH,
    LW,
    LD,
    SB,
    SH,
    SW,
    SD,
    MOV,
    ADD,
    SUB,
    MUL,
    DIV,
    AND,
    OR,
    XOR,
    CMP,
    SYS,
    CALL,
    JMP,
    JZ,
    JNZ,
    JC,
    JNC,
    JL,
    JLE,
    JG,
    JGE,
}

impl Mnemonic {
    pub const ALL: [Mnemonic; 38] = [
        Mnemonic::NOP,
        Mnemonic::RET,
        Mnemonic::HALT,
        Mnemonic::INC,
        Mnemonic::DEC,
        Mnemonic::NOT,
        Mnemonic::SHL,
        Mnemonic::SHR,
        Mnemonic::PUSH,
        Mnemonic::POP,
        Mnemonic::LB,
        Mnemonic::LH,
        Mnemonic::LW,
        Mnemonic::LD,
        Mnemonic::SB,
        Mnemonic::SH,
        Mnemonic::SW,
        Mnemonic::SD,
        Mnemonic::MOV,
        Mnemonic::ADD,
        Mnemonic::SUB,
        Mnemonic::MUL,
        Mnemonic::DIV,
        Mnemonic::AND,
        Mnemonic::OR,
        Mnemonic::XOR,
        Mnemonic::CMP,
        Mnemonic::SYS,
        Mnemonic::CALL,
        Mnemonic::JMP,
        Mnemonic::JZ,
        Mnemonic::JNZ,
        Mnemonic::JC,
        Mnemonic::JNC,
        Mnemonic::JL,
        Mnemonic::JLE,
        Mnemonic::JG,
        Mnemonic::JGE,
    ];
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mnemonic::NOP => "NOP",
            Mnemonic::RET => "RET",
            Mnemonic::HALT => "HALT",
            Mnemonic::INC => "INC",
            Mnemonic::DEC => "DEC",
            Mnemonic::NOT => "NOT",
            Mnemonic::SHL => "SHL",
            Mnemonic::SHR => "SHR",
            Mnemonic::PUSH => "PUSH",
            Mnemonic::POP => "POP",
            Mnemonic::LB => "LB",
            Mnemonic::LH => "LH",
            Mnemonic::LW => "LW",
            Mnemonic::LD => "LD",
            Mnemonic::SB => "SB",
            Mnemonic::SH => "SH",
            Mnemonic::SW => "SW",
            Mnemonic::SD => "SD",
            Mnemonic::MOV => "MOV",
            Mnemonic::ADD => "ADD",
            Mnemonic::SUB => "SUB",
            Mnemonic::MUL => "MUL",
            Mnemonic::DIV => "DIV",
            Mnemonic::AND => "AND",
            Mnemonic::OR => "OR",
            Mnemonic::XOR => "XOR",
            Mnemonic::CMP => "CMP",
            Mnemonic::SYS => "SYS",
            Mnemonic::CALL => "CALL",
            Mnemonic::JMP => "JMP",
            Mnemonic::JZ => "JZ",
            Mnemonic::JNZ => "JNZ",
            Mnemonic::JC => "JC",
            Mnemonic::JNC => "JNC",
            Mnemonic::JL => "JL",
            Mnemonic::JLE => "JLE",
            Mnemonic::JG => "JG",
            Mnemonic::JGE => "JGE",
        };
        write!(f, "{}", name)
    }
}

/// Error returned when a source token isn't a known mnemonic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMnemonic(pub String);

impl fmt::Display for UnknownMnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown mnemonic: {}", self.0)
    }
}

impl std::error::Error for UnknownMnemonic {}

impl FromStr for Mnemonic {
    type Err = UnknownMnemonic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mnemonic::ALL
            .iter()
            .copied()
            .find(|m| m.to_string() == s)
            .ok_or_else(|| UnknownMnemonic(s.to_string()))
    }
}
