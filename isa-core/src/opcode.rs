use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::constants::ADDR_WIDTH;
use crate::mnemonic::Mnemonic;

/// Shape of the operand(s) an instruction carries, per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand: NOP, RET, HALT.
    None,
    /// A single register: INC, DEC, NOT, SHL, SHR, PUSH, POP.
    Reg,
    /// Two registers: MOV, ADD, SUB, MUL, DIV, AND, OR, XOR, CMP.
    RegReg,
    /// A register and a register-indirect operand `[Ry]`: LB, SB.
    RegIndirect,
    /// The load/store family, addressing-byte-prefixed: LH/LW/LD, SH/SW/SD.
    RegOperand { width: u8 },
    /// A register and a 16-bit port: SYS.
    RegPort,
    /// A bare address operand: CALL, JMP, J*.
    Addr,
}

/// A single entry of the canonical opcode table: numeric code, minimum encoded
/// length and operand shape for one mnemonic.
#[derive(Debug, Clone, Copy)]
pub struct Opcode {
    pub mnemonic: Mnemonic,
    pub code: u8,
    pub base_len: u8,
    pub operand_kind: OperandKind,
}

impl Opcode {
    const fn new(mnemonic: Mnemonic, code: u8, base_len: u8, operand_kind: OperandKind) -> Self {
        Opcode {
            mnemonic,
            code,
            base_len,
            operand_kind,
        }
    }

    /// Width in bytes of the load/store family's value/address operand, if any.
    pub fn operand_width(&self) -> Option<u8> {
        match self.operand_kind {
            OperandKind::RegOperand { width } => Some(width),
            _ => None,
        }
    }

    /// True for the six addressing-byte-prefixed load/store opcodes.
    pub fn has_addressing_byte(&self) -> bool {
        matches!(self.operand_kind, OperandKind::RegOperand { .. })
    }

    /// Effective encoded length of this instruction given the addressing-mode byte
    /// that follows the opcode (only meaningful when `has_addressing_byte()`).
    ///
    /// Immediate (0x01) and absolute (0x03) forms carry a width-matched operand;
    /// register (0x02) and indirect (0x04) forms carry one extra register byte.
    pub fn effective_len(&self, addressing_byte: Option<u8>) -> usize {
        match (self.operand_kind, addressing_byte) {
            (OperandKind::RegOperand { width }, Some(0x01)) | (OperandKind::RegOperand { width }, Some(0x03)) => {
                self.base_len as usize + (width as usize - 1)
            }
            _ => self.base_len as usize,
        }
    }
}

use Mnemonic::*;
use OperandKind::*;

lazy_static! {
    /// The canonical opcode table, numbered exactly as `NOP = 0 .. JGE = 37`.
    pub static ref OPCODES: Vec<Opcode> = vec![
        Opcode::new(NOP, 0, 1, None),
        Opcode::new(RET, 1, 1, None),
        Opcode::new(HALT, 2, 1, None),

        Opcode::new(INC, 3, 2, Reg),
        Opcode::new(DEC, 4, 2, Reg),
        Opcode::new(NOT, 5, 2, Reg),
        Opcode::new(SHL, 6, 2, Reg),
        Opcode::new(SHR, 7, 2, Reg),
        Opcode::new(PUSH, 8, 2, Reg),
        Opcode::new(POP, 9, 2, Reg),

        Opcode::new(LB, 10, 3, RegIndirect),
        Opcode::new(LH, 11, 4, RegOperand { width: 2 }),
        Opcode::new(LW, 12, 4, RegOperand { width: 4 }),
        Opcode::new(LD, 13, 4, RegOperand { width: 8 }),
        Opcode::new(SB, 14, 3, RegIndirect),
        Opcode::new(SH, 15, 4, RegOperand { width: 2 }),
        Opcode::new(SW, 16, 4, RegOperand { width: 4 }),
        Opcode::new(SD, 17, 4, RegOperand { width: 8 }),

        Opcode::new(MOV, 18, 3, RegReg),
        Opcode::new(ADD, 19, 3, RegReg),
        Opcode::new(SUB, 20, 3, RegReg),
        Opcode::new(MUL, 21, 3, RegReg),
        Opcode::new(DIV, 22, 3, RegReg),
        Opcode::new(AND, 23, 3, RegReg),
        Opcode::new(OR, 24, 3, RegReg),
        Opcode::new(XOR, 25, 3, RegReg),
        Opcode::new(CMP, 26, 3, RegReg),
        Opcode::new(SYS, 27, 4, RegPort),

        Opcode::new(CALL, 28, 1 + ADDR_WIDTH as u8, Addr),
        Opcode::new(JMP, 29, 1 + ADDR_WIDTH as u8, Addr),
        Opcode::new(JZ, 30, 1 + ADDR_WIDTH as u8, Addr),
        Opcode::new(JNZ, 31, 1 + ADDR_WIDTH as u8, Addr),
        Opcode::new(JC, 32, 1 + ADDR_WIDTH as u8, Addr),
        Opcode::new(JNC, 33, 1 + ADDR_WIDTH as u8, Addr),
        Opcode::new(JL, 34, 1 + ADDR_WIDTH as u8, Addr),
        Opcode::new(JLE, 35, 1 + ADDR_WIDTH as u8, Addr),
        Opcode::new(JG, 36, 1 + ADDR_WIDTH as u8, Addr),
        Opcode::new(JGE, 37, 1 + ADDR_WIDTH as u8, Addr),
    ];

    /// Numeric code -> opcode record, used by the VM's fetch/decode stage.
    pub static ref BY_CODE: HashMap<u8, &'static Opcode> =
        OPCODES.iter().map(|op| (op.code, op)).collect();

    /// Mnemonic -> opcode record, used by the assembler/disassembler.
    pub static ref BY_MNEMONIC: HashMap<Mnemonic, &'static Opcode> =
        OPCODES.iter().map(|op| (op.mnemonic, op)).collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_duplicate_codes() {
        let mut codes: Vec<u8> = OPCODES.iter().map(|op| op.code).collect();
        codes.sort();
        let before = codes.len();
        codes.dedup();
        assert_eq!(codes.len(), before);
    }

    #[test]
    fn codes_are_dense_from_zero() {
        let mut codes: Vec<u8> = OPCODES.iter().map(|op| op.code).collect();
        codes.sort();
        let expected: Vec<u8> = (0..codes.len() as u8).collect();
        assert_eq!(codes, expected);
    }

    #[test]
    fn load_store_family_effective_length() {
        let lh = BY_MNEMONIC[&Mnemonic::LH];
        assert_eq!(lh.effective_len(Some(0x02)), 4);
        assert_eq!(lh.effective_len(Some(0x04)), 4);
        assert_eq!(lh.effective_len(Some(0x01)), 5);
        assert_eq!(lh.effective_len(Some(0x03)), 5);

        let lw = BY_MNEMONIC[&Mnemonic::LW];
        assert_eq!(lw.effective_len(Some(0x01)), 7);

        let ld = BY_MNEMONIC[&Mnemonic::LD];
        assert_eq!(ld.effective_len(Some(0x01)), 11);
    }

    #[test]
    fn addr_family_base_len_is_nine_bytes() {
        let jmp = BY_MNEMONIC[&Mnemonic::JMP];
        assert_eq!(jmp.base_len, 9);
    }
}
