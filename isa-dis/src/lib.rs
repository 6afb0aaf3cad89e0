//! Turns an assembled image's code segment back into a mnemonic listing.
//!
//! Grounded in the teacher's `cpu/decomp.rs`: an `Instruction::from_iter` that
//! walks a byte cursor one opcode at a time, plus a `Display` impl that renders
//! each decoded instruction as `MNEMONIC operand, operand`. Here the cursor walk
//! is address-aware (load/store family instructions are variable-length, per
//! the addressing byte) instead of the teacher's fixed-width 6502 opcode table.

use std::fmt;

use isa_core::error::VmError;
use isa_core::header::ImageHeader;
use isa_core::opcode::{OperandKind, BY_CODE};
use isa_core::Opcode;

/// One decoded operand. Registers print as `Rn`; `IndirectReg` prints `[Rn]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(u8),
    IndirectReg(u8),
    Port(u16),
    Addr(u64),
    Immediate(u64),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "R{r}"),
            Operand::IndirectReg(r) => write!(f, "[R{r}]"),
            Operand::Port(p) => write!(f, "0x{p:04X}"),
            Operand::Addr(a) => write!(f, "0x{a:X}"),
            Operand::Immediate(v) => write!(f, "0x{v:X}"),
        }
    }
}

/// One decoded instruction: the address it starts at, its opcode record, and
/// its decoded operands.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub addr: u64,
    pub opcode: &'static Opcode,
    pub operands: Vec<Operand>,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode.mnemonic)?;
        for (i, operand) in self.operands.iter().enumerate() {
            write!(f, "{}{}", if i == 0 { " " } else { ", " }, operand)?;
        }
        Ok(())
    }
}

/// Decodes a whole code segment, address by address, stopping at the first
/// unrecognized opcode byte (which indicates trailing non-code bytes, since a
/// well-formed image never misdecodes inside its own code segment).
pub fn disassemble(code: &[u8], base_addr: u64) -> Result<Vec<Instruction>, VmError> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset < code.len() {
        let addr = base_addr + offset as u64;
        let (instruction, len) = decode_one(code, offset, addr)?;
        out.push(instruction);
        offset += len;
    }
    Ok(out)
}

/// Decodes one instruction starting at `offset` in `code`, returning it along
/// with its encoded length in bytes.
pub fn decode_one(code: &[u8], offset: usize, addr: u64) -> Result<(Instruction, usize), VmError> {
    let byte = *code.get(offset).ok_or(VmError::UnknownOpcode { byte: 0, pc: addr })?;
    let opcode = *BY_CODE.get(&byte).ok_or(VmError::UnknownOpcode { byte, pc: addr })?;

    let (operands, len) = match opcode.operand_kind {
        OperandKind::None => (vec![], opcode.base_len as usize),
        OperandKind::Reg => {
            let rx = byte_at(code, offset + 1, addr)?;
            (vec![Operand::Reg(rx)], opcode.base_len as usize)
        }
        OperandKind::RegReg => {
            let rx = byte_at(code, offset + 1, addr)?;
            let ry = byte_at(code, offset + 2, addr)?;
            (vec![Operand::Reg(rx), Operand::Reg(ry)], opcode.base_len as usize)
        }
        OperandKind::RegIndirect => {
            let rx = byte_at(code, offset + 1, addr)?;
            let ry = byte_at(code, offset + 2, addr)?;
            (vec![Operand::Reg(rx), Operand::IndirectReg(ry)], opcode.base_len as usize)
        }
        OperandKind::RegPort => {
            let rx = byte_at(code, offset + 1, addr)?;
            let port = u16::from_le_bytes([byte_at(code, offset + 2, addr)?, byte_at(code, offset + 3, addr)?]);
            (vec![Operand::Reg(rx), Operand::Port(port)], opcode.base_len as usize)
        }
        OperandKind::Addr => {
            let target = read_le(code, offset + 1, 8, addr)?;
            (vec![Operand::Addr(target)], opcode.base_len as usize)
        }
        OperandKind::RegOperand { width } => decode_load_store(code, offset, addr, opcode, width)?,
    };

    Ok((Instruction { addr, opcode, operands }, len))
}

fn decode_load_store(
    code: &[u8],
    offset: usize,
    addr: u64,
    opcode: &'static Opcode,
    width: u8,
) -> Result<(Vec<Operand>, usize), VmError> {
    let mode = byte_at(code, offset + 1, addr)?;
    let rx = byte_at(code, offset + 2, addr)?;
    let width = width as usize;

    match mode {
        0x01 => {
            let value = read_le(code, offset + 3, width, addr)?;
            Ok((vec![Operand::Reg(rx), Operand::Immediate(value)], opcode.base_len as usize + width - 1))
        }
        0x02 => {
            let ry = byte_at(code, offset + 3, addr)?;
            Ok((vec![Operand::Reg(rx), Operand::Reg(ry)], opcode.base_len as usize))
        }
        0x03 => {
            let target = read_le(code, offset + 3, width, addr)?;
            Ok((vec![Operand::Reg(rx), Operand::Addr(target)], opcode.base_len as usize + width - 1))
        }
        0x04 => {
            let ry = byte_at(code, offset + 3, addr)?;
            Ok((vec![Operand::Reg(rx), Operand::IndirectReg(ry)], opcode.base_len as usize))
        }
        other => Err(VmError::UnknownOpcode { byte: other, pc: addr }),
    }
}

fn byte_at(code: &[u8], offset: usize, addr: u64) -> Result<u8, VmError> {
    code.get(offset).copied().ok_or(VmError::OutOfBounds { addr, size: 1 })
}

fn read_le(code: &[u8], offset: usize, width: usize, addr: u64) -> Result<u64, VmError> {
    let slice = code.get(offset..offset + width).ok_or(VmError::OutOfBounds { addr, size: width })?;
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(slice);
    Ok(u64::from_le_bytes(buf))
}

/// Splits a whole image into its header, decoded data segment and decoded code
/// listing. `base_addr` for the code segment is `header.data_length` to match
/// the symbol table's own addressing (spec §3: code addresses are
/// `DATA_LENGTH + code_cursor`, not header-relative).
pub fn disassemble_image(image: &[u8]) -> Result<(ImageHeader, Vec<Instruction>), VmError> {
    let header = ImageHeader::from_bytes(image)?;
    let data_offset = header.data_offset as usize;
    let code_offset = header.code_offset as usize;
    let code_end = code_offset + header.code_length as usize;
    let code = &image[code_offset..code_end];
    let instructions = disassemble(code, header.data_length as u64)?;
    let _data = &image[data_offset..code_offset];
    Ok((header, instructions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_immediate_load_with_addressing_byte() {
        let ld_code = isa_core::opcode::BY_MNEMONIC[&isa_core::Mnemonic::LD].code;
        let halt_code = isa_core::opcode::BY_MNEMONIC[&isa_core::Mnemonic::HALT].code;
        let mut code = vec![ld_code, 0x01, 0];
        code.extend_from_slice(&30u64.to_le_bytes());
        code.push(halt_code);

        let instructions = disassemble(&code, 0).unwrap();
        assert_eq!(instructions.len(), 2);
        assert_eq!(format!("{}", instructions[0]), "LD R0, 0x1E");
        assert_eq!(format!("{}", instructions[1]), "HALT");
    }

    #[test]
    fn decodes_register_to_register_arithmetic() {
        let add_code = isa_core::opcode::BY_MNEMONIC[&isa_core::Mnemonic::ADD].code;
        let code = vec![add_code, 0, 1];
        let instructions = disassemble(&code, 0).unwrap();
        assert_eq!(format!("{}", instructions[0]), "ADD R0, R1");
    }

    #[test]
    fn round_trips_an_assembled_image() {
        let assembled =
            isa_asm::assemble(".data\ns .asciiz 'Hi'\n.code\nLD R0, s\nSYS R0, 0x0006\nHALT\n").unwrap();
        let (_header, instructions) = disassemble_image(&assembled.image).unwrap();
        let mnemonics: Vec<String> = instructions.iter().map(|i| i.opcode.mnemonic.to_string()).collect();
        assert_eq!(mnemonics, vec!["LD", "SYS", "HALT"]);
    }
}
