//! Pass 2: re-walks the cleaned source with the finished symbol table in hand and
//! emits the final data and code byte buffers, plus parallel debug-sidecar
//! records when requested.

use isa_core::constants::{ADDR_WIDTH, MAX_REG, MEM_SIZE, PORT_WIDTH};
use isa_core::error::AsmError;
use isa_core::opcode::BY_MNEMONIC;
use isa_core::{Mnemonic, Opcode};

use crate::numerals::{parse_char_literal, parse_int};
use crate::symbols::SymbolTable;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Section {
    Code,
    Data,
}

/// One emitted unit, recorded for the `.hex`/`.dbg` sidecars: the source text that
/// produced it, its bytes, and the address it landed at.
#[derive(Debug, Clone)]
pub struct DebugChunk {
    pub instr: String,
    pub bytes: Vec<u8>,
    pub addr: u64,
}

/// Runs pass 2, returning the data segment, code segment, and (regardless of
/// debug mode) the chunk trail used to build debug sidecars on request.
pub fn encode(
    lines: &[(usize, Vec<String>)],
    symbols: &SymbolTable,
) -> Result<(Vec<u8>, Vec<u8>, Vec<DebugChunk>), AsmError> {
    let mut section = Section::Code;
    let mut data_buf: Vec<u8> = Vec::new();
    let mut code_buf: Vec<u8> = Vec::new();
    let mut chunks: Vec<DebugChunk> = Vec::new();

    for &(line_no, ref tokens) in lines {
        let head = tokens[0].as_str();

        if head == ".data" {
            section = Section::Data;
            continue;
        }

        if section == Section::Data {
            if head == ".code" {
                section = Section::Code;
                continue;
            }
            let directive = tokens.get(1).map(String::as_str).unwrap_or("");
            let operands = &tokens[2.min(tokens.len())..];
            let bytes = encode_data_directive(directive, operands, line_no)?;
            let addr = data_buf.len() as u64;
            data_buf.extend_from_slice(&bytes);
            chunks.push(DebugChunk { instr: tokens.join(" "), bytes, addr });
            continue;
        }

        let rest: &[String] = if head.ends_with(':') { &tokens[1..] } else { &tokens[..] };
        if rest.is_empty() {
            continue;
        }

        let mnemonic: Mnemonic = rest[0].parse().map_err(|_| AsmError::UnknownMnemonic {
            line: line_no,
            mnemonic: rest[0].clone(),
        })?;
        let opcode = BY_MNEMONIC[&mnemonic];
        let bytes = encode_instruction(opcode, rest, symbols, line_no)?;
        let addr = data_buf.len() as u64 + code_buf.len() as u64;
        code_buf.extend_from_slice(&bytes);
        chunks.push(DebugChunk { instr: rest.join(" "), bytes, addr });
    }

    Ok((data_buf, code_buf, chunks))
}

fn encode_data_directive(directive: &str, operands: &[String], line_no: usize) -> Result<Vec<u8>, AsmError> {
    match directive {
        ".byte" => {
            let mut bytes = Vec::with_capacity(operands.len());
            for op in operands {
                if let Some(ord) = parse_char_literal(op) {
                    bytes.push(ord);
                } else if let Some(value) = parse_int(op) {
                    bytes.push((value & 0xFF) as u8);
                } else {
                    return Err(AsmError::Syntax {
                        line: line_no,
                        detail: format!(".byte element '{op}' is neither an integer nor a char literal"),
                    });
                }
            }
            Ok(bytes)
        }
        ".word" => {
            let mut bytes = Vec::with_capacity(operands.len() * 4);
            for op in operands {
                let value = parse_int(op).ok_or_else(|| AsmError::Syntax {
                    line: line_no,
                    detail: format!(".word element '{op}' is not an integer"),
                })?;
                bytes.extend_from_slice(&(value as u32).to_le_bytes());
            }
            Ok(bytes)
        }
        ".asciiz" => {
            let joined = operands.join(" ").replace('\'', "");
            let mut bytes: Vec<u8> = joined.into_bytes();
            bytes.push(0);
            Ok(bytes)
        }
        bare => {
            // Bare-integer shorthand is 2 bytes, per spec §3 and the original's
            // pass-1 cursor (`assembler.py`'s `memory_addr += 2`); see
            // `symbols::data_footprint` for why pass 2 must agree with that,
            // not with the original's inconsistent 8-byte pass-2 encoder.
            let mut all = Vec::with_capacity(1 + operands.len());
            all.push(bare.to_string());
            all.extend(operands.iter().cloned());
            let joined_first = all.first().cloned().unwrap_or_default();
            let value = parse_int(&joined_first).ok_or_else(|| AsmError::Syntax {
                line: line_no,
                detail: format!("'{joined_first}' is neither a directive nor an integer initializer"),
            })?;
            if value < 0 || value as u128 >= (1u128 << 16) {
                return Err(AsmError::OutOfRange {
                    line: line_no,
                    value,
                    lower: 0,
                    upper: (1i128 << 16) - 1,
                });
            }
            Ok((value as u16).to_le_bytes().to_vec())
        }
    }
}

fn register_index(token: &str, line_no: usize) -> Result<u8, AsmError> {
    let digits = token.strip_prefix('R').ok_or_else(|| AsmError::Syntax {
        line: line_no,
        detail: format!("expected a register operand, found '{token}'"),
    })?;
    let index: i64 = digits.parse().map_err(|_| AsmError::Syntax {
        line: line_no,
        detail: format!("'{token}' is not a valid register"),
    })?;
    if index < 0 || index as usize >= MAX_REG {
        return Err(AsmError::RegisterOutOfRange { line: line_no, index, max_reg: MAX_REG });
    }
    Ok(index as u8)
}

fn indirect_register_index(token: &str, line_no: usize) -> Result<u8, AsmError> {
    let inner = token
        .strip_prefix("[R")
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| AsmError::Syntax {
            line: line_no,
            detail: format!("expected an indirect operand '[Rn]', found '{token}'"),
        })?;
    let index: i64 = inner.parse().map_err(|_| AsmError::Syntax {
        line: line_no,
        detail: format!("'{token}' is not a valid indirect operand"),
    })?;
    if index < 0 || index as usize >= MAX_REG {
        return Err(AsmError::RegisterOutOfRange { line: line_no, index, max_reg: MAX_REG });
    }
    Ok(index as u8)
}

fn substitute_symbols(tokens: &[String], symbols: &SymbolTable) -> (Vec<String>, bool) {
    let mut is_symbol = false;
    let resolved = tokens
        .iter()
        .map(|tok| match symbols.symbols.get(tok.as_str()) {
            Some(&addr) => {
                is_symbol = true;
                format!("0x{addr:04X}")
            }
            None => tok.clone(),
        })
        .collect();
    (resolved, is_symbol)
}

fn validate_rx_ry(opcode: &Opcode, line: &[String], line_no: usize) -> Result<Vec<u8>, AsmError> {
    let rx = register_index(&line[1], line_no)?;
    let ry = register_index(&line[2], line_no)?;
    Ok(vec![opcode.code, rx, ry])
}

fn validate_rx(opcode: &Opcode, line: &[String], line_no: usize) -> Result<Vec<u8>, AsmError> {
    let rx = register_index(&line[1], line_no)?;
    Ok(vec![opcode.code, rx])
}

fn validate_rx_indr(opcode: &Opcode, line: &[String], line_no: usize) -> Result<Vec<u8>, AsmError> {
    let rx = register_index(&line[1], line_no)?;
    let ry = indirect_register_index(&line[2], line_no)?;
    Ok(vec![opcode.code, rx, ry])
}

fn validate_rx_addr(
    opcode: &Opcode,
    line: &[String],
    is_symbol: bool,
    data_length: u64,
    width: usize,
    line_no: usize,
) -> Result<Vec<u8>, AsmError> {
    let rx = register_index(&line[1], line_no)?;
    let addr = parse_int(&line[2]).ok_or_else(|| AsmError::Syntax {
        line: line_no,
        detail: format!("'{}' is not a valid address", line[2]),
    })?;
    let lower_bound = if is_symbol { 0 } else { data_length as i128 };
    let upper_bound = MEM_SIZE as i128 - 1;
    if addr < lower_bound || addr >= upper_bound {
        return Err(AsmError::OutOfRange { line: line_no, value: addr, lower: lower_bound, upper: upper_bound });
    }
    let mut bytes = vec![opcode.code, rx];
    bytes.extend_from_slice(&(addr as u64).to_le_bytes()[..width]);
    Ok(bytes)
}

fn validate_rx_val(opcode: &Opcode, line: &[String], width: usize, line_no: usize) -> Result<Vec<u8>, AsmError> {
    let rx = register_index(&line[1], line_no)?;
    let value = parse_int(&line[2]).ok_or_else(|| AsmError::Syntax {
        line: line_no,
        detail: format!("'{}' is not a valid immediate", line[2]),
    })?;
    let mask: i128 = (1i128 << (width * 8)) - 1;
    if value < 0 || value > mask {
        return Err(AsmError::OutOfRange { line: line_no, value, lower: 0, upper: mask });
    }
    let mut bytes = vec![opcode.code, rx];
    bytes.extend_from_slice(&(value as u64).to_le_bytes()[..width]);
    Ok(bytes)
}

fn validate_addr(
    opcode: &Opcode,
    line: &[String],
    is_symbol: bool,
    data_length: u64,
    line_no: usize,
) -> Result<Vec<u8>, AsmError> {
    let addr = parse_int(&line[1]).ok_or_else(|| AsmError::Syntax {
        line: line_no,
        detail: format!("'{}' is not a valid address", line[1]),
    })?;
    let lower_bound = if is_symbol { 0 } else { data_length as i128 };
    let upper_bound = MEM_SIZE as i128 - 1;
    if addr < lower_bound || addr >= upper_bound {
        return Err(AsmError::OutOfRange { line: line_no, value: addr, lower: lower_bound, upper: upper_bound });
    }
    let mut bytes = vec![opcode.code];
    bytes.extend_from_slice(&(addr as u64).to_le_bytes()[..ADDR_WIDTH]);
    Ok(bytes)
}

fn handle_load(
    opcode: &Opcode,
    line: &[String],
    is_symbol: bool,
    data_length: u64,
    width: usize,
    line_no: usize,
) -> Result<Vec<u8>, AsmError> {
    let operand = line[2].as_str();
    let (mode, mut bytes) = if operand.starts_with('R') && !is_symbol {
        (0x02u8, validate_rx_ry(opcode, line, line_no)?)
    } else if operand.starts_with("[R") && operand.ends_with(']') && !is_symbol {
        (0x04u8, validate_rx_indr(opcode, line, line_no)?)
    } else if is_symbol {
        (0x01u8, validate_rx_val(opcode, line, width, line_no)?)
    } else if operand.to_ascii_lowercase().starts_with("0x") {
        (0x03u8, validate_rx_addr(opcode, line, is_symbol, data_length, width, line_no)?)
    } else {
        (0x01u8, validate_rx_val(opcode, line, width, line_no)?)
    };
    bytes.insert(1, mode);
    Ok(bytes)
}

fn handle_store(
    opcode: &Opcode,
    line: &[String],
    is_symbol: bool,
    data_length: u64,
    width: usize,
    line_no: usize,
) -> Result<Vec<u8>, AsmError> {
    let operand = line[2].as_str();
    let (mode, mut bytes) = if is_symbol {
        (0x03u8, validate_rx_addr(opcode, line, is_symbol, data_length, width, line_no)?)
    } else if operand.to_ascii_lowercase().starts_with("0x") {
        (0x03u8, validate_rx_addr(opcode, line, is_symbol, data_length, width, line_no)?)
    } else {
        (0x04u8, validate_rx_indr(opcode, line, line_no)?)
    };
    bytes.insert(1, mode);
    Ok(bytes)
}

fn encode_instruction(
    opcode: &Opcode,
    tokens: &[String],
    symbols: &SymbolTable,
    line_no: usize,
) -> Result<Vec<u8>, AsmError> {
    use Mnemonic::*;

    let (line, is_symbol) = substitute_symbols(tokens, symbols);
    let data_length = symbols.data_length;

    match opcode.mnemonic {
        NOP | RET | HALT => Ok(vec![opcode.code]),
        LH => handle_load(opcode, &line, is_symbol, data_length, 2, line_no),
        LW => handle_load(opcode, &line, is_symbol, data_length, 4, line_no),
        LD => handle_load(opcode, &line, is_symbol, data_length, 8, line_no),
        SH => handle_store(opcode, &line, is_symbol, data_length, 2, line_no),
        SW => handle_store(opcode, &line, is_symbol, data_length, 4, line_no),
        SD => handle_store(opcode, &line, is_symbol, data_length, 8, line_no),
        LB | SB => validate_rx_indr(opcode, &line, line_no),
        INC | DEC | NOT | PUSH | POP | SHL | SHR => validate_rx(opcode, &line, line_no),
        MOV | ADD | SUB | MUL | DIV | AND | OR | XOR | CMP => validate_rx_ry(opcode, &line, line_no),
        CALL | JMP | JZ | JNZ | JC | JNC | JL | JLE | JG | JGE => {
            validate_addr(opcode, &line, is_symbol, data_length, line_no)
        }
        SYS => validate_rx_addr(opcode, &line, true, data_length, PORT_WIDTH, line_no),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::clean_source;
    use crate::symbols::resolve;

    fn encode_program(src: &str) -> (Vec<u8>, Vec<u8>) {
        let lines = clean_source(src);
        let symbols = resolve(&lines).unwrap();
        let (data, code, _) = encode(&lines, &symbols).unwrap();
        (data, code)
    }

    #[test]
    fn encodes_immediate_load_with_addressing_byte() {
        let (_data, code) = encode_program(".code\nLD R0, 30\nHALT\n");
        assert_eq!(code[0], BY_MNEMONIC[&Mnemonic::LD].code);
        assert_eq!(code[1], 0x01);
        assert_eq!(code[2], 0);
        assert_eq!(&code[3..11], &30u64.to_le_bytes());
        assert_eq!(code[11], BY_MNEMONIC[&Mnemonic::HALT].code);
    }

    #[test]
    fn encodes_register_to_register_arithmetic() {
        let (_data, code) = encode_program(".code\nADD R0, R1\nHALT\n");
        assert_eq!(code[0], BY_MNEMONIC[&Mnemonic::ADD].code);
        assert_eq!(code[1], 0);
        assert_eq!(code[2], 1);
    }

    #[test]
    fn encodes_asciiz_with_nul_terminator() {
        let (data, _code) = encode_program(".data\ns .asciiz 'Hi'\n.code\nHALT\n");
        assert_eq!(data, vec![b'H', b'i', 0]);
    }

    #[test]
    fn symbol_operand_selects_absolute_store_mode() {
        let (_data, code) = encode_program(".data\nbuf .byte 0 0\n.code\nSW R0, buf\nHALT\n");
        assert_eq!(code[0], BY_MNEMONIC[&Mnemonic::SW].code);
        assert_eq!(code[1], 0x03);
    }

    #[test]
    fn register_out_of_range_is_an_error() {
        let lines = clean_source(".code\nINC R99\n");
        let symbols = resolve(&lines).unwrap();
        assert!(matches!(encode(&lines, &symbols), Err(AsmError::RegisterOutOfRange { .. })));
    }
}
