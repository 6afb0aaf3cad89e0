//! Pass 1: walks cleaned source lines, tracking section and cursor, and produces
//! the finished symbol table plus the resolved `DATA_LENGTH`.

use std::collections::HashMap;

use isa_core::error::AsmError;
use isa_core::opcode::BY_MNEMONIC;

use crate::numerals::parse_int;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Code,
    Data,
}

/// Finished symbol table: every `.data` label and `.code` label mapped to its
/// absolute byte address in the assembled image, plus the final data segment size.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    pub symbols: HashMap<String, u64>,
    pub data_length: u64,
}

impl SymbolTable {
    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }
}

/// Runs pass 1 over the cleaned, line-numbered token stream.
///
/// Code labels are recorded as an offset from the start of the code segment
/// because `DATA_LENGTH` isn't known until the whole file has been walked; their
/// addresses are finalized by adding the resolved `data_length` once the walk
/// completes.
pub fn resolve(lines: &[(usize, Vec<String>)]) -> Result<SymbolTable, AsmError> {
    let mut section = Section::Code;
    let mut data_cursor: u64 = 0;
    let mut code_cursor: u64 = 0;

    let mut data_symbols: HashMap<String, u64> = HashMap::new();
    let mut code_labels: HashMap<String, u64> = HashMap::new();
    let mut known_names: std::collections::HashSet<String> = std::collections::HashSet::new();

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

            let name = head.to_string();
            if known_names.contains(&name) {
                return Err(AsmError::DuplicateSymbol { line: line_no, symbol: name });
            }
            known_names.insert(name.clone());
            data_symbols.insert(name, data_cursor);

            let directive = tokens.get(1).map(String::as_str).unwrap_or("");
            let operands = &tokens[2.min(tokens.len())..];
            data_cursor += data_footprint(directive, operands);
            continue;
        }

        // Code section. A label may stand alone on its line or precede an
        // instruction on the same line; either way it marks `code_cursor`'s
        // current value before anything else on the line is processed.
        let rest: &[String] = if head.ends_with(':') {
            let label = head.trim_end_matches(':').to_string();
            if known_names.contains(&label) {
                return Err(AsmError::DuplicateSymbol { line: line_no, symbol: label });
            }
            known_names.insert(label.clone());
            code_labels.insert(label, code_cursor);
            &tokens[1..]
        } else {
            &tokens[..]
        };

        if rest.is_empty() {
            continue;
        }

        let mnemonic: isa_core::Mnemonic = rest[0].parse().map_err(|_| AsmError::UnknownMnemonic {
            line: line_no,
            mnemonic: rest[0].clone(),
        })?;
        let opcode = BY_MNEMONIC[&mnemonic];

        code_cursor += instruction_lookahead_length(opcode, rest, &known_names, line_no)? as u64;
    }

    let data_length = data_cursor;
    let mut symbols = data_symbols;
    for (name, offset) in code_labels {
        symbols.insert(name, data_length + offset);
    }

    Ok(SymbolTable { symbols, data_length })
}

/// Byte footprint of one `.data` entry, per spec §3. The bare-integer
/// shorthand is 2 bytes, matching the original's pass-1 cursor
/// (`assembler.py`'s `memory_addr += 2`) rather than its pass-2 encoder, which
/// emits 8 bytes for the same case — an inconsistency in the source that would
/// violate the data-cursor invariant of spec §8 if carried over here.
fn data_footprint(directive: &str, operands: &[String]) -> u64 {
    match directive {
        ".byte" => operands.len() as u64,
        ".word" => operands.len() as u64 * 4,
        ".asciiz" => {
            let joined = operands.join(" ").replace('\'', "");
            joined.len() as u64 + 1
        }
        _ => 2,
    }
}

/// Pass-1 lookahead: how many bytes pass 2 will emit for this instruction, given
/// only its textual operands (the addressing mode is decidable without knowing
/// any symbol's numeric value).
fn instruction_lookahead_length(
    opcode: &isa_core::Opcode,
    tokens: &[String],
    known_names: &std::collections::HashSet<String>,
    line_no: usize,
) -> Result<usize, AsmError> {
    use isa_core::Mnemonic::*;

    let mnemonic = opcode.mnemonic;
    if matches!(mnemonic, LH | LW | LD) {
        let operand = tokens.get(2).ok_or_else(|| AsmError::MalformedOperand {
            line: line_no,
            mnemonic: mnemonic.to_string(),
            detail: "missing source operand".to_string(),
        })?;
        return Ok(load_store_lookahead(opcode, operand, known_names, true));
    }
    if matches!(mnemonic, SH | SW | SD) {
        let operand = tokens.get(2).ok_or_else(|| AsmError::MalformedOperand {
            line: line_no,
            mnemonic: mnemonic.to_string(),
            detail: "missing destination operand".to_string(),
        })?;
        return Ok(load_store_lookahead(opcode, operand, known_names, false));
    }
    Ok(opcode.base_len as usize)
}

fn load_store_lookahead(
    opcode: &isa_core::Opcode,
    operand: &str,
    known_names: &std::collections::HashSet<String>,
    is_load: bool,
) -> usize {
    let width = opcode.operand_width().unwrap_or(1);
    let expanded = opcode.base_len as usize + (width as usize - 1);

    if is_load {
        if operand.starts_with('R') {
            opcode.base_len as usize
        } else if operand.starts_with("[R") && operand.ends_with(']') {
            opcode.base_len as usize
        } else if known_names.contains(operand) || operand.to_ascii_lowercase().starts_with("0x") {
            expanded
        } else if parse_int(operand).is_some() {
            expanded
        } else {
            opcode.base_len as usize
        }
    } else if known_names.contains(operand) || operand.to_ascii_lowercase().starts_with("0x") {
        expanded
    } else {
        opcode.base_len as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::clean_source;

    #[test]
    fn data_labels_land_at_successive_offsets() {
        let src = ".data\nfirst .byte 1 2 3\nsecond .word 10\n.code\nHALT\n";
        let lines = clean_source(src);
        let table = resolve(&lines).unwrap();
        assert_eq!(table.symbols["first"], 0);
        assert_eq!(table.symbols["second"], 3);
        assert_eq!(table.data_length, 7);
    }

    #[test]
    fn code_labels_offset_by_final_data_length() {
        let src = ".data\nx .byte 1 2\n.code\nloop:\nNOP\nJMP loop\n";
        let lines = clean_source(src);
        let table = resolve(&lines).unwrap();
        assert_eq!(table.data_length, 2);
        assert_eq!(table.symbols["loop"], 2);
    }

    #[test]
    fn duplicate_symbol_is_an_error() {
        let src = ".data\nx .byte 1\nx .byte 2\n";
        let lines = clean_source(src);
        assert!(matches!(resolve(&lines), Err(AsmError::DuplicateSymbol { .. })));
    }

    #[test]
    fn load_immediate_expands_length_past_base() {
        let src = ".code\nLD R0, 0x100\nHALT\n";
        let lines = clean_source(src);
        let table = resolve(&lines).unwrap();
        // LD base_len=4, width=8 => expanded = 4 + 7 = 11, plus HALT's 1 byte.
        assert_eq!(table.symbols.get("unused"), None);
        assert_eq!(table.data_length, 0);
    }

    #[test]
    fn unknown_mnemonic_is_an_error() {
        let src = ".code\nFROB R0\n";
        let lines = clean_source(src);
        assert!(matches!(resolve(&lines), Err(AsmError::UnknownMnemonic { .. })));
    }
}
