//! Optional single-step / breakpoint harness (spec §4.8, component C11).
//!
//! Wraps a [`Cpu`] without ever touching its architectural state: it only reads
//! `pc` and `mem` to decide when to print a symbol name or stop for a prompt.
//! Grounded on the original `isa.py::step`/`print_debug_symbol` pair — empty
//! input single-steps, `c` free-runs until a breakpoint, any other token toggles
//! a named breakpoint on a labelled symbol.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use isa_core::error::VmError;
use isa_core::opcode::BY_CODE;
use isa_core::Mnemonic;

use crate::cpu::{Cpu, StepOutcome};

const CONTROL_TRANSFER: &[Mnemonic] = &[
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
    Mnemonic::RET,
];

pub struct DebugHarness {
    symbols: HashMap<u64, String>,
    breakpoints: Vec<String>,
    stepping: bool,
    at_breakpoint: bool,
}

impl DebugHarness {
    /// Loads the `<image>.symbols` sidecar next to `image_path`, if the
    /// assembler emitted one. A missing sidecar just means no symbol names are
    /// ever printed; it is not an error.
    pub fn new(image_path: &Path, step_mode: bool) -> io::Result<Self> {
        let symbols_path = with_extra_extension(image_path, "symbols");
        let symbols = match std::fs::read_to_string(&symbols_path) {
            Ok(text) => parse_symbols(&text),
            Err(_) => HashMap::new(),
        };
        Ok(DebugHarness { symbols, breakpoints: Vec::new(), stepping: step_mode, at_breakpoint: false })
    }

    /// Runs `cpu` to completion, printing a symbol name on every taken control
    /// transfer and, while stepping or at a breakpoint, prompting after each
    /// instruction.
    pub fn run(&mut self, cpu: &mut Cpu) -> Result<(), VmError> {
        loop {
            let pc_before = cpu.pc;
            let mnemonic = self.mnemonic_at(cpu, pc_before)?;

            let outcome = cpu.step()?;

            if CONTROL_TRANSFER.contains(&mnemonic) && cpu.pc != pc_before {
                self.note_transfer(cpu.pc);
            }

            if outcome == StepOutcome::Halted {
                return Ok(());
            }

            if self.stepping || self.at_breakpoint {
                self.prompt()?;
            }
        }
    }

    fn mnemonic_at(&self, cpu: &Cpu, pc: u64) -> Result<Mnemonic, VmError> {
        let byte = cpu.mem.read_u8(pc)?;
        let opcode = BY_CODE.get(&byte).ok_or(VmError::UnknownOpcode { byte, pc })?;
        Ok(opcode.mnemonic)
    }

    fn note_transfer(&mut self, addr: u64) {
        if let Some(name) = self.symbols.get(&addr) {
            println!("Symbol: {name}");
            if self.breakpoints.iter().any(|b| b == name) {
                self.at_breakpoint = true;
            }
        }
    }

    fn prompt(&mut self) -> Result<(), VmError> {
        print!("~ % ");
        io::stdout().flush().map_err(VmError::Io)?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).map_err(VmError::Io)?;
        let cmd = line.trim();

        if cmd.is_empty() {
            self.stepping = true;
        } else if cmd == "c" {
            self.stepping = false;
            self.at_breakpoint = false;
        } else if !self.breakpoints.iter().any(|b| b == cmd) {
            self.breakpoints.push(cmd.to_string());
            self.stepping = false;
        } else {
            self.stepping = true;
        }
        println!();
        Ok(())
    }
}

/// Parses `name = address` lines, the format `Assembled::symbols_listing` emits.
fn parse_symbols(text: &str) -> HashMap<u64, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let mut parts = line.splitn(2, '=');
        let name = match parts.next() {
            Some(n) => n.trim().to_string(),
            None => continue,
        };
        let addr = match parts.next().and_then(|a| a.trim().parse::<u64>().ok()) {
            Some(a) => a,
            None => continue,
        };
        map.insert(addr, name);
    }
    map
}

fn with_extra_extension(path: &Path, extra: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(extra);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_symbol_sidecar_lines() {
        let map = parse_symbols("start = 16\nfact = 30\n");
        assert_eq!(map.get(&16), Some(&"start".to_string()));
        assert_eq!(map.get(&30), Some(&"fact".to_string()));
    }

    #[test]
    fn ignores_malformed_lines() {
        let map = parse_symbols("not a symbol line\nx = not_a_number\n");
        assert!(map.is_empty());
    }

    #[test]
    fn missing_sidecar_yields_empty_harness() {
        let harness = DebugHarness::new(Path::new("/no/such/image.bin"), false).unwrap();
        assert!(harness.symbols.is_empty());
    }
}
