//! Fetch/decode/execute loop, ALU, stack and syscall dispatch for one loaded
//! program. Shaped like the teacher's `CPU::step`/`CPU::run_with_callback` pair,
//! generalized from a fixed 6502 instruction table to the ISA's 38 mnemonics.

use std::io::{self, Write};

use isa_core::constants::{HEADER_LENGTH, HEAP_START, MAX_REG, SIGN_BIT, STACK_TOP};
use isa_core::error::VmError;
use isa_core::header::ImageHeader;
use isa_core::opcode::BY_CODE;
use isa_core::Mnemonic;

use crate::memory::Memory;
use crate::registers::Registers;
use crate::syscalls::{port, FileTable};

/// Outcome of a single `step()`, used by the debug harness to know whether to
/// keep stepping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continued,
    Halted,
}

pub struct Cpu {
    pub regs: Registers,
    pub mem: Memory,
    pub pc: u64,
    pub sp: u64,
    files: FileTable,
    running: bool,
}

impl Cpu {
    /// Loads a validated image: header stripped, data then code copied to
    /// address 0, PC and SP reset to their architectural initial values.
    pub fn load_image(bytes: &[u8]) -> Result<Self, VmError> {
        let header = ImageHeader::from_bytes(bytes)?;
        let mut mem = Memory::default();
        let body = &bytes[HEADER_LENGTH..HEADER_LENGTH + header.total_length()];
        mem.load_at(0, body)?;

        Ok(Cpu {
            regs: Registers::default(),
            mem,
            pc: header.entry_point as u64 - HEADER_LENGTH as u64,
            sp: STACK_TOP,
            files: FileTable::new(),
            running: true,
        })
    }

    pub fn running(&self) -> bool {
        self.running
    }

    /// Copies `argv` onto the heap, NUL-terminated, then pushes pointers to each
    /// in reverse order followed by `argc` — the layout the program observes as
    /// `top-of-stack = argc, next = ptr(argv[0]), ...`.
    pub fn marshal_argv(&mut self, argv: &[String]) -> Result<(), VmError> {
        let mut cursor = HEAP_START;
        let mut pointers = Vec::with_capacity(argv.len());

        for arg in argv {
            pointers.push(cursor);
            let bytes = arg.as_bytes();
            self.mem.write_bytes(cursor, bytes)?;
            cursor += bytes.len() as u64;
            self.mem.write_u8(cursor, 0)?;
            cursor += 1;
        }

        for &ptr in pointers.iter().rev() {
            self.try_push_u64(ptr);
        }
        self.try_push_u64(argv.len() as u64);
        Ok(())
    }

    /// Runs until `HALT` or a fatal error.
    pub fn run(&mut self) -> Result<(), VmError> {
        while self.step()? == StepOutcome::Continued {}
        Ok(())
    }

    /// Executes exactly one instruction.
    pub fn step(&mut self) -> Result<StepOutcome, VmError> {
        if !self.running {
            return Ok(StepOutcome::Halted);
        }

        let opcode_byte = self.mem.read_u8(self.pc)?;
        let opcode = *BY_CODE
            .get(&opcode_byte)
            .ok_or(VmError::UnknownOpcode { byte: opcode_byte, pc: self.pc })?;

        let addressing_byte =
            if opcode.has_addressing_byte() { Some(self.mem.read_u8(self.pc + 1)?) } else { None };
        let len = opcode.effective_len(addressing_byte) as u64;
        let next_pc = self.pc + len;

        use Mnemonic::*;
        match opcode.mnemonic {
            NOP => self.pc = next_pc,
            HALT => self.running = false,
            RET => self.pc = self.try_pop_u64().unwrap_or(next_pc),

            INC => {
                let rx = self.validate_reg(self.mem.read_u8(self.pc + 1)?)?;
                let value = self.regs.get(rx);
                let result = value.wrapping_add(1);
                self.regs.flags.set_overflow(value == i64::MAX as u64);
                self.regs.flags.set_carry(value == u64::MAX);
                self.regs.set(rx, result);
                self.regs.update_zs_from_value(result);
                self.pc = next_pc;
            }
            DEC => {
                let rx = self.validate_reg(self.mem.read_u8(self.pc + 1)?)?;
                let value = self.regs.get(rx);
                let result = value.wrapping_sub(1);
                self.regs.flags.set_overflow(value == SIGN_BIT);
                self.regs.flags.set_carry(value == 0);
                self.regs.set(rx, result);
                self.regs.update_zs_from_value(result);
                self.pc = next_pc;
            }
            NOT => {
                let rx = self.validate_reg(self.mem.read_u8(self.pc + 1)?)?;
                let result = !self.regs.get(rx);
                self.regs.set(rx, result);
                self.regs.update_zs_from_value(result);
                self.regs.flags.set_carry(false);
                self.regs.flags.set_overflow(false);
                self.pc = next_pc;
            }
            SHL => {
                let rx = self.validate_reg(self.mem.read_u8(self.pc + 1)?)?;
                let value = self.regs.get(rx);
                let result = value.wrapping_shl(1);
                self.regs.flags.set_carry(value & SIGN_BIT != 0);
                self.regs.flags.set_overflow(false);
                self.regs.set(rx, result);
                self.regs.update_zs_from_value(result);
                self.pc = next_pc;
            }
            SHR => {
                let rx = self.validate_reg(self.mem.read_u8(self.pc + 1)?)?;
                let value = self.regs.get(rx);
                let result = value >> 1;
                self.regs.flags.set_carry(value & 1 != 0);
                self.regs.flags.set_overflow(false);
                self.regs.set(rx, result);
                self.regs.update_zs_from_value(result);
                self.pc = next_pc;
            }
            PUSH => {
                let rx = self.validate_reg(self.mem.read_u8(self.pc + 1)?)?;
                self.try_push_u64(self.regs.get(rx));
                self.pc = next_pc;
            }
            POP => {
                let rx = self.validate_reg(self.mem.read_u8(self.pc + 1)?)?;
                if let Some(value) = self.try_pop_u64() {
                    self.regs.set(rx, value);
                }
                self.pc = next_pc;
            }

            LB => {
                let rx = self.validate_reg(self.mem.read_u8(self.pc + 1)?)?;
                let ry = self.validate_reg(self.mem.read_u8(self.pc + 2)?)?;
                let addr = self.regs.get(ry);
                let value = self.mem.read_u8(addr)?;
                self.regs.set(rx, value as u64);
                self.pc = next_pc;
            }
            SB => {
                let rx = self.validate_reg(self.mem.read_u8(self.pc + 1)?)?;
                let ry = self.validate_reg(self.mem.read_u8(self.pc + 2)?)?;
                let addr = self.regs.get(ry);
                self.mem.write_u8(addr, self.regs.get(rx) as u8)?;
                self.pc = next_pc;
            }

            LH => self.do_load(2, next_pc)?,
            LW => self.do_load(4, next_pc)?,
            LD => self.do_load(8, next_pc)?,
            SH => self.do_store(2, next_pc)?,
            SW => self.do_store(4, next_pc)?,
            SD => self.do_store(8, next_pc)?,

            MOV => {
                let (rx, ry) = self.reg_pair()?;
                self.regs.set(rx, self.regs.get(ry));
                self.pc = next_pc;
            }
            ADD => {
                let (rx, ry) = self.reg_pair()?;
                let a = self.regs.get(rx);
                let b = self.regs.get(ry);
                let (result, carry) = a.overflowing_add(b);
                let overflow = sign(a) == sign(b) && sign(result) != sign(a);
                self.regs.set(rx, result);
                self.regs.update_zs_from_value(result);
                self.regs.flags.set_carry(carry);
                self.regs.flags.set_overflow(overflow);
                self.pc = next_pc;
            }
            SUB => {
                let (rx, ry) = self.reg_pair()?;
                let a = self.regs.get(rx);
                let b = self.regs.get(ry);
                let (result, borrow) = a.overflowing_sub(b);
                let overflow = sign(a) != sign(b) && sign(result) != sign(a);
                self.regs.set(rx, result);
                self.regs.update_zs_from_value(result);
                self.regs.flags.set_carry(borrow);
                self.regs.flags.set_overflow(overflow);
                self.pc = next_pc;
            }
            CMP => {
                let (rx, ry) = self.reg_pair()?;
                let a = self.regs.get(rx);
                let b = self.regs.get(ry);
                let (result, borrow) = a.overflowing_sub(b);
                let overflow = sign(a) != sign(b) && sign(result) != sign(a);
                self.regs.update_zs_from_value(result);
                self.regs.flags.set_carry(borrow);
                self.regs.flags.set_overflow(overflow);
                self.pc = next_pc;
            }
            MUL => {
                let (rx, ry) = self.reg_pair()?;
                let a = self.regs.get(rx) as u128;
                let b = self.regs.get(ry) as u128;
                let wide = a * b;
                let result = wide as u64;
                self.regs.set(rx, result);
                self.regs.update_zs_from_value(result);
                self.regs.flags.set_carry(wide > u64::MAX as u128);
                self.regs.flags.set_overflow(false);
                self.pc = next_pc;
            }
            DIV => {
                let (rx, ry) = self.reg_pair()?;
                let divisor = self.regs.get(ry);
                if divisor == 0 {
                    return Err(VmError::DivisionByZero { divisor_reg: ry });
                }
                let result = self.regs.get(rx) / divisor;
                self.regs.set(rx, result);
                self.regs.update_zs_from_value(result);
                self.regs.flags.set_carry(false);
                self.regs.flags.set_overflow(false);
                self.pc = next_pc;
            }
            AND => {
                let (rx, ry) = self.reg_pair()?;
                let result = self.regs.get(rx) & self.regs.get(ry);
                self.regs.set(rx, result);
                self.regs.update_zs_from_value(result);
                self.regs.flags.set_carry(false);
                self.regs.flags.set_overflow(false);
                self.pc = next_pc;
            }
            OR => {
                let (rx, ry) = self.reg_pair()?;
                let result = self.regs.get(rx) | self.regs.get(ry);
                self.regs.set(rx, result);
                self.regs.update_zs_from_value(result);
                self.regs.flags.set_carry(false);
                self.regs.flags.set_overflow(false);
                self.pc = next_pc;
            }
            XOR => {
                let (rx, ry) = self.reg_pair()?;
                let result = self.regs.get(rx) ^ self.regs.get(ry);
                self.regs.set(rx, result);
                self.regs.update_zs_from_value(result);
                self.regs.flags.set_carry(false);
                self.regs.flags.set_overflow(false);
                self.pc = next_pc;
            }

            SYS => {
                let rx = self.validate_reg(self.mem.read_u8(self.pc + 1)?)?;
                let port = self.mem.read_u16(self.pc + 2)?;
                self.dispatch_syscall(rx, port)?;
                self.pc = next_pc;
            }

            CALL => {
                let addr = self.addr_operand()?;
                self.try_push_u64(next_pc);
                self.pc = addr;
            }
            JMP => self.pc = self.addr_operand()?,
            JZ => self.branch(self.regs.flags.zero(), next_pc)?,
            JNZ => self.branch(!self.regs.flags.zero(), next_pc)?,
            JC => self.branch(self.regs.flags.carry(), next_pc)?,
            JNC => self.branch(!self.regs.flags.carry(), next_pc)?,
            JL => self.branch(self.regs.flags.sign() != self.regs.flags.overflow(), next_pc)?,
            JLE => {
                let taken = self.regs.flags.zero() || (self.regs.flags.sign() != self.regs.flags.overflow());
                self.branch(taken, next_pc)?;
            }
            JG => {
                let taken = !self.regs.flags.zero() && (self.regs.flags.sign() == self.regs.flags.overflow());
                self.branch(taken, next_pc)?;
            }
            JGE => self.branch(self.regs.flags.sign() == self.regs.flags.overflow(), next_pc)?,
        }

        Ok(if self.running { StepOutcome::Continued } else { StepOutcome::Halted })
    }

    fn reg_pair(&self) -> Result<(u8, u8), VmError> {
        let rx = self.validate_reg(self.mem.read_u8(self.pc + 1)?)?;
        let ry = self.validate_reg(self.mem.read_u8(self.pc + 2)?)?;
        Ok((rx, ry))
    }

    /// Checks a decoded register byte against `MAX_REG` (spec §7.3): a corrupt or
    /// hand-crafted image can carry an out-of-range index even though the
    /// assembler never emits one.
    fn validate_reg(&self, index: u8) -> Result<u8, VmError> {
        if (index as usize) < MAX_REG {
            Ok(index)
        } else {
            Err(VmError::InvalidRegister { index, pc: self.pc })
        }
    }

    fn addr_operand(&self) -> Result<u64, VmError> {
        self.mem.read_u64(self.pc + 1)
    }

    fn branch(&mut self, taken: bool, next_pc: u64) -> Result<(), VmError> {
        self.pc = if taken { self.addr_operand()? } else { next_pc };
        Ok(())
    }

    fn do_load(&mut self, width: u8, next_pc: u64) -> Result<(), VmError> {
        let mode = self.mem.read_u8(self.pc + 1)?;
        let rx = self.validate_reg(self.mem.read_u8(self.pc + 2)?)?;
        let value = match mode {
            0x02 => {
                let ry = self.validate_reg(self.mem.read_u8(self.pc + 3)?)?;
                self.regs.get(ry)
            }
            0x04 => {
                let ry = self.validate_reg(self.mem.read_u8(self.pc + 3)?)?;
                let addr = self.regs.get(ry);
                self.read_width(addr, width)?
            }
            0x01 => {
                let bytes = self.mem.read_bytes(self.pc + 3, width as usize)?;
                zero_extend(bytes)
            }
            0x03 => {
                let bytes = self.mem.read_bytes(self.pc + 3, width as usize)?;
                let addr = zero_extend(bytes);
                self.read_width(addr, width)?
            }
            other => return Err(VmError::UnknownOpcode { byte: other, pc: self.pc }),
        };
        self.regs.set(rx, value);
        self.pc = next_pc;
        Ok(())
    }

    fn do_store(&mut self, width: u8, next_pc: u64) -> Result<(), VmError> {
        let mode = self.mem.read_u8(self.pc + 1)?;
        let rx = self.validate_reg(self.mem.read_u8(self.pc + 2)?)?;
        let value = self.regs.get(rx);
        match mode {
            0x04 => {
                let ry = self.validate_reg(self.mem.read_u8(self.pc + 3)?)?;
                let addr = self.regs.get(ry);
                self.write_width(addr, width, value)?;
            }
            0x03 => {
                let bytes = self.mem.read_bytes(self.pc + 3, width as usize)?;
                let addr = zero_extend(bytes);
                self.write_width(addr, width, value)?;
            }
            other => return Err(VmError::UnknownOpcode { byte: other, pc: self.pc }),
        }
        self.pc = next_pc;
        Ok(())
    }

    fn read_width(&self, addr: u64, width: u8) -> Result<u64, VmError> {
        match width {
            2 => self.mem.read_u16(addr).map(u64::from),
            4 => self.mem.read_u32(addr).map(u64::from),
            8 => self.mem.read_u64(addr),
            _ => unreachable!("load/store width is always 2, 4 or 8"),
        }
    }

    fn write_width(&mut self, addr: u64, width: u8, value: u64) -> Result<(), VmError> {
        match width {
            2 => self.mem.write_u16(addr, value as u16),
            4 => self.mem.write_u32(addr, value as u32),
            8 => self.mem.write_u64(addr, value),
            _ => unreachable!("load/store width is always 2, 4 or 8"),
        }
    }

    /// Pushes a 64-bit value, decreasing SP by 8. No-ops (and returns `false`) if
    /// that would take SP below 0 — the documented soft-fault behavior.
    fn try_push_u64(&mut self, value: u64) -> bool {
        if self.sp < 8 {
            return false;
        }
        self.sp -= 8;
        let _ = self.mem.write_u64(self.sp, value);
        true
    }

    /// Pops a 64-bit value, increasing SP by 8 and zeroing the bytes read. Returns
    /// `None` (no-op) if that would take SP above the stack's top.
    fn try_pop_u64(&mut self) -> Option<u64> {
        if self.sp + 8 > STACK_TOP {
            return None;
        }
        let value = self.mem.read_u64(self.sp).ok()?;
        let _ = self.mem.zero_bytes(self.sp, 8);
        self.sp += 8;
        Some(value)
    }

    fn dispatch_syscall(&mut self, rx: u8, sys_port: u16) -> Result<(), VmError> {
        match sys_port {
            port::STDIN_INT => {
                let line = read_stdin_line()?;
                let value: i64 = line.trim().parse().unwrap_or(0);
                self.regs.set(rx, value as u64);
            }
            port::STDIN_CHAR => {
                let line = read_stdin_line()?;
                let ch = line.chars().next().unwrap_or('\0');
                self.regs.set(rx, ch as u64);
            }
            port::STDOUT_INT => {
                println!("{}", self.regs.get(rx) as i64);
            }
            port::STDOUT_INT_NR => {
                print!("{}", self.regs.get(rx) as i64);
                io::stdout().flush().ok();
            }
            port::STDOUT_CHAR => {
                println!("{}", char::from_u32(self.regs.get(rx) as u32).unwrap_or('\u{FFFD}'));
            }
            port::STDOUT_CHAR_NR => {
                print!("{}", char::from_u32(self.regs.get(rx) as u32).unwrap_or('\u{FFFD}'));
                io::stdout().flush().ok();
            }
            port::STDOUT_STR => {
                let bytes = self.mem.read_cstring(self.regs.get(rx))?;
                println!("{}", bytes_to_string(&bytes));
            }
            port::STDOUT_STR_NR => {
                let bytes = self.mem.read_cstring(self.regs.get(rx))?;
                print!("{}", bytes_to_string(&bytes));
                io::stdout().flush().ok();
            }
            port::FILE_OPEN => {
                let name_addr = self.regs.get(0);
                let mode = self.regs.get(1);
                let name_bytes = self.mem.read_cstring(name_addr)?;
                let path = bytes_to_string(&name_bytes);
                let fd = self.files.open(&path, mode).map_err(VmError::Io)?;
                self.regs.set(0, fd as u64);
            }
            port::FILE_READ => {
                let fd = self.regs.get(0) as u16;
                let dest = self.regs.get(1);
                let count = self.regs.get(2) as usize;
                let mut buf = vec![0u8; count];
                let n = self.files.read(fd, &mut buf).map_err(VmError::Io)?;
                self.mem.write_bytes(dest, &buf[..n])?;
                self.regs.set(rx, n as u64);
            }
            port::FILE_WRITE => {
                let fd = self.regs.get(0) as u16;
                let src = self.regs.get(1);
                let count = self.regs.get(2) as usize;
                let bytes = self.mem.read_bytes(src, count)?.to_vec();
                let n = self.files.write(fd, &bytes).map_err(VmError::Io)?;
                self.regs.set(rx, n as u64);
            }
            port::FILE_CLOSE => {
                let fd = self.regs.get(0) as u16;
                let ok = self.files.close(fd);
                self.regs.set(rx, if ok { 0 } else { 1 });
            }
            _ => {} // unknown port: silent no-op, per spec §4.7
        }
        Ok(())
    }
}

fn sign(value: u64) -> bool {
    value & SIGN_BIT != 0
}

fn zero_extend(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn bytes_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn read_stdin_line() -> Result<String, VmError> {
    let mut line = String::new();
    io::stdin().read_line(&mut line).map_err(VmError::Io)?;
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use isa_asm::assemble;

    fn load(src: &str) -> Cpu {
        let assembled = assemble(src).unwrap();
        Cpu::load_image(&assembled.image).unwrap()
    }

    #[test]
    fn arithmetic_and_flags_scenario() {
        let mut cpu = load(".code\nLD R0, 30\nLD R1, 20\nSUB R0, R1\nHALT\n");
        cpu.run().unwrap();
        assert_eq!(cpu.regs.get(0), 10);
        assert!(!cpu.regs.flags.zero());
        assert!(!cpu.regs.flags.sign());
        assert!(!cpu.regs.flags.carry());
        assert!(!cpu.regs.flags.overflow());
    }

    #[test]
    fn unsigned_wrap_scenario() {
        let mut cpu = load(".code\nLD R0, 0\nDEC R0\nHALT\n");
        cpu.run().unwrap();
        assert_eq!(cpu.regs.get(0), u64::MAX);
        assert!(cpu.regs.flags.carry());
    }

    #[test]
    fn inc_at_max_positive_sets_overflow() {
        let mut cpu = load(".code\nLD R0, 0x7FFFFFFFFFFFFFFF\nINC R0\nHALT\n");
        cpu.run().unwrap();
        assert_eq!(cpu.regs.get(0), SIGN_BIT);
        assert!(cpu.regs.flags.overflow());
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let mut cpu = load(".code\nLD R0, 10\nLD R1, 0\nDIV R0, R1\nHALT\n");
        assert!(matches!(cpu.run(), Err(VmError::DivisionByZero { .. })));
    }

    #[test]
    fn branch_not_taken_advances_by_base_length() {
        let mut cpu = load(".code\nLD R0, 1\nCMP R0, R0\nJNZ skip\nLD R1, 7\nskip:\nHALT\n");
        cpu.run().unwrap();
        assert_eq!(cpu.regs.get(1), 7);
    }

    #[test]
    fn push_pop_is_an_inverse_and_zeroes_memory() {
        let mut cpu = load(".code\nLD R0, 0x2A\nPUSH R0\nPOP R1\nHALT\n");
        let sp_before = cpu.sp;
        cpu.run().unwrap();
        assert_eq!(cpu.regs.get(1), 0x2A);
        assert_eq!(cpu.sp, sp_before);
    }

    #[test]
    fn call_then_ret_restores_pc_and_sp() {
        let mut cpu = load(".code\nCALL fn\nHALT\nfn:\nRET\n");
        let sp_before = cpu.sp;
        cpu.step().unwrap(); // CALL
        assert_ne!(cpu.sp, sp_before);
        cpu.step().unwrap(); // RET
        assert_eq!(cpu.sp, sp_before);
    }

    #[test]
    fn stack_underflow_pop_is_a_silent_no_op() {
        let mut cpu = load(".code\nPOP R0\nHALT\n");
        cpu.regs.set(0, 0xDEAD);
        cpu.run().unwrap();
        assert_eq!(cpu.regs.get(0), 0xDEAD);
    }

    #[test]
    fn cmp_leaves_registers_unchanged() {
        let mut cpu = load(".code\nLD R0, 5\nLD R1, 5\nCMP R0, R1\nHALT\n");
        cpu.run().unwrap();
        assert_eq!(cpu.regs.get(0), 5);
        assert_eq!(cpu.regs.get(1), 5);
        assert!(cpu.regs.flags.zero());
    }

    #[test]
    fn argv_marshaling_lands_argc_on_top_of_stack() {
        let mut cpu = load(".code\nHALT\n");
        let sp_before = cpu.sp;
        cpu.marshal_argv(&["Hello".to_string(), "World".to_string()]).unwrap();
        assert_eq!(cpu.sp, sp_before - 24);
        assert_eq!(cpu.mem.read_u64(cpu.sp).unwrap(), 2);
    }

    #[test]
    fn out_of_range_decoded_register_is_fatal() {
        // A hand-crafted image (not one the assembler would ever emit) carrying
        // an INC opcode with a register byte past MAX_REG.
        let mut cpu = load(".code\nHALT\n");
        cpu.mem.write_u8(0, isa_core::opcode::BY_MNEMONIC[&isa_core::Mnemonic::INC].code).unwrap();
        cpu.mem.write_u8(1, 200).unwrap();
        cpu.pc = 0;
        assert!(matches!(cpu.step(), Err(VmError::InvalidRegister { index: 200, .. })));
    }
}
