//! CPU state, memory, registers, syscalls and the optional debug/step harness
//! for the register-ISA virtual machine. The `run` binary (`main.rs`) is a thin
//! CLI shell around this library.

pub mod cpu;
pub mod debug;
pub mod memory;
pub mod registers;
pub mod syscalls;

pub use cpu::{Cpu, StepOutcome};
