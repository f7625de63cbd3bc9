//! Execution Engine
//!
//! Applies one decoded [`Instruction`] to a [`RegisterFile`] and a
//! [`MemoryBus`]. Dispatch goes through the [`OpcodeTable`], a flat table
//! keyed by `(opcode, extended)`: adding an instruction means adding an entry.
//!
//! # Atomicity
//! Handlers perform every fallible step (bus reads, legality checks, trap
//! checks) before their first register write, and write registers only after
//! the last fallible step. An instruction that faults, traps or is illegal
//! therefore leaves the register file exactly as it found it. Bus writes that
//! already completed in a multi-element store are not rolled back.

mod branch;
pub mod float;
mod integer;
mod load_store;
mod paired;
mod system;
pub mod table;

use std::fmt;

use crate::cpu::bus::{BusFault, MemoryBus};
use crate::cpu::decoder::Instruction;
use crate::cpu::registers::RegisterFile;

pub use table::{Form, OpcodeEntry, OpcodeTable};

/// Outcome of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Fall through: the caller advances PC by one word.
    Continue,
    /// Continue at the given address.
    Branch(u32),
    /// No semantics are defined for this `(opcode, extended)` pair, or the
    /// encoding is an invalid form of a defined instruction.
    IllegalInstruction,
    /// The bus rejected an access.
    MemoryFault(BusFault),
    /// The instruction requires supervisor handling.
    Trap(TrapReason),
}

/// Why an instruction trapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapReason {
    /// `tw` / `twi` condition satisfied.
    TrapInstruction,
    /// `sc`.
    SystemCall,
    /// An enabled floating-point exception while MSR[FE0/FE1] select a
    /// precise or imprecise exception mode.
    FloatingPointEnabled,
}

impl fmt::Display for TrapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrapReason::TrapInstruction => "trap instruction",
            TrapReason::SystemCall => "system call",
            TrapReason::FloatingPointEnabled => "enabled floating-point exception",
        })
    }
}

/// Normal completion of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Branch(u32),
}

/// Abnormal completion of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exception {
    Illegal,
    Fault(BusFault),
    Trap(TrapReason),
}

impl From<BusFault> for Exception {
    #[cold]
    fn from(fault: BusFault) -> Self {
        Exception::Fault(fault)
    }
}

pub(crate) type Outcome = Result<Flow, Exception>;

/// Signature shared by every table entry.
pub(crate) type Handler = fn(&mut RegisterFile, &Instruction, &mut dyn MemoryBus) -> Outcome;

/// Execute one instruction.
///
/// `registers.pc` must hold the address of `instr`; it is read by relative
/// branches and link forms but never modified here.
pub fn execute(
    registers: &mut RegisterFile,
    instr: &Instruction,
    bus: &mut dyn MemoryBus,
) -> ExecutionResult {
    let entry = match OpcodeTable::get().lookup(instr) {
        Some(entry) => entry,
        None => return ExecutionResult::IllegalInstruction,
    };

    match (entry.handler)(registers, instr, bus) {
        Ok(Flow::Continue) => ExecutionResult::Continue,
        Ok(Flow::Branch(target)) => ExecutionResult::Branch(target),
        Err(Exception::Illegal) => ExecutionResult::IllegalInstruction,
        Err(Exception::Fault(fault)) => ExecutionResult::MemoryFault(fault),
        Err(Exception::Trap(reason)) => ExecutionResult::Trap(reason),
    }
}
