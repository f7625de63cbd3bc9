//! Interpreter Loop
//!
//! Fetch, decode, execute, advance. The interpreter owns one [`RegisterFile`]
//! and one bus and runs until an instruction cannot complete normally, a step
//! budget runs out, or a [`StopHandle`] is raised from another thread.
//!
//! # Halting
//! A step that faults, traps or hits an undefined encoding moves the
//! interpreter to [`RunState::Halted`]. `pc` keeps the address of the
//! offending instruction and no register is modified, so the host can
//! inspect or patch state and [`resume`](Interpreter::resume).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cpu::bus::{BusFault, MemoryBus};
use crate::cpu::decoder::Instruction;
use crate::cpu::exec::{execute, ExecutionResult, TrapReason};
use crate::cpu::registers::RegisterFile;

/// Why the interpreter stopped executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    IllegalInstruction { address: u32, raw: u32 },
    MemoryFault(BusFault),
    Trap { address: u32, reason: TrapReason },
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::IllegalInstruction { address, raw } => {
                write!(f, "illegal instruction 0x{raw:08X} at 0x{address:08X}")
            }
            HaltReason::MemoryFault(fault) => write!(f, "{fault}"),
            HaltReason::Trap { address, reason } => write!(f, "{reason} at 0x{address:08X}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Halted(HaltReason),
}

impl RunState {
    #[inline]
    pub fn is_halted(&self) -> bool {
        matches!(self, RunState::Halted(_))
    }
}

/// Result of [`Interpreter::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Instructions retired during this call.
    pub steps: u64,
    pub state: RunState,
    /// `true` when the run ended because the [`StopHandle`] was raised.
    pub stopped: bool,
}

/// Cross-thread request to stop between steps.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Sees every instruction before it executes.
pub trait StepObserver {
    fn before_step(&mut self, pc: u32, instr: &Instruction, registers: &RegisterFile);
}

impl<F> StepObserver for F
where
    F: FnMut(u32, &Instruction, &RegisterFile),
{
    fn before_step(&mut self, pc: u32, instr: &Instruction, registers: &RegisterFile) {
        self(pc, instr, registers)
    }
}

pub struct Interpreter<B: MemoryBus> {
    registers: RegisterFile,
    bus: B,
    state: RunState,
    stop: StopHandle,
    observer: Option<Box<dyn StepObserver>>,
    retired: u64,
}

impl<B: MemoryBus> Interpreter<B> {
    /// Reset registers and start at `entry`.
    pub fn new(bus: B, entry: u32) -> Self {
        let mut registers = RegisterFile::new();
        registers.pc = entry;
        Self::with_registers(bus, registers)
    }

    /// Start from pre-seeded registers; execution begins at `registers.pc`.
    pub fn with_registers(bus: B, registers: RegisterFile) -> Self {
        Self {
            registers,
            bus,
            state: RunState::Running,
            stop: StopHandle::new(),
            observer: None,
            retired: 0,
        }
    }

    #[inline]
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    #[inline]
    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    #[inline]
    pub fn bus(&self) -> &B {
        &self.bus
    }

    #[inline]
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_parts(self) -> (RegisterFile, B) {
        (self.registers, self.bus)
    }

    #[inline]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Total instructions retired since construction.
    #[inline]
    pub fn retired(&self) -> u64 {
        self.retired
    }

    /// A handle that stops [`run`](Self::run) before its next step.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn set_observer(&mut self, observer: impl StepObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    /// Leave the halted state and continue from the current `pc`.
    pub fn resume(&mut self) {
        self.state = RunState::Running;
    }

    /// Execute one instruction. A halted interpreter does nothing.
    pub fn step(&mut self) -> RunState {
        if self.state.is_halted() {
            return self.state;
        }

        let pc = self.registers.pc;
        let raw = match self.bus.fetch32(pc) {
            Ok(raw) => raw,
            Err(fault) => return self.halt(HaltReason::MemoryFault(fault)),
        };
        let instr = Instruction::decode(raw);

        if let Some(observer) = self.observer.as_mut() {
            observer.before_step(pc, &instr, &self.registers);
        }

        let next = match execute(&mut self.registers, &instr, &mut self.bus) {
            ExecutionResult::Continue => pc.wrapping_add(4),
            ExecutionResult::Branch(target) => target,
            ExecutionResult::IllegalInstruction => {
                return self.halt(HaltReason::IllegalInstruction { address: pc, raw })
            }
            ExecutionResult::MemoryFault(fault) => return self.halt(HaltReason::MemoryFault(fault)),
            ExecutionResult::Trap(reason) => {
                return self.halt(HaltReason::Trap {
                    address: pc,
                    reason,
                })
            }
        };

        self.registers.pc = next;
        self.registers.tb = self.registers.tb.wrapping_add(1);
        self.retired += 1;
        self.state
    }

    /// Step until halted, stopped, or `max_steps` instructions retire.
    pub fn run(&mut self, max_steps: Option<u64>) -> RunSummary {
        let mut steps = 0u64;
        loop {
            if self.state.is_halted() || max_steps.is_some_and(|max| steps >= max) {
                return RunSummary {
                    steps,
                    state: self.state,
                    stopped: false,
                };
            }
            if self.stop.is_stopped() {
                return RunSummary {
                    steps,
                    state: self.state,
                    stopped: true,
                };
            }
            if !self.step().is_halted() {
                steps += 1;
            }
        }
    }

    #[cold]
    fn halt(&mut self, reason: HaltReason) -> RunState {
        self.state = RunState::Halted(reason);
        self.state
    }
}
