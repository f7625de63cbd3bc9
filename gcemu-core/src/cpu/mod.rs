//! Gekko CPU core: register file, bus contract, decoder, disassembler,
//! execution engine and interpreter loop.

pub mod bus;
pub mod decoder;
pub mod disasm;
pub mod exec;
pub mod interpreter;
pub mod registers;

pub use bus::{AccessKind, BusExt, BusFault, FaultCause, MemoryBus};
pub use decoder::Instruction;
pub use exec::{execute, ExecutionResult, TrapReason};
pub use interpreter::{HaltReason, Interpreter, RunState, RunSummary, StepObserver, StopHandle};
pub use registers::RegisterFile;
