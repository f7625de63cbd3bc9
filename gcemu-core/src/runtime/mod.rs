//! Host-side collaborators of the CPU core.

pub mod memory;
pub mod trace;

pub use memory::{Ram, MAIN_RAM_BASE, MAIN_RAM_SIZE};
pub use trace::{InstructionTrace, TraceFilter, TraceRecorder};
