//! GameCube (Gekko / PowerPC 750CL) interpreter core.
//!
//! - [`cpu`]: architectural state and instruction execution. Logger-free and
//!   infallible: every outcome is a value.
//! - [`runtime`]: a RAM-backed [`MemoryBus`](cpu::MemoryBus) and an
//!   instruction trace recorder.
//! - [`loader`]: DOL executables and disc images.

pub mod cpu;
pub mod loader;
pub mod runtime;
