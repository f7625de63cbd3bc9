//! Memory bus contract consumed by the interpreter.
//!
//! The bus owns every decision about what backs a guest address. The CPU only
//! sees success or a [`BusFault`]. Values cross the bus as raw bytes in guest
//! (big-endian) order; turning them into integers is the engine's job.

use std::fmt;
use thiserror::Error;

/// Which kind of access the bus rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Fetch,
    Load,
    Store,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessKind::Fetch => "fetch",
            AccessKind::Load => "load",
            AccessKind::Store => "store",
        })
    }
}

/// Why an access failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultCause {
    /// Nothing is mapped at (part of) the range.
    Unmapped,
    /// The access needs natural alignment and did not have it.
    Misaligned,
}

/// A rejected bus access.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{kind} fault at 0x{address:08X} ({cause:?})")]
pub struct BusFault {
    pub address: u32,
    pub kind: AccessKind,
    pub cause: FaultCause,
}

impl BusFault {
    #[cold]
    pub fn unmapped(address: u32, kind: AccessKind) -> Self {
        Self {
            address,
            kind,
            cause: FaultCause::Unmapped,
        }
    }

    #[cold]
    pub fn misaligned(address: u32, kind: AccessKind) -> Self {
        Self {
            address,
            kind,
            cause: FaultCause::Misaligned,
        }
    }
}

/// Byte-addressable, big-endian guest address space.
///
/// The engine issues one `read`/`write` per architectural element with a
/// buffer of 1, 2, 4 or 8 bytes. Loaders may use larger buffers.
pub trait MemoryBus {
    /// Copy `buf.len()` bytes starting at `address` into `buf`.
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), BusFault>;

    /// Copy `data` into guest memory starting at `address`.
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), BusFault>;

    /// Fetch one instruction word. Instruction fetch must be word aligned.
    fn fetch32(&mut self, address: u32) -> Result<u32, BusFault> {
        if address & 3 != 0 {
            return Err(BusFault::misaligned(address, AccessKind::Fetch));
        }
        let mut word = [0u8; 4];
        self.read(address, &mut word).map_err(|fault| BusFault {
            kind: AccessKind::Fetch,
            ..fault
        })?;
        Ok(u32::from_be_bytes(word))
    }
}

impl<B: MemoryBus + ?Sized> MemoryBus for &mut B {
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), BusFault> {
        (**self).read(address, buf)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), BusFault> {
        (**self).write(address, data)
    }

    fn fetch32(&mut self, address: u32) -> Result<u32, BusFault> {
        (**self).fetch32(address)
    }
}

impl<B: MemoryBus + ?Sized> MemoryBus for Box<B> {
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), BusFault> {
        (**self).read(address, buf)
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), BusFault> {
        (**self).write(address, data)
    }

    fn fetch32(&mut self, address: u32) -> Result<u32, BusFault> {
        (**self).fetch32(address)
    }
}

/// Typed big-endian accessors on top of the byte contract.
///
/// Blanket-implemented for every bus (including `dyn MemoryBus`), so handlers
/// never touch host byte order.
pub trait BusExt: MemoryBus {
    fn read_u8(&mut self, address: u32) -> Result<u8, BusFault> {
        let mut b = [0u8; 1];
        self.read(address, &mut b)?;
        Ok(b[0])
    }

    fn read_u16(&mut self, address: u32) -> Result<u16, BusFault> {
        let mut b = [0u8; 2];
        self.read(address, &mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    fn read_u32(&mut self, address: u32) -> Result<u32, BusFault> {
        let mut b = [0u8; 4];
        self.read(address, &mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    fn read_u64(&mut self, address: u32) -> Result<u64, BusFault> {
        let mut b = [0u8; 8];
        self.read(address, &mut b)?;
        Ok(u64::from_be_bytes(b))
    }

    fn write_u8(&mut self, address: u32, value: u8) -> Result<(), BusFault> {
        self.write(address, &[value])
    }

    fn write_u16(&mut self, address: u32, value: u16) -> Result<(), BusFault> {
        self.write(address, &value.to_be_bytes())
    }

    fn write_u32(&mut self, address: u32, value: u32) -> Result<(), BusFault> {
        self.write(address, &value.to_be_bytes())
    }

    fn write_u64(&mut self, address: u32, value: u64) -> Result<(), BusFault> {
        self.write(address, &value.to_be_bytes())
    }
}

impl<B: MemoryBus + ?Sized> BusExt for B {}
