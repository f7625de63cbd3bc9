//! Main RAM Bus
//!
//! A contiguous, zero-initialised byte array mapped at a base address. The
//! GameCube default is 24 MiB of main RAM at `0x8000_0000` (cached window),
//! optionally mirrored at `0xC000_0000` (uncached window). Every other
//! address is unmapped and faults.
//!
//! # Address Translation
//! An access is accepted only if the whole range `[address, address + len)`
//! falls inside one window. Accesses that straddle the end of RAM fault at
//! their start address.

use crate::cpu::bus::{AccessKind, BusFault, MemoryBus};

/// Cached window of GameCube main RAM.
pub const MAIN_RAM_BASE: u32 = 0x8000_0000;
/// GameCube main RAM size (24 MiB).
pub const MAIN_RAM_SIZE: usize = 24 * 1024 * 1024;
/// Distance from the cached window to the uncached one.
const UNCACHED_OFFSET: u32 = 0x4000_0000;

#[derive(Debug, Clone)]
pub struct Ram {
    base: u32,
    mirror: Option<u32>,
    data: Vec<u8>,
}

impl Ram {
    /// GameCube main RAM with the uncached mirror enabled.
    pub fn new() -> Self {
        Self::with_layout(MAIN_RAM_BASE, MAIN_RAM_SIZE, true)
    }

    /// `size` bytes at `base`. With `mirror_uncached` the same bytes also
    /// appear at `base + 0x4000_0000`.
    pub fn with_layout(base: u32, size: usize, mirror_uncached: bool) -> Self {
        let mirror = mirror_uncached.then(|| base.wrapping_add(UNCACHED_OFFSET));
        log::debug!(
            "RAM: {} KiB at 0x{:08X}{}",
            size / 1024,
            base,
            match mirror {
                Some(mirror) => format!(", mirrored at 0x{mirror:08X}"),
                None => String::new(),
            }
        );
        Self {
            base,
            mirror,
            data: vec![0u8; size],
        }
    }

    #[inline]
    pub fn base(&self) -> u32 {
        self.base
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Copy a block into RAM, e.g. a program image. Same bounds rules as the
    /// bus interface.
    pub fn load(&mut self, address: u32, bytes: &[u8]) -> Result<(), BusFault> {
        let offset = self.translate(address, bytes.len(), AccessKind::Store)?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Borrow `len` bytes starting at `address`, if mapped.
    pub fn slice(&self, address: u32, len: usize) -> Option<&[u8]> {
        let offset = self.translate(address, len, AccessKind::Load).ok()?;
        Some(&self.data[offset..offset + len])
    }

    /// Zero every byte.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    #[inline]
    fn translate(&self, address: u32, len: usize, kind: AccessKind) -> Result<usize, BusFault> {
        let size = self.data.len() as u64;
        let fits = |window: u32| {
            let offset = u64::from(address.wrapping_sub(window));
            (offset + len as u64 <= size).then_some(offset as usize)
        };
        fits(self.base)
            .or_else(|| self.mirror.and_then(fits))
            .ok_or_else(|| BusFault::unmapped(address, kind))
    }
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus for Ram {
    #[inline]
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), BusFault> {
        let offset = self.translate(address, buf.len(), AccessKind::Load)?;
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        Ok(())
    }

    #[inline]
    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), BusFault> {
        let offset = self.translate(address, data.len(), AccessKind::Store)?;
        self.data[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}
