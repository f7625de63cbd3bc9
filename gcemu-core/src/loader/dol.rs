//! DOL Executable Loader
//!
//! The DOL format is the GameCube's native executable: a fixed 0x100-byte
//! big-endian header followed by raw section bytes.
//!
//! # Header Layout
//! | Offset | Contents                     |
//! |--------|------------------------------|
//! | 0x00   | 7 text section file offsets  |
//! | 0x1C   | 11 data section file offsets |
//! | 0x48   | 7 text load addresses        |
//! | 0x64   | 11 data load addresses       |
//! | 0x90   | 7 text sizes                 |
//! | 0xAC   | 11 data sizes                |
//! | 0xD8   | BSS address                  |
//! | 0xDC   | BSS size                     |
//! | 0xE0   | Entry point                  |
//!
//! A section with a zero size is unused. A non-zero size with a zero offset
//! is rejected, since offset 0 points into the header.

use std::path::Path;

use crate::cpu::bus::MemoryBus;
use crate::loader::error::{LoaderError, SectionKind};

const HEADER_SIZE: usize = 0x100;
const NUM_TEXT_SECTIONS: usize = 7;
const NUM_DATA_SECTIONS: usize = 11;

const TEXT_OFFSETS: usize = 0x00;
const DATA_OFFSETS: usize = 0x1C;
const TEXT_ADDRESSES: usize = 0x48;
const DATA_ADDRESSES: usize = 0x64;
const TEXT_SIZES: usize = 0x90;
const DATA_SIZES: usize = 0xAC;
const BSS_ADDRESS: usize = 0xD8;
const BSS_SIZE: usize = 0xDC;
const ENTRY_POINT: usize = 0xE0;

/// Chunk used when zero-filling the BSS through the bus.
const ZERO_CHUNK: usize = 0x1000;

/// One loaded text or data section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DolSection {
    pub kind: SectionKind,
    /// Slot in the header table (0-6 for text, 0-10 for data)
    pub index: usize,
    /// Offset of the section bytes in the file
    pub offset: u32,
    /// Load address in guest memory
    pub address: u32,
    pub data: Vec<u8>,
}

impl DolSection {
    #[inline]
    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    /// Whether `address` falls inside this section once loaded.
    #[inline]
    pub fn contains(&self, address: u32) -> bool {
        address
            .checked_sub(self.address)
            .is_some_and(|offset| offset < self.size())
    }
}

/// A parsed DOL executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DolImage {
    pub text_sections: Vec<DolSection>,
    pub data_sections: Vec<DolSection>,
    pub bss_address: u32,
    pub bss_size: u32,
    pub entry_point: u32,
}

impl DolImage {
    /// Parse a DOL from its bytes. Trailing bytes after the last section are
    /// ignored, so a slice running to the end of a disc image works too.
    pub fn parse(data: &[u8]) -> Result<Self, LoaderError> {
        if data.len() < HEADER_SIZE {
            return Err(LoaderError::DolTooSmall { size: data.len() });
        }

        let text_sections = read_sections::<NUM_TEXT_SECTIONS>(
            data,
            SectionKind::Text,
            TEXT_OFFSETS,
            TEXT_ADDRESSES,
            TEXT_SIZES,
        )?;
        let data_sections = read_sections::<NUM_DATA_SECTIONS>(
            data,
            SectionKind::Data,
            DATA_OFFSETS,
            DATA_ADDRESSES,
            DATA_SIZES,
        )?;

        let image = Self {
            text_sections,
            data_sections,
            bss_address: read_u32_be(data, BSS_ADDRESS),
            bss_size: read_u32_be(data, BSS_SIZE),
            entry_point: read_u32_be(data, ENTRY_POINT),
        };
        log::debug!(
            "DOL: {} text / {} data sections, BSS 0x{:08X}+0x{:X}, entry 0x{:08X}",
            image.text_sections.len(),
            image.data_sections.len(),
            image.bss_address,
            image.bss_size,
            image.entry_point
        );
        Ok(image)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoaderError> {
        let path = path.as_ref();
        log::info!("Loading DOL from {}", path.display());
        let data = std::fs::read(path)?;
        Self::parse(&data)
    }

    /// Check that the entry point lies inside a text section.
    pub fn validate(&self) -> Result<(), LoaderError> {
        if self.text_sections.iter().any(|s| s.contains(self.entry_point)) {
            Ok(())
        } else {
            Err(LoaderError::EntryPointInvalid {
                entry: self.entry_point,
            })
        }
    }

    /// Text sections followed by data sections.
    pub fn sections(&self) -> impl Iterator<Item = &DolSection> {
        self.text_sections.iter().chain(self.data_sections.iter())
    }

    /// Total bytes of section payload.
    pub fn payload_size(&self) -> usize {
        self.sections().map(|s| s.data.len()).sum()
    }

    /// Zero-fill the BSS, then copy every section into guest memory.
    /// Returns the entry point.
    ///
    /// Small-data sections usually sit inside the BSS range, so the BSS is
    /// cleared before the sections land on top of it.
    pub fn load_into(&self, bus: &mut dyn MemoryBus) -> Result<u32, LoaderError> {
        let zeros = [0u8; ZERO_CHUNK];
        let mut address = self.bss_address;
        let mut remaining = self.bss_size as usize;
        while remaining > 0 {
            let len = remaining.min(ZERO_CHUNK);
            bus.write(address, &zeros[..len])?;
            address = address.wrapping_add(len as u32);
            remaining -= len;
        }

        for section in self.sections() {
            log::trace!(
                "{} section {} -> 0x{:08X} (0x{:X} bytes)",
                section.kind,
                section.index,
                section.address,
                section.data.len()
            );
            bus.write(section.address, &section.data)?;
        }
        Ok(self.entry_point)
    }
}

fn read_sections<const N: usize>(
    data: &[u8],
    kind: SectionKind,
    offsets: usize,
    addresses: usize,
    sizes: usize,
) -> Result<Vec<DolSection>, LoaderError> {
    let mut sections = Vec::with_capacity(N);
    for index in 0..N {
        let offset = read_u32_be(data, offsets + index * 4);
        let size = read_u32_be(data, sizes + index * 4);
        if size == 0 {
            continue;
        }
        // A sized section must have file bytes behind it; offset 0 is the header.
        let start = offset as usize;
        let end = start
            .checked_add(size as usize)
            .filter(|&end| offset != 0 && end <= data.len())
            .ok_or(LoaderError::SectionOutOfBounds {
                kind,
                index,
                offset,
                size,
                file_size: data.len(),
            })?;
        sections.push(DolSection {
            kind,
            index,
            offset,
            address: read_u32_be(data, addresses + index * 4),
            data: data[start..end].to_vec(),
        });
    }
    Ok(sections)
}

/// Caller guarantees `offset + 4 <= data.len()`.
#[inline]
pub(crate) fn read_u32_be(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}
