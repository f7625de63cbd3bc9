//! Loader errors.
//!
//! Every variant carries enough context to point at the offending header
//! field without re-reading the image.

use std::fmt;

use thiserror::Error;

use crate::cpu::bus::BusFault;

/// Which DOL section table an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Text,
    Data,
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SectionKind::Text => "text",
            SectionKind::Data => "data",
        })
    }
}

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("DOL file too small: {size} bytes (minimum 256 bytes)")]
    DolTooSmall { size: usize },

    #[error("{kind} section {index} extends beyond file: offset 0x{offset:X}, size 0x{size:X}, file size 0x{file_size:X}")]
    SectionOutOfBounds {
        kind: SectionKind,
        index: usize,
        offset: u32,
        size: u32,
        file_size: usize,
    },

    #[error("entry point 0x{entry:08X} is not inside any text section")]
    EntryPointInvalid { entry: u32 },

    #[error("disc image too small: {size} bytes")]
    DiscTooSmall { size: usize },

    #[error("disc image size {size} is not a multiple of 32 KiB")]
    InvalidDiscSize { size: usize },

    #[error("invalid disc boot signature {id:?}")]
    InvalidBootSignature { id: String },

    #[error("invalid file system table: {0}")]
    InvalidFst(String),

    #[error("file not found on disc: {0}")]
    FileNotFound(String),

    #[error("guest memory rejected image: {0}")]
    Bus(#[from] BusFault),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
