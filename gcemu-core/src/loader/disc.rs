//! GameCube Disc Images
//!
//! Reads raw (`.iso` / `.gcm`) disc images: the boot header, the boot DOL and
//! the File System Table (FST).
//!
//! # FST Layout
//! The FST offset and size live at disc offsets 0x424 and 0x428. Each entry
//! is 12 bytes:
//! - Byte 0: flags (0 = file, 1 = directory)
//! - Bytes 1-3: name offset into the string table (24-bit)
//! - Bytes 4-7: file data offset, or parent index for directories
//! - Bytes 8-11: file size, or one past the last child index for directories
//!
//! Entry 0 is the root directory; its size field is the total entry count.
//! The string table follows the last entry.

use std::path::Path;

use crate::loader::dol::{read_u32_be, DolImage};
use crate::loader::error::LoaderError;

const SECTOR_SIZE: usize = 0x8000;
const GAME_ID_LEN: usize = 6;
const BOOT_DOL_OFFSET: usize = 0x420;
const FST_OFFSET: usize = 0x424;
const FST_SIZE: usize = 0x428;
/// Smallest image that still holds the FST pointers.
const MIN_DISC_SIZE: usize = 0x440;
const FST_ENTRY_SIZE: usize = 12;

/// A file in the disc file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscFile {
    /// Full path without a leading slash, e.g. `sys/main.dol`
    pub path: String,
    pub offset: u32,
    pub size: u32,
}

impl DiscFile {
    /// Whether `components` equal the trailing components of this path.
    fn matches_suffix(&self, components: &[&str]) -> bool {
        let own: Vec<&str> = self.path.split('/').collect();
        own.len() >= components.len() && own[own.len() - components.len()..] == *components
    }
}

/// A validated disc image held in memory.
#[derive(Debug, Clone)]
pub struct DiscImage {
    data: Vec<u8>,
}

impl DiscImage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoaderError> {
        let path = path.as_ref();
        log::info!("Opening disc image {}", path.display());
        Self::from_bytes(std::fs::read(path)?)
    }

    /// Validate and take ownership of an image.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, LoaderError> {
        let image = Self { data };
        image.validate()?;
        log::info!("Game ID: {}", image.game_id());
        Ok(image)
    }

    fn validate(&self) -> Result<(), LoaderError> {
        let size = self.data.len();
        if size < MIN_DISC_SIZE {
            return Err(LoaderError::DiscTooSmall { size });
        }
        if size % SECTOR_SIZE != 0 {
            return Err(LoaderError::InvalidDiscSize { size });
        }
        let id = &self.data[..GAME_ID_LEN];
        let printable = id.iter().all(|b| (0x20..=0x7E).contains(b));
        if !matches!(id[0], b'G' | b'D') || !printable {
            return Err(LoaderError::InvalidBootSignature {
                id: String::from_utf8_lossy(id).into_owned(),
            });
        }
        Ok(())
    }

    /// The six-character game ID (system, game code, region, maker).
    pub fn game_id(&self) -> &str {
        // Validated as printable ASCII on construction.
        std::str::from_utf8(&self.data[..GAME_ID_LEN]).unwrap_or_default()
    }

    /// Game title from the boot header.
    pub fn title(&self) -> String {
        let raw = &self.data[0x20..0x400];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Parse the executable the boot header points at.
    pub fn boot_dol(&self) -> Result<DolImage, LoaderError> {
        let offset = read_u32_be(&self.data, BOOT_DOL_OFFSET) as usize;
        log::debug!("Boot DOL at disc offset 0x{offset:X}");
        let tail = self.data.get(offset..).unwrap_or_default();
        DolImage::parse(tail)
    }

    /// Every file in the FST, in table order.
    pub fn files(&self) -> Result<Vec<DiscFile>, LoaderError> {
        let fst_offset = read_u32_be(&self.data, FST_OFFSET) as usize;
        let fst_size = read_u32_be(&self.data, FST_SIZE) as usize;
        log::debug!("FST at 0x{fst_offset:X}, 0x{fst_size:X} bytes");

        let fst = fst_offset
            .checked_add(fst_size)
            .and_then(|end| self.data.get(fst_offset..end))
            .ok_or_else(|| LoaderError::InvalidFst(format!("table 0x{fst_offset:X}+0x{fst_size:X} outside image")))?;
        if fst.len() < FST_ENTRY_SIZE {
            return Err(LoaderError::InvalidFst("missing root entry".into()));
        }

        let entry_count = read_u32_be(fst, 8) as usize;
        let strings_start = entry_count
            .checked_mul(FST_ENTRY_SIZE)
            .filter(|&len| entry_count > 0 && len <= fst.len())
            .ok_or_else(|| LoaderError::InvalidFst(format!("entry count {entry_count} does not fit")))?;
        let strings = &fst[strings_start..];

        let name_at = |name_offset: usize| -> Result<String, LoaderError> {
            let raw = strings
                .get(name_offset..)
                .ok_or_else(|| LoaderError::InvalidFst(format!("name offset 0x{name_offset:X} outside string table")))?;
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
        };

        let mut files = Vec::new();
        // (directory name, one past its last child)
        let mut dirs: Vec<(String, usize)> = Vec::new();
        for index in 1..entry_count {
            let entry = &fst[index * FST_ENTRY_SIZE..(index + 1) * FST_ENTRY_SIZE];
            let flags = entry[0];
            let name_offset = (read_u32_be(entry, 0) & 0x00FF_FFFF) as usize;
            let offset_or_parent = read_u32_be(entry, 4);
            let size_or_next = read_u32_be(entry, 8);

            while dirs.last().is_some_and(|&(_, end)| index >= end) {
                dirs.pop();
            }

            let name = name_at(name_offset)?;
            if flags & 1 != 0 {
                dirs.push((name, size_or_next as usize));
                continue;
            }

            let mut path = String::new();
            for (dir, _) in &dirs {
                path.push_str(dir);
                path.push('/');
            }
            path.push_str(&name);
            files.push(DiscFile {
                path,
                offset: offset_or_parent,
                size: size_or_next,
            });
        }
        Ok(files)
    }

    /// Locate a file by name or path and return its bytes.
    ///
    /// `main.dol`, `sys/main.dol` and `/sys/main.dol` all match the file
    /// `sys/main.dol`: the requested components must equal the trailing
    /// components of the full path.
    pub fn extract(&self, path: &str) -> Result<Vec<u8>, LoaderError> {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        if components.is_empty() {
            return Err(LoaderError::FileNotFound(path.to_string()));
        }

        let file = self
            .files()?
            .into_iter()
            .find(|file| file.matches_suffix(&components))
            .ok_or_else(|| LoaderError::FileNotFound(path.to_string()))?;

        let start = file.offset as usize;
        let bytes = start
            .checked_add(file.size as usize)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| LoaderError::InvalidFst(format!("{} extends past end of image", file.path)))?;
        log::debug!("Extracted {} (0x{:X} bytes at 0x{:X})", file.path, file.size, file.offset);
        Ok(bytes.to_vec())
    }
}
