//! Program loaders: DOL executables and GameCube disc images.

pub mod disc;
pub mod dol;
pub mod error;

pub use disc::{DiscFile, DiscImage};
pub use dol::{DolImage, DolSection};
pub use error::{LoaderError, SectionKind};
