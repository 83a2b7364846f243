//! The seam between a [`Session`](crate::Session) and whatever actually
//! understands an archive format.
//!
//! A decoder opens an archive, hands back its entries in enumeration order,
//! and produces decompressed byte streams for them on request.
//! It never needs to know about directories, prefixes, or checksum policy;
//! the session layers all of that on top of a flat list of names.

use std::fmt;
use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;

use crate::result::*;

/// Asked for the next volume of a multi-volume archive.
///
/// Given the volume that couldn't be found, returns where to look instead,
/// or `None` to give up.
pub type VolumeCallback = Arc<dyn Fn(&Utf8Path) -> Option<Utf8PathBuf> + Send + Sync>;

/// A decompressed byte source for a single entry.
///
/// Streams are independent of the handle that made them.
pub type EntryStream = Box<dyn io::Read + Send>;

/// A single record inside an archive, as the decoder reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Archive-root-relative path, separated by forward slashes
    pub name: String,

    pub is_dir: bool,

    /// Uncompressed size in bytes
    pub size: u64,

    /// Compressed size in bytes
    pub compressed_size: u64,

    /// Format-specific compression method identifier
    pub method: u32,

    /// The CRC-32 of the decompressed contents
    pub crc32: u32,

    /// Last modification time, if the archive stores a valid one
    pub modified: Option<NaiveDateTime>,

    /// The entry's own position in the archive, if the decoder knows it
    pub position: Option<usize>,
}

/// An opened archive.
pub trait ArchiveHandle {
    /// Returns every entry, in the archive's enumeration order.
    fn entries(&self) -> DecodeResult<Vec<RawEntry>>;

    /// Opens a decompressing stream for the entry at `index`
    /// (its position in [`entries()`](ArchiveHandle::entries)).
    fn open_stream(&self, index: usize, password: Option<&str>) -> DecodeResult<EntryStream>;

    /// Releases the archive.
    fn close(&mut self) -> DecodeResult<()>;
}

/// Something that knows how to open archives of some format.
pub trait ArchiveDecoder {
    /// Checks that the decoder can actually be used.
    ///
    /// Called once when a session is built, before any archive I/O.
    fn check_available(&self) -> Result<(), String> {
        Ok(())
    }

    /// The URL scheme used when composing resource locators for entries.
    fn scheme(&self) -> &str;

    fn open(
        &self,
        location: &Utf8Path,
        password: Option<&str>,
        volumes: Option<&VolumeCallback>,
    ) -> DecodeResult<Box<dyn ArchiveHandle>>;
}

impl fmt::Debug for dyn ArchiveDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArchiveDecoder({})", self.scheme())
    }
}
