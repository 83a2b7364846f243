//! A built-in [`ArchiveDecoder`] for ZIP archives.
//!
//! The archive is memory-mapped, its central directory is read once,
//! and entries are decompressed straight out of the mapping.
//! Each stream holds its own reference to the mapping,
//! so it stays readable no matter what happens to the [`ZipArchive`].
//!
//! Stored and DEFLATEd entries are supported.
//! Encrypted entries, other compression methods,
//! and multi-disk archives are not.

use std::fs::File;
use std::io;
use std::sync::Arc;

use camino::Utf8Path;
use flate2::read::DeflateDecoder;
use log::*;
use memmap2::Mmap;

use crate::arch::usize;
use crate::decoder::*;
use crate::result::*;

pub mod spec;

use spec::Extents;

/// Opens ZIP archives.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipDecoder;

impl ArchiveDecoder for ZipDecoder {
    fn scheme(&self) -> &str {
        "zip"
    }

    fn open(
        &self,
        location: &Utf8Path,
        password: Option<&str>,
        volumes: Option<&VolumeCallback>,
    ) -> DecodeResult<Box<dyn ArchiveHandle>> {
        if volumes.is_some() {
            debug!("{location}: ZIP archives are read from a single volume; ignoring volume callback");
        }
        if password.is_some() {
            debug!("{location}: ZIP decryption is unsupported; the password will go unused");
        }
        Ok(Box::new(ZipArchive::open(location)?))
    }
}

/// A central directory entry, plus what we need to find its data again.
#[derive(Debug)]
struct ZipEntry {
    raw: RawEntry,
    method: u16,
    encrypted: bool,
    header_offset: usize,
}

/// An opened ZIP archive
pub struct ZipArchive {
    /// `None` once closed
    mapping: Option<Arc<Mmap>>,
    /// Bytes of unrelated data (a self-extractor stub, say) before the archive proper
    archive_offset: usize,
    entries: Vec<ZipEntry>,
}

impl ZipArchive {
    /// Maps the file at `location` and reads its central directory.
    pub fn open(location: &Utf8Path) -> DecodeResult<Self> {
        let file = File::open(location).map_err(|source| DecodeError::FileOpen {
            location: location.to_owned(),
            source,
        })?;
        // Mapping failures (e.g. empty files) are plain I/O errors.
        // Safety: the mapping is read-only, and we assume nobody
        // truncates the archive out from under us.
        let mapping = unsafe { Mmap::map(&file) }?;

        let (archive_offset, entries) = read_central_directory(&mapping)?;
        if archive_offset != 0 {
            debug!("{location}: archive prepended with {archive_offset} unknown bytes");
        }
        info!("{location}: {} entries", entries.len());

        Ok(Self {
            mapping: Some(Arc::new(mapping)),
            archive_offset,
            entries,
        })
    }

    fn mapping(&self) -> DecodeResult<&Arc<Mmap>> {
        self.mapping
            .as_ref()
            .ok_or_else(|| DecodeError::Other(String::from("archive is closed")))
    }
}

impl ArchiveHandle for ZipArchive {
    fn entries(&self) -> DecodeResult<Vec<RawEntry>> {
        self.mapping()?;
        Ok(self.entries.iter().map(|e| e.raw.clone()).collect())
    }

    fn open_stream(&self, index: usize, _password: Option<&str>) -> DecodeResult<EntryStream> {
        let mapping = self.mapping()?;
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| DecodeError::Other(format!("No entry at index {index}")))?;

        if entry.encrypted {
            return Err(DecodeError::UnsupportedArchive(format!(
                "Can't read encrypted file {}",
                entry.raw.name
            )));
        }

        let header_start = self
            .archive_offset
            .checked_add(entry.header_offset)
            .ok_or(DecodeError::InvalidArchive("Local file header out of bounds"))?;
        let mut file_slice = mapping
            .get(header_start..)
            .ok_or(DecodeError::InvalidArchive("Local file header out of bounds"))?;
        let local_header = spec::LocalFileHeader::parse_and_consume(&mut file_slice)?;
        trace!("{:?}", local_header);
        if cfg!(feature = "check-local-metadata") {
            check_local_header(&local_header, entry)?;
        }

        let data_start = mapping.len() - file_slice.len();
        let data_end = data_start
            .checked_add(usize(entry.raw.compressed_size)?)
            .filter(|end| *end <= mapping.len())
            .ok_or(DecodeError::InvalidArchive("File data runs past the end of the archive"))?;
        debug!("Reading {} ({} bytes compressed)", entry.raw.name, data_end - data_start);

        let data = SharedSlice {
            mapping: Arc::clone(mapping),
            start: data_start,
            end: data_end,
        };
        make_reader(entry.method, io::Cursor::new(data))
    }

    fn close(&mut self) -> DecodeResult<()> {
        // Outstanding streams keep their own reference to the mapping.
        self.mapping.take();
        self.entries.clear();
        Ok(())
    }
}

/// A window into a shared mapping, so streams can outlive the archive.
struct SharedSlice {
    mapping: Arc<Mmap>,
    start: usize,
    end: usize,
}

impl AsRef<[u8]> for SharedSlice {
    fn as_ref(&self) -> &[u8] {
        &self.mapping[self.start..self.end]
    }
}

/// Returns a boxed read trait for a compressed file, given its compression method.
fn make_reader<R: io::Read + Send + 'static>(method: u16, reader: R) -> DecodeResult<EntryStream> {
    match method {
        spec::METHOD_STORED => Ok(Box::new(reader)),
        spec::METHOD_DEFLATE => Ok(Box::new(DeflateDecoder::new(reader))),
        other => Err(DecodeError::UnsupportedArchive(format!(
            "Compression method {other} not supported"
        ))),
    }
}

/// Finds the central directory (accounting for any prepended data)
/// and reads every entry in it.
fn read_central_directory(mapping: &[u8]) -> DecodeResult<(usize, Vec<ZipEntry>)> {
    let eocdr_posit = spec::find_eocdr(mapping)?;
    let eocdr = spec::EndOfCentralDirectory::parse(&mapping[eocdr_posit..])?;
    trace!("{:?}", eocdr);

    if eocdr.disk_number != eocdr.disk_with_central_directory
        || eocdr.entries != eocdr.entries_on_this_disk
    {
        return Err(DecodeError::UnsupportedArchive(format!(
            "No support for multi-disk archives: disk {} of {}, {} of {} entries on this disk",
            eocdr.disk_number,
            eocdr.disk_with_central_directory,
            eocdr.entries_on_this_disk,
            eocdr.entries
        )));
    }

    let archive_offset;
    let central_directory_offset;
    let entry_count: u64;

    let zip64_locator = eocdr_posit
        .checked_sub(spec::Zip64EndOfCentralDirectoryLocator::SIZE_IN_FILE)
        .and_then(|posit| spec::Zip64EndOfCentralDirectoryLocator::parse(&mapping[posit..]));

    if let Some(locator) = zip64_locator {
        trace!("{:?}", locator);
        if locator.disks != 1 {
            return Err(DecodeError::UnsupportedArchive(format!(
                "No support for multi-disk archives: Zip64 locator reports {} disks",
                locator.disks
            )));
        }

        let search_start = usize(locator.zip64_eocdr_offset)?;
        let search_end = eocdr_posit - spec::Zip64EndOfCentralDirectoryLocator::SIZE_IN_FILE;
        let search_space = mapping
            .get(search_start..search_end)
            .ok_or(DecodeError::InvalidArchive("Invalid Zip64 End Of Central Directory offset"))?;
        // Since we search from the nominal position,
        // the distance we had to go is the archive's offset.
        archive_offset = spec::find_zip64_eocdr(search_space)?;
        let zip64_eocdr = spec::Zip64EndOfCentralDirectory::parse(&search_space[archive_offset..])?;
        trace!("{:?}", zip64_eocdr);

        if zip64_eocdr.disk_number != zip64_eocdr.disk_with_central_directory
            || zip64_eocdr.entries != zip64_eocdr.entries_on_this_disk
        {
            return Err(DecodeError::UnsupportedArchive(String::from(
                "No support for multi-disk Zip64 archives",
            )));
        }
        central_directory_offset = usize(zip64_eocdr.central_directory_offset)?;
        entry_count = zip64_eocdr.entries;
    } else {
        // The offset is the actual position of the central directory versus the stored one.
        let nominal_offset = usize(eocdr.central_directory_offset)?;
        archive_offset = eocdr_posit
            .checked_sub(usize(eocdr.central_directory_size)?)
            .and_then(|actual| actual.checked_sub(nominal_offset))
            .ok_or(DecodeError::InvalidArchive(
                "Invalid central directory size or offset",
            ))?;
        central_directory_offset = nominal_offset;
        entry_count = eocdr.entries as u64;
    }

    trace!("{entry_count} entries at nominal offset {central_directory_offset}");
    let mut central_directory = archive_offset
        .checked_add(central_directory_offset)
        .and_then(|start| mapping.get(start..))
        .ok_or(DecodeError::InvalidArchive("Central directory out of bounds"))?;

    // Don't trust the count for the allocation; every record is at least 46 bytes.
    let mut entries = Vec::with_capacity(usize(entry_count)?.min(central_directory.len() / 46));
    for position in 0..usize(entry_count)? {
        let cde = spec::CentralDirectoryEntry::parse_and_consume(&mut central_directory)?;
        trace!("{:?}", cde);
        let entry = entry_from_cde(&cde, position)?;
        debug!("{:?}", entry);
        entries.push(entry);
    }
    Ok((archive_offset, entries))
}

fn entry_from_cde(cde: &spec::CentralDirectoryEntry, position: usize) -> DecodeResult<ZipEntry> {
    let name = spec::decode_name(cde.path, cde.flags)?;

    if cde.disk_number != 0 {
        return Err(DecodeError::UnsupportedArchive(format!(
            "No support for multi-disk archives: file {name} claims to be on disk {}",
            cde.disk_number,
        )));
    }

    let mut extents = Extents {
        size: cde.uncompressed_size as u64,
        compressed_size: cde.compressed_size as u64,
        header_offset: cde.header_offset as u64,
    };
    spec::parse_extra_field(&mut extents, cde.extra_field)?;

    let raw = RawEntry {
        is_dir: name.ends_with('/'),
        name,
        size: extents.size,
        compressed_size: extents.compressed_size,
        method: cde.compression_method as u32,
        crc32: cde.crc32,
        modified: spec::parse_msdos(cde.last_modified_time, cde.last_modified_date),
        position: Some(position),
    };

    Ok(ZipEntry {
        raw,
        method: cde.compression_method,
        encrypted: spec::is_encrypted(cde.flags),
        header_offset: usize(extents.header_offset)?,
    })
}

/// Makes sure the local file header agrees with the central directory.
///
/// Archivers that stream their output put sizes and the CRC in a trailing
/// data descriptor instead, so those are only compared when present.
fn check_local_header(local: &spec::LocalFileHeader, entry: &ZipEntry) -> DecodeResult<()> {
    let mismatch = || {
        DecodeError::InvalidArchive("Central directory entry doesn't match local file header")
    };

    if spec::decode_name(local.path, local.flags)? != entry.raw.name
        || local.compression_method != entry.method
    {
        return Err(mismatch());
    }

    if !spec::has_data_descriptor(local.flags) {
        let mut extents = Extents {
            size: local.uncompressed_size as u64,
            compressed_size: local.compressed_size as u64,
            header_offset: 0,
        };
        spec::parse_extra_field(&mut extents, local.extra_field)?;
        if local.crc32 != entry.raw.crc32
            || extents.size != entry.raw.size
            || extents.compressed_size != entry.raw.compressed_size
        {
            return Err(mismatch());
        }
    }
    Ok(())
}
