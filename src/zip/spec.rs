//! Structures of the ZIP file format, as laid out in [`APPNOTE.TXT`].
//!
//! The nitty gritty lives here; the [parent module](super) turns it into
//! [`RawEntry`](crate::decoder::RawEntry) values and streams.
//!
//! [`APPNOTE.TXT`]: https://pkware.cachefly.net/webdocs/APPNOTE/APPNOTE-6.3.6.TXT

use std::borrow::Cow;
use std::convert::TryInto;

use chrono::{NaiveDate, NaiveDateTime};
use codepage_437::*;
use memchr::memmem;

use crate::arch::usize;
use crate::result::*;

/// End of central directory magic number
const EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 5, 6];
/// Zip64 end of central directory magic number
const ZIP64_EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 6, 6];
/// Zip64 end of central directory locator magic number
const ZIP64_EOCDR_LOCATOR_MAGIC: [u8; 4] = [b'P', b'K', 6, 7];
/// Central directory magic number
const CENTRAL_DIRECTORY_MAGIC: [u8; 4] = [b'P', b'K', 1, 2];
/// Local file header magic number
const LOCAL_FILE_HEADER_MAGIC: [u8; 4] = [b'P', b'K', 3, 4];

/// Stored (no compression)
pub const METHOD_STORED: u16 = 0;
/// DEFLATE
pub const METHOD_DEFLATE: u16 = 8;

/// Little-endian fields read off the front of a slice.
///
/// Every read is bounds-checked; running off the end of a record
/// means the archive is truncated or lying about its sizes.
struct Fields<'a> {
    input: &'a [u8],
    what: &'static str,
}

impl<'a> Fields<'a> {
    fn new(input: &'a [u8], what: &'static str) -> Self {
        Self { input, what }
    }

    fn bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        if self.input.len() < len {
            return Err(DecodeError::InvalidArchive(self.what));
        }
        let (taken, rest) = self.input.split_at(len);
        self.input = rest;
        Ok(taken)
    }

    fn magic(&mut self, magic: &[u8; 4]) -> DecodeResult<()> {
        if self.bytes(4)? != magic {
            return Err(DecodeError::InvalidArchive(self.what));
        }
        Ok(())
    }

    fn u16(&mut self) -> DecodeResult<u16> {
        let raw = self.bytes(2)?;
        Ok(u16::from_le_bytes(raw.try_into().map_err(|_| DecodeError::InvalidArchive(self.what))?))
    }

    fn u32(&mut self) -> DecodeResult<u32> {
        let raw = self.bytes(4)?;
        Ok(u32::from_le_bytes(raw.try_into().map_err(|_| DecodeError::InvalidArchive(self.what))?))
    }

    fn u64(&mut self) -> DecodeResult<u64> {
        let raw = self.bytes(8)?;
        Ok(u64::from_le_bytes(raw.try_into().map_err(|_| DecodeError::InvalidArchive(self.what))?))
    }

    fn remaining(&self) -> &'a [u8] {
        self.input
    }
}

/// End of central directory record (4.3.16)
///
/// Sits at the back of the archive and says where the central directory is.
#[derive(Debug)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub entries_on_this_disk: u16,
    pub entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
}

impl EndOfCentralDirectory {
    pub fn parse(eocdr: &[u8]) -> DecodeResult<Self> {
        let mut fields = Fields::new(eocdr, "Truncated End Of Central Directory Record");
        fields.magic(&EOCDR_MAGIC)?;
        Ok(Self {
            disk_number: fields.u16()?,
            disk_with_central_directory: fields.u16()?,
            entries_on_this_disk: fields.u16()?,
            entries: fields.u16()?,
            central_directory_size: fields.u32()?,
            central_directory_offset: fields.u32()?,
        })
    }
}

/// Searches backward through `mapping` for the End of central directory record.
///
/// Its trailing comment has a variable size, so there's no fixed offset to jump to.
pub fn find_eocdr(mapping: &[u8]) -> DecodeResult<usize> {
    memmem::rfind(mapping, &EOCDR_MAGIC).ok_or(DecodeError::InvalidArchive(
        "Couldn't find End Of Central Directory Record",
    ))
}

/// Zip64 end of central directory locator (4.3.15)
///
/// Immediately precedes the End of central directory record in Zip64 archives.
#[derive(Debug)]
pub struct Zip64EndOfCentralDirectoryLocator {
    pub disk_with_central_directory: u32,
    pub zip64_eocdr_offset: u64,
    pub disks: u32,
}

impl Zip64EndOfCentralDirectoryLocator {
    pub const SIZE_IN_FILE: usize = 20;

    /// Returns `None` if there's no locator here (i.e., not a Zip64 archive).
    pub fn parse(mapping: &[u8]) -> Option<Self> {
        let mut fields = Fields::new(mapping, "Truncated Zip64 locator");
        fields.magic(&ZIP64_EOCDR_LOCATOR_MAGIC).ok()?;
        Some(Self {
            disk_with_central_directory: fields.u32().ok()?,
            zip64_eocdr_offset: fields.u64().ok()?,
            disks: fields.u32().ok()?,
        })
    }
}

/// Zip64 end of central directory record (4.3.14)
#[derive(Debug)]
pub struct Zip64EndOfCentralDirectory {
    pub disk_number: u32,
    pub disk_with_central_directory: u32,
    pub entries_on_this_disk: u64,
    pub entries: u64,
    pub central_directory_size: u64,
    pub central_directory_offset: u64,
}

impl Zip64EndOfCentralDirectory {
    pub fn parse(eocdr: &[u8]) -> DecodeResult<Self> {
        let mut fields = Fields::new(eocdr, "Truncated Zip64 End Of Central Directory Record");
        fields.magic(&ZIP64_EOCDR_MAGIC)?;
        let _record_size = fields.u64()?;
        let _source_version = fields.u16()?;
        let _minimum_extract_version = fields.u16()?;
        Ok(Self {
            disk_number: fields.u32()?,
            disk_with_central_directory: fields.u32()?,
            entries_on_this_disk: fields.u64()?,
            entries: fields.u64()?,
            central_directory_size: fields.u64()?,
            central_directory_offset: fields.u64()?,
        })
    }
}

/// Finds the Zip64 EOCDR, searching forward from its nominal location
/// since the archive might have junk prepended.
pub fn find_zip64_eocdr(mapping: &[u8]) -> DecodeResult<usize> {
    memmem::find(mapping, &ZIP64_EOCDR_MAGIC).ok_or(DecodeError::InvalidArchive(
        "Couldn't find zip64 End Of Central Directory Record",
    ))
}

/// Central directory file header (4.3.12)
#[derive(Debug)]
pub struct CentralDirectoryEntry<'a> {
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number: u16,
    pub header_offset: u32,
    pub path: &'a [u8],
    pub extra_field: &'a [u8],
}

impl<'a> CentralDirectoryEntry<'a> {
    pub fn parse_and_consume(entry: &mut &'a [u8]) -> DecodeResult<Self> {
        let mut fields = Fields::new(*entry, "Invalid central directory entry");
        fields.magic(&CENTRAL_DIRECTORY_MAGIC)?;
        let _source_version = fields.u16()?;
        let _minimum_extract_version = fields.u16()?;
        let flags = fields.u16()?;
        let compression_method = fields.u16()?;
        let last_modified_time = fields.u16()?;
        let last_modified_date = fields.u16()?;
        let crc32 = fields.u32()?;
        let compressed_size = fields.u32()?;
        let uncompressed_size = fields.u32()?;
        let path_length = usize(fields.u16()?)?;
        let extra_field_length = usize(fields.u16()?)?;
        let file_comment_length = usize(fields.u16()?)?;
        let disk_number = fields.u16()?;
        let _internal_file_attributes = fields.u16()?;
        let _external_file_attributes = fields.u32()?;
        let header_offset = fields.u32()?;
        let path = fields.bytes(path_length)?;
        let extra_field = fields.bytes(extra_field_length)?;
        let _file_comment = fields.bytes(file_comment_length)?;
        *entry = fields.remaining();

        Ok(Self {
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number,
            header_offset,
            path,
            extra_field,
        })
    }
}

/// Local file header (4.3.7), which precedes each file's data.
#[derive(Debug)]
pub struct LocalFileHeader<'a> {
    pub flags: u16,
    pub compression_method: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub path: &'a [u8],
    pub extra_field: &'a [u8],
}

impl<'a> LocalFileHeader<'a> {
    pub fn parse_and_consume(header: &mut &'a [u8]) -> DecodeResult<Self> {
        let mut fields = Fields::new(*header, "Invalid local file header");
        fields.magic(&LOCAL_FILE_HEADER_MAGIC)?;
        let _minimum_extract_version = fields.u16()?;
        let flags = fields.u16()?;
        let compression_method = fields.u16()?;
        let _last_modified_time = fields.u16()?;
        let _last_modified_date = fields.u16()?;
        let crc32 = fields.u32()?;
        let compressed_size = fields.u32()?;
        let uncompressed_size = fields.u32()?;
        let path_length = usize(fields.u16()?)?;
        let extra_field_length = usize(fields.u16()?)?;
        let path = fields.bytes(path_length)?;
        let extra_field = fields.bytes(extra_field_length)?;
        *header = fields.remaining();

        Ok(Self {
            flags,
            compression_method,
            crc32,
            compressed_size,
            uncompressed_size,
            path,
            extra_field,
        })
    }
}

/// Bit 11 of the general purpose flags: names are UTF-8. Otherwise, CP437.
pub fn is_utf8(flags: u16) -> bool {
    flags & (1 << 11) != 0
}

/// Bit 0 of the general purpose flags: the entry is encrypted.
pub fn is_encrypted(flags: u16) -> bool {
    flags & 1 != 0
}

/// Bit 3 of the general purpose flags: sizes and CRC live in a data descriptor
/// after the file data, so the local header carries zeroes for them.
pub fn has_data_descriptor(flags: u16) -> bool {
    flags & (1 << 3) != 0
}

/// Decodes an entry name per its UTF-8 flag.
pub fn decode_name(raw: &[u8], flags: u16) -> DecodeResult<String> {
    if is_utf8(flags) {
        Ok(std::str::from_utf8(raw)?.to_owned())
    } else {
        let name: Cow<str> = Cow::borrow_from_cp437(raw, &CP437_CONTROL);
        Ok(name.into_owned())
    }
}

/// Parses an MS-DOS date and time, or returns `None` if they don't form a real
/// moment (as with the all-zero "no timestamp" value some archivers write).
pub fn parse_msdos(time: u16, date: u16) -> Option<NaiveDateTime> {
    let seconds = (0b0000_0000_0001_1111 & time) as u32 * 2; // 2-second precision
    let minutes = (0b0000_0111_1110_0000 & time) as u32 >> 5;
    let hours = (0b1111_1000_0000_0000 & time) as u32 >> 11;

    let days = (0b0000_0000_0001_1111 & date) as u32;
    let months = (0b0000_0001_1110_0000 & date) as u32 >> 5;
    // Years since 1980
    let years = ((0b1111_1110_0000_0000 & date) >> 9) as i32 + 1980;

    NaiveDate::from_ymd_opt(years, months, days)?.and_hms_opt(hours, minutes, seconds)
}

/// 32-bit sizes and offsets, some of which might be overridden by a Zip64 extra field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extents {
    pub size: u64,
    pub compressed_size: u64,
    pub header_offset: u64,
}

/// Walks the extra field records (4.5.1) looking for Zip64 information (4.5.3).
///
/// Only the values saturated at `u32::MAX` appear in the Zip64 record, in order.
pub fn parse_extra_field(extents: &mut Extents, extra_field: &[u8]) -> DecodeResult<()> {
    let mut fields = Fields::new(extra_field, "Truncated extra field");
    while !fields.remaining().is_empty() {
        let kind = fields.u16()?;
        let field_len = usize(fields.u16()?)?;
        let body = fields.bytes(field_len)?;
        if kind != 0x0001 {
            continue;
        }

        let mut zip64 = Fields::new(body, "Truncated Zip64 extra field");
        if extents.size == u32::MAX as u64 {
            extents.size = zip64.u64()?;
        }
        if extents.compressed_size == u32::MAX as u64 {
            extents.compressed_size = zip64.u64()?;
        }
        if extents.header_offset == u32::MAX as u64 {
            extents.header_offset = zip64.u64()?;
        }
        // We already refuse multi-disk archives, so a disk number here is nonsense.
        if !zip64.remaining().is_empty() {
            return Err(DecodeError::InvalidArchive(
                "Extra data field contains disk number",
            ));
        }
    }
    Ok(())
}
