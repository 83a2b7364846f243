//! The metadata callers see for each entry.

use std::io::Read;

use log::*;

use crate::decoder::RawEntry;
use crate::mime::MIME_PROBE_LEN;
use crate::session::Session;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// What only files have. Directories carry none of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDetails {
    /// Sniffed from the entry's first bytes; empty if that failed
    pub mimetype: String,
    /// CRC-32 of the uncompressed contents, as stored in the archive
    pub crc: u32,
    /// Uncompressed size in bytes
    pub size: u64,
    /// Compressed size in bytes
    pub comp_size: u64,
}

/// An entry as presented to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    /// `<archive root>/<entry name>`
    pub path: String,
    /// The entry name, relative to the archive root
    pub subpath: String,
    pub kind: EntryKind,
    /// Position of the entry in the archive
    pub index: usize,
    /// Last modification time in seconds since the Unix epoch, or 0 if unknown
    pub timestamp: i64,
    /// Format-specific compression method identifier
    pub comp_method: u32,
    /// `Some` for files, `None` for directories
    pub file: Option<FileDetails>,
}

impl EntryRecord {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn size(&self) -> Option<u64> {
        self.file.as_ref().map(|f| f.size)
    }

    pub fn mimetype(&self) -> Option<&str> {
        self.file.as_ref().map(|f| f.mimetype.as_str())
    }

    /// The stored CRC-32 as eight lowercase hex digits
    pub fn crc_hex(&self) -> Option<String> {
        self.file.as_ref().map(|f| format!("{:08x}", f.crc))
    }
}

impl Session {
    /// Builds the record for `entry`, which sits at `index` in the session's entry list.
    ///
    /// Files get their MIME type sniffed, which means opening and reading
    /// the start of them.
    pub(crate) fn materialize(&self, entry: &RawEntry, index: usize) -> EntryRecord {
        let mut record = EntryRecord {
            path: self.display_path(entry),
            subpath: entry.name.clone(),
            kind: if entry.is_dir {
                EntryKind::Dir
            } else {
                EntryKind::File
            },
            index: entry.position.unwrap_or(index),
            timestamp: entry.modified.map_or(0, |t| t.and_utc().timestamp()),
            comp_method: entry.method,
            file: None,
        };
        if !entry.is_dir {
            record.file = Some(FileDetails {
                mimetype: self.probe_mimetype(entry, index),
                crc: entry.crc32,
                size: entry.size,
                comp_size: entry.compressed_size,
            });
        }
        record
    }

    /// Sniffs the MIME type from the first bytes of an entry,
    /// settling for an empty string if anything goes wrong.
    fn probe_mimetype(&self, entry: &RawEntry, index: usize) -> String {
        let Some(archive) = &self.archive else {
            return String::new();
        };
        let stream = match archive.open_stream(index, self.password.as_deref()) {
            Ok(s) => s,
            Err(e) => {
                debug!("{}: can't sniff MIME type: {e}", self.display_path(entry));
                return String::new();
            }
        };

        let mut prefix = Vec::with_capacity(MIME_PROBE_LEN);
        if let Err(e) = stream.take(MIME_PROBE_LEN as u64).read_to_end(&mut prefix) {
            debug!("{}: can't sniff MIME type: {e}", self.display_path(entry));
            return String::new();
        }
        self.sniffer.detect(&prefix).unwrap_or_default()
    }
}
