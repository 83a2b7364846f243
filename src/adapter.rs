//! The filesystem-style interface higher-level code programs against.
//!
//! Reads never fail just because something doesn't exist:
//! a missing entry is `None` (or `false`), not an error.
//! Writes always fail, since archives are opened read-only.

use std::fmt;
use std::io::{self, Read};

use log::*;

use crate::decoder::EntryStream;
use crate::index;
use crate::mime::MIME_PROBE_LEN;
use crate::record::EntryRecord;
use crate::result::*;
use crate::session::{AdvisoryKind, ErrorMode, Session};

/// The result of a successful [`Filesystem::read()`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contents {
    /// The path as the caller gave it
    pub path: String,
    pub contents: Vec<u8>,
}

/// The result of a successful [`Filesystem::read_stream()`]
pub struct Stream {
    /// The entry's name, relative to the archive root
    pub path: String,
    pub stream: EntryStream,
    /// A resource locator for the same entry
    pub locator: String,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("path", &self.path)
            .field("locator", &self.locator)
            .finish_non_exhaustive()
    }
}

/// The result of a successful [`Filesystem::mimetype()`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeType {
    pub path: String,
    pub mimetype: String,
}

/// The result of a successful [`Filesystem::mimetype_from_stream()`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMimeType {
    /// The path as the caller gave it
    pub path: String,
    pub mimetype: String,
    /// The resource locator of the sniffed entry
    pub locator: String,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

pub trait Filesystem {
    /// Returns true if an entry exists at `path`.
    fn has(&self, path: &str) -> bool;

    /// Reads a file's contents.
    /// Returns `None` if there's no such entry or it's a directory.
    fn read(&self, path: &str) -> FsResult<Option<Contents>>;

    /// Opens a stream of a file's contents.
    /// Returns `None` if there's no such entry or it's a directory.
    fn read_stream(&self, path: &str) -> FsResult<Option<Stream>>;

    /// Lists the entries in `directory`, or everything below it if `recursive`.
    fn list_contents(&self, directory: &str, recursive: bool) -> Vec<EntryRecord>;

    fn metadata(&self, path: &str) -> Option<EntryRecord>;

    fn size(&self, path: &str) -> Option<EntryRecord>;

    fn timestamp(&self, path: &str) -> Option<EntryRecord>;

    /// Sniffs a file's MIME type from its contents.
    fn mimetype(&self, path: &str) -> FsResult<Option<MimeType>>;

    /// Sniffs a file's MIME type from the start of a fresh stream,
    /// without reading (or checking) the rest of it.
    fn mimetype_from_stream(&self, path: &str) -> FsResult<Option<StreamMimeType>>;

    fn visibility(&self, path: &str) -> Option<Visibility>;

    fn write(&mut self, path: &str, contents: &[u8]) -> FsResult<()>;

    fn write_stream(&mut self, path: &str, contents: &mut dyn io::Read) -> FsResult<()>;

    fn update(&mut self, path: &str, contents: &[u8]) -> FsResult<()>;

    fn update_stream(&mut self, path: &str, contents: &mut dyn io::Read) -> FsResult<()>;

    fn rename(&mut self, from: &str, to: &str) -> FsResult<()>;

    fn copy(&mut self, from: &str, to: &str) -> FsResult<()>;

    fn delete(&mut self, path: &str) -> FsResult<()>;

    fn delete_dir(&mut self, directory: &str) -> FsResult<()>;

    fn create_dir(&mut self, directory: &str) -> FsResult<()>;

    /// Returns whether the visibility was changed.
    fn set_visibility(&mut self, path: &str, visibility: Visibility) -> FsResult<bool>;
}

/// Fails a mutation attempt.
fn unsupported(operation: &'static str, path: &str) -> FsResult<()> {
    debug!("Refusing to {operation} {path}");
    Err(FsError::not_supported(operation))
}

impl Filesystem for Session {
    fn has(&self, path: &str) -> bool {
        index::find(&self.entries, self.normalize(path)).is_some()
    }

    fn read(&self, path: &str) -> FsResult<Option<Contents>> {
        let Some((i, entry)) = index::find(&self.entries, self.normalize(path)) else {
            return Ok(None);
        };
        Ok(self.read_entry(entry, i)?.map(|contents| Contents {
            path: path.to_owned(),
            contents,
        }))
    }

    fn read_stream(&self, path: &str) -> FsResult<Option<Stream>> {
        let Some((i, entry)) = index::find(&self.entries, self.normalize(path)) else {
            return Ok(None);
        };
        Ok(self.stream_entry(entry, i)?.map(|stream| Stream {
            path: entry.name.clone(),
            stream,
            locator: self.locator(&entry.name),
        }))
    }

    fn list_contents(&self, directory: &str, recursive: bool) -> Vec<EntryRecord> {
        index::children(&self.entries, self.normalize(directory), recursive)
            .into_iter()
            .map(|(i, entry)| self.materialize(entry, i))
            .collect()
    }

    fn metadata(&self, path: &str) -> Option<EntryRecord> {
        index::find(&self.entries, self.normalize(path)).map(|(i, entry)| self.materialize(entry, i))
    }

    fn size(&self, path: &str) -> Option<EntryRecord> {
        self.metadata(path)
    }

    fn timestamp(&self, path: &str) -> Option<EntryRecord> {
        self.metadata(path)
    }

    fn mimetype(&self, path: &str) -> FsResult<Option<MimeType>> {
        let Some(read) = self.read(path)? else {
            return Ok(None);
        };
        let probe = &read.contents[..read.contents.len().min(crate::mime::MIME_PROBE_LEN)];
        Ok(Some(MimeType {
            mimetype: self.sniffer.detect(probe).unwrap_or_default(),
            path: read.path,
        }))
    }

    fn mimetype_from_stream(&self, path: &str) -> FsResult<Option<StreamMimeType>> {
        let Some((i, entry)) = index::find(&self.entries, self.normalize(path)) else {
            return Ok(None);
        };
        if entry.is_dir {
            return Ok(None);
        }
        let Some(stream) = self.open_entry_stream(entry, i) else {
            return Ok(None);
        };

        let mut prefix = Vec::with_capacity(MIME_PROBE_LEN);
        if let Err(source) = stream.take(MIME_PROBE_LEN as u64).read_to_end(&mut prefix) {
            match self.mode {
                ErrorMode::Throw => {
                    return Err(FsError::StreamRead {
                        path: self.display_path(entry),
                        source,
                    })
                }
                ErrorMode::LogAndContinue => self.advise(
                    AdvisoryKind::StreamRead,
                    format!("{}: Stream read error: {source}", self.display_path(entry)),
                ),
            }
        }
        Ok(Some(StreamMimeType {
            path: path.to_owned(),
            mimetype: self.sniffer.detect(&prefix).unwrap_or_default(),
            locator: self.locator(&entry.name),
        }))
    }

    fn visibility(&self, _path: &str) -> Option<Visibility> {
        None
    }

    fn write(&mut self, path: &str, _contents: &[u8]) -> FsResult<()> {
        unsupported("write", path)
    }

    fn write_stream(&mut self, path: &str, _contents: &mut dyn io::Read) -> FsResult<()> {
        unsupported("write_stream", path)
    }

    fn update(&mut self, path: &str, _contents: &[u8]) -> FsResult<()> {
        unsupported("update", path)
    }

    fn update_stream(&mut self, path: &str, _contents: &mut dyn io::Read) -> FsResult<()> {
        unsupported("update_stream", path)
    }

    fn rename(&mut self, from: &str, _to: &str) -> FsResult<()> {
        unsupported("rename", from)
    }

    fn copy(&mut self, from: &str, _to: &str) -> FsResult<()> {
        unsupported("copy", from)
    }

    fn delete(&mut self, path: &str) -> FsResult<()> {
        unsupported("delete", path)
    }

    fn delete_dir(&mut self, directory: &str) -> FsResult<()> {
        unsupported("delete_dir", directory)
    }

    fn create_dir(&mut self, directory: &str) -> FsResult<()> {
        unsupported("create_dir", directory)
    }

    fn set_visibility(&mut self, _path: &str, _visibility: Visibility) -> FsResult<bool> {
        Ok(false)
    }
}
