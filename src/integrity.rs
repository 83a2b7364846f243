//! Reading entries while checking their CRC-32.
//!
//! Checksum mismatches are reported through the advisory channel and never
//! keep callers from getting their bytes. Read failures part way through an
//! entry follow the session's [`ErrorMode`].

use std::io::{self, Read};

use crc32fast::Hasher;

use crate::decoder::*;
use crate::result::*;
use crate::session::{AdvisoryKind, ErrorMode, Session};

/// Entries are pulled through in chunks of this many bytes.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// In [`ErrorMode::LogAndContinue`], give up on an entry after this many
/// failed reads in a row.
const MAX_CONSECUTIVE_FAILURES: usize = 8;

/// Reader that keeps a running CRC-32 of everything read through it.
pub struct Crc32Reader<R> {
    inner: R,
    hasher: Hasher,
}

impl<R> Crc32Reader<R> {
    pub fn new(inner: R) -> Crc32Reader<R> {
        Crc32Reader {
            inner,
            hasher: Hasher::new(),
        }
    }

    /// The checksum of everything read so far
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        self.hasher.update(&buf[0..count]);
        Ok(count)
    }
}

impl Session {
    /// Reads an entry's contents in full.
    ///
    /// Returns `None` for directories and for entries the decoder can't open.
    pub(crate) fn read_entry(&self, entry: &RawEntry, index: usize) -> FsResult<Option<Vec<u8>>> {
        if entry.is_dir {
            return Ok(None);
        }
        let Some(stream) = self.open_entry_stream(entry, index) else {
            return Ok(None);
        };
        // Don't let a lying size field allocate the world.
        let mut contents = Vec::with_capacity(entry.size.min(16 * CHUNK_SIZE as u64) as usize);
        self.verify(entry, stream, |chunk| contents.extend_from_slice(chunk))?;
        Ok(Some(contents))
    }

    /// Checks an entry's integrity, then opens a fresh stream of it for the caller.
    ///
    /// Returns `None` for directories and for entries the decoder can't open.
    pub(crate) fn stream_entry(&self, entry: &RawEntry, index: usize) -> FsResult<Option<EntryStream>> {
        if entry.is_dir {
            return Ok(None);
        }
        let Some(stream) = self.open_entry_stream(entry, index) else {
            return Ok(None);
        };
        self.verify(entry, stream, |_| {})?;
        Ok(self.open_entry_stream(entry, index))
    }

    pub(crate) fn open_entry_stream(&self, entry: &RawEntry, index: usize) -> Option<EntryStream> {
        let archive = self.archive.as_ref()?;
        match archive.open_stream(index, self.password.as_deref()) {
            Ok(stream) => Some(stream),
            Err(e) => {
                self.advise(
                    AdvisoryKind::StreamUnavailable,
                    format!("{}: Can't open stream: {e}", self.display_path(entry)),
                );
                None
            }
        }
    }

    /// Drains `stream` chunk by chunk into `sink`, then compares the running
    /// CRC-32 against the one stored for `entry`.
    fn verify<F: FnMut(&[u8])>(
        &self,
        entry: &RawEntry,
        stream: EntryStream,
        mut sink: F,
    ) -> FsResult<()> {
        let mut reader = Crc32Reader::new(stream);
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut failures = 0;

        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    failures = 0;
                    sink(&chunk[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => match self.mode {
                    ErrorMode::Throw => {
                        return Err(FsError::StreamRead {
                            path: self.display_path(entry),
                            source,
                        })
                    }
                    ErrorMode::LogAndContinue => {
                        self.advise(
                            AdvisoryKind::StreamRead,
                            format!("{}: Stream read error: {source}", self.display_path(entry)),
                        );
                        failures += 1;
                        if failures >= MAX_CONSECUTIVE_FAILURES {
                            break;
                        }
                    }
                },
            }
        }

        let actual = reader.checksum();
        if actual != entry.crc32 {
            self.advise(
                AdvisoryKind::IntegrityMismatch,
                format!(
                    "{}: CRC of entry was incorrect. Need: [{:08x}], got [{actual:08x}]",
                    self.display_path(entry),
                    entry.crc32
                ),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_reader() {
        let data: &[u8] = b"";
        let mut buf = [0; 1];

        let mut reader = Crc32Reader::new(data);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(reader.checksum(), 0);
    }

    #[test]
    fn test_byte_by_byte() {
        let data: &[u8] = b"1234";
        let mut buf = [0; 1];

        let mut reader = Crc32Reader::new(data);
        for _ in 0..4 {
            assert_eq!(reader.read(&mut buf).unwrap(), 1);
        }
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        // Can keep reading 0 bytes after the end
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(reader.checksum(), 0x9be3e0a3);
    }

    #[test]
    fn test_checksum_is_running() {
        let data: &[u8] = b"12345678";
        let mut buf = [0; 4];

        let mut reader = Crc32Reader::new(data);
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(reader.checksum(), 0x9be3e0a3);
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(reader.checksum(), crc32fast::hash(b"12345678"));
    }
}
