//! Fixtures shared by the integration tests:
//! a scripted in-memory decoder and a tiny ZIP writer.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use arcfs::*;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// How a scripted entry's stream misbehaves
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// The decoder refuses to open a stream.
    Unopenable,
    /// Reads succeed for this many bytes, then fail once.
    FailOnceAfter(usize),
    /// Reads succeed for this many bytes, then fail forever.
    FailAfter(usize),
}

#[derive(Clone)]
pub struct ScriptedEntry {
    pub raw: RawEntry,
    pub data: Vec<u8>,
    pub fault: Option<Fault>,
}

/// What the decoder was asked to do
#[derive(Debug, Default)]
pub struct Calls {
    pub opened: Vec<(Utf8PathBuf, Option<String>, bool)>,
    pub streams: Vec<(usize, Option<String>)>,
    pub closed: usize,
}

/// An `ArchiveDecoder` serving entries from memory.
#[derive(Clone, Default)]
pub struct ScriptedDecoder {
    pub entries: Vec<ScriptedEntry>,
    /// Open failures by location: the message of a `DecodeError::Other`
    pub open_failures: HashMap<String, String>,
    pub unavailable: Option<String>,
    /// Opening succeeds, but listing the entries doesn't.
    pub fail_entries: bool,
    pub fail_close: bool,
    pub calls: Arc<Mutex<Calls>>,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push(ScriptedEntry {
            raw: RawEntry {
                name: name.to_owned(),
                is_dir: false,
                size: data.len() as u64,
                compressed_size: (data.len() / 2) as u64,
                method: 0x33,
                crc32: crc32fast::hash(data),
                modified: NaiveDate::from_ymd_opt(2019, 10, 20)
                    .and_then(|d| d.and_hms_opt(13, 45, 30)),
                position: None,
            },
            data: data.to_vec(),
            fault: None,
        });
        self
    }

    pub fn dir(mut self, name: &str) -> Self {
        self.entries.push(ScriptedEntry {
            raw: RawEntry {
                name: name.to_owned(),
                is_dir: true,
                size: 0,
                compressed_size: 0,
                method: 0x30,
                crc32: 0,
                modified: None,
                position: None,
            },
            data: Vec::new(),
            fault: None,
        });
        self
    }

    /// Tweaks the most recently added entry.
    pub fn with_last<F: FnOnce(&mut ScriptedEntry)>(mut self, f: F) -> Self {
        if let Some(last) = self.entries.last_mut() {
            f(last);
        }
        self
    }

    pub fn failing_open(mut self, location: &str, message: &str) -> Self {
        self.open_failures
            .insert(location.to_owned(), message.to_owned());
        self
    }
}

struct ScriptedHandle {
    entries: Vec<ScriptedEntry>,
    fail_entries: bool,
    fail_close: bool,
    calls: Arc<Mutex<Calls>>,
}

impl ArchiveDecoder for ScriptedDecoder {
    fn check_available(&self) -> Result<(), String> {
        match &self.unavailable {
            Some(why) => Err(why.clone()),
            None => Ok(()),
        }
    }

    fn scheme(&self) -> &str {
        "rar"
    }

    fn open(
        &self,
        location: &Utf8Path,
        password: Option<&str>,
        volumes: Option<&VolumeCallback>,
    ) -> Result<Box<dyn ArchiveHandle>, DecodeError> {
        self.calls.lock().unwrap().opened.push((
            location.to_owned(),
            password.map(str::to_owned),
            volumes.is_some(),
        ));
        if let Some(message) = self.open_failures.get(location.as_str()) {
            return Err(DecodeError::Other(message.clone()));
        }
        Ok(Box::new(ScriptedHandle {
            entries: self.entries.clone(),
            fail_entries: self.fail_entries,
            fail_close: self.fail_close,
            calls: Arc::clone(&self.calls),
        }))
    }
}

impl ArchiveHandle for ScriptedHandle {
    fn entries(&self) -> Result<Vec<RawEntry>, DecodeError> {
        if self.fail_entries {
            return Err(DecodeError::Other(String::from("scripted listing failure")));
        }
        Ok(self.entries.iter().map(|e| e.raw.clone()).collect())
    }

    fn open_stream(&self, index: usize, password: Option<&str>) -> Result<EntryStream, DecodeError> {
        self.calls
            .lock()
            .unwrap()
            .streams
            .push((index, password.map(str::to_owned)));
        let entry = &self.entries[index];
        match entry.fault {
            Some(Fault::Unopenable) => Err(DecodeError::UnsupportedArchive(String::from(
                "scripted failure",
            ))),
            Some(Fault::FailOnceAfter(n)) => Ok(Box::new(FaultyReader::new(&entry.data, n, true))),
            Some(Fault::FailAfter(n)) => Ok(Box::new(FaultyReader::new(&entry.data, n, false))),
            None => Ok(Box::new(io::Cursor::new(entry.data.clone()))),
        }
    }

    fn close(&mut self) -> Result<(), DecodeError> {
        self.calls.lock().unwrap().closed += 1;
        if self.fail_close {
            Err(DecodeError::Other(String::from("scripted close failure")))
        } else {
            Ok(())
        }
    }
}

/// Serves `data`, but errors once `good` bytes have been read.
struct FaultyReader {
    data: io::Cursor<Vec<u8>>,
    good: usize,
    once: bool,
    failed: bool,
}

impl FaultyReader {
    fn new(data: &[u8], good: usize, once: bool) -> Self {
        Self {
            data: io::Cursor::new(data.to_vec()),
            good,
            once,
            failed: false,
        }
    }
}

impl Read for FaultyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let posit = self.data.position() as usize;
        if posit >= self.good && !(self.once && self.failed) {
            self.failed = true;
            return Err(io::Error::new(io::ErrorKind::Other, "scripted read failure"));
        }
        let limit = if self.failed { buf.len() } else { (self.good - posit).min(buf.len()) };
        self.data.read(&mut buf[..limit])
    }
}

/// A small archive with a file at the top and one in a subdirectory:
/// `a.txt` (120 bytes), `sub/`, and `sub/b.txt`
pub fn scenario() -> ScriptedDecoder {
    ScriptedDecoder::new()
        .file("a.txt", &[b'a'; 120])
        .dir("sub/")
        .file("sub/b.txt", b"bee\n")
}

pub enum ZipMethod {
    Stored,
    Deflate,
}

struct ZipItem {
    name: String,
    data: Vec<u8>,
    method: ZipMethod,
    crc_override: Option<u32>,
}

/// Writes minimal ZIP archives.
#[derive(Default)]
pub struct ZipBuilder {
    items: Vec<ZipItem>,
    prepend: Vec<u8>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(mut self, name: &str, data: &[u8]) -> Self {
        self.items.push(ZipItem {
            name: name.to_owned(),
            data: data.to_vec(),
            method: ZipMethod::Stored,
            crc_override: None,
        });
        self
    }

    pub fn deflated(mut self, name: &str, data: &[u8]) -> Self {
        self.items.push(ZipItem {
            name: name.to_owned(),
            data: data.to_vec(),
            method: ZipMethod::Deflate,
            crc_override: None,
        });
        self
    }

    pub fn dir(self, name: &str) -> Self {
        self.stored(name, b"")
    }

    /// Stores the wrong CRC for the most recent entry.
    pub fn corrupt_crc(mut self) -> Self {
        if let Some(last) = self.items.last_mut() {
            last.crc_override = Some(!crc32fast::hash(&last.data));
        }
        self
    }

    /// Puts junk in front of the archive, like a self-extractor would.
    pub fn prepend(mut self, junk: &[u8]) -> Self {
        self.prepend = junk.to_vec();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        // 2019-10-20 13:45:30
        let dos_time: u16 = (13 << 11) | (45 << 5) | (30 / 2);
        let dos_date: u16 = ((2019 - 1980) << 9) | (10 << 5) | 20;
        let flags: u16 = 1 << 11; // UTF-8 names

        let mut out = self.prepend.clone();
        let base = out.len();
        let mut central = Vec::new();

        for item in &self.items {
            let (method, payload) = match item.method {
                ZipMethod::Stored => (0u16, item.data.clone()),
                ZipMethod::Deflate => {
                    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                    encoder.write_all(&item.data).unwrap();
                    (8u16, encoder.finish().unwrap())
                }
            };
            let crc = item.crc_override.unwrap_or_else(|| crc32fast::hash(&item.data));
            let offset = (out.len() - base) as u32;

            out.extend_from_slice(b"PK\x03\x04");
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&flags.to_le_bytes());
            out.extend_from_slice(&method.to_le_bytes());
            out.extend_from_slice(&dos_time.to_le_bytes());
            out.extend_from_slice(&dos_date.to_le_bytes());
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(&(item.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(item.name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(item.name.as_bytes());
            out.extend_from_slice(&payload);

            central.extend_from_slice(b"PK\x01\x02");
            central.extend_from_slice(&((3u16 << 8) | 20).to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&flags.to_le_bytes());
            central.extend_from_slice(&method.to_le_bytes());
            central.extend_from_slice(&dos_time.to_le_bytes());
            central.extend_from_slice(&dos_date.to_le_bytes());
            central.extend_from_slice(&crc.to_le_bytes());
            central.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            central.extend_from_slice(&(item.data.len() as u32).to_le_bytes());
            central.extend_from_slice(&(item.name.len() as u16).to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes()); // extra field
            central.extend_from_slice(&0u16.to_le_bytes()); // comment
            central.extend_from_slice(&0u16.to_le_bytes()); // disk
            central.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
            central.extend_from_slice(&0u32.to_le_bytes()); // external attributes
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(item.name.as_bytes());
        }

        let central_offset = (out.len() - base) as u32;
        out.extend_from_slice(&central);

        out.extend_from_slice(b"PK\x05\x06");
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&(self.items.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.items.len() as u16).to_le_bytes());
        out.extend_from_slice(&(central.len() as u32).to_le_bytes());
        out.extend_from_slice(&central_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }
}
