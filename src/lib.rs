//! arcfs presents a read-only archive as a virtual filesystem.
//!
//! ```no_run
//! # use std::io;
//! # use arcfs::*;
//! let session = Session::open("docs.zip")?;
//!
//! // Paths may or may not start with the archive's own name.
//! for record in session.list_contents("docs.zip/guide", false) {
//!     println!("{} ({:?})", record.path, record.kind);
//! }
//!
//! if let Some(read) = session.read("guide/intro.html")? {
//!     println!("{} bytes", read.contents.len());
//! }
//!
//! // Streams are independent of the session.
//! if let Some(mut read) = session.read_stream("guide/logo.png")? {
//!     io::copy(&mut read.stream, &mut io::sink())?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Archives only store a flat list of entry names, so directories are
//! whatever those names imply. Listing a directory finds the entries whose
//! names start with its path, in the order the archive lists them.
//!
//! Every read is checked against the CRC-32 stored in the archive.
//! A mismatch doesn't stop you from getting the bytes; it's reported as an
//! [`Advisory`] (and logged through the [`log`](https://docs.rs/log) crate).
//! Whether a read that fails part way through is an error or an advisory
//! depends on the session's [`ErrorMode`].
//!
//! Nothing here ever writes to an archive. Every mutating operation
//! fails with [`FsError::NotSupported`].
//!
//! ZIP archives are handled by the built-in [`ZipDecoder`].
//! Other formats can be plugged in by implementing [`ArchiveDecoder`].

pub mod adapter;
pub mod decoder;
pub mod index;
pub mod integrity;
pub mod mime;
pub mod path;
pub mod record;
pub mod result;
pub mod session;
pub mod zip;

pub use adapter::{Contents, Filesystem, MimeType, Stream, StreamMimeType, Visibility};
pub use decoder::{ArchiveDecoder, ArchiveHandle, EntryStream, RawEntry, VolumeCallback};
pub use mime::{MagicSniffer, MimeSniffer};
pub use record::{EntryKind, EntryRecord, FileDetails};
pub use result::{DecodeError, FsError, FsResult};
pub use session::{Advisory, AdvisoryKind, ErrorMode, Session, SessionBuilder, MAX_ADVISORIES};
pub use zip::ZipDecoder;

mod arch;
