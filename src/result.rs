//! Error types and the related `Result<T>` aliases

use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Substring identifying the "file open error" class of decoder failures.
///
/// These are the only open failures escalated in
/// [`ErrorMode::LogAndContinue`](crate::session::ErrorMode::LogAndContinue).
pub const FILE_OPEN_ERROR: &str = "file open error";

pub type DecodeResult<T> = Result<T, DecodeError>;

pub type FsResult<T> = Result<T, FsError>;

/// Failures reported by an archive decoder.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The archive file itself couldn't be opened or mapped.
    #[error("file open error: {location}")]
    FileOpen {
        location: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    /// An error from underlying I/O
    #[error("I/O Error")]
    Io(#[from] io::Error),

    /// The archive contained invalid data per its format.
    #[error("Invalid archive: {0}")]
    InvalidArchive(&'static str),

    /// Decoding a UTF-8 name failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// The archive (or one of its entries) uses an unsupported feature
    #[error("Unsupported archive: {0}")]
    UnsupportedArchive(String),

    /// A cast from a 64-bit int to a usize failed while mapping the file,
    /// probably on a 32-bit system.
    #[error("Archive too large for address space")]
    InsufficientAddressSpace,

    /// Anything else a third-party decoder wants to report.
    #[error("{0}")]
    Other(String),
}

impl DecodeError {
    /// Returns true if this failure belongs to the "file open error" class:
    /// the archive is missing or unreadable, as opposed to merely odd.
    pub fn is_file_open_error(&self) -> bool {
        matches!(self, DecodeError::FileOpen { .. })
            || self.to_string().to_lowercase().contains(FILE_OPEN_ERROR)
    }
}

/// Failures surfaced by a [`Session`](crate::Session).
#[derive(Debug, Error)]
pub enum FsError {
    /// The archive couldn't be opened.
    #[error("Couldn't open archive {location}")]
    ArchiveOpen {
        location: Utf8PathBuf,
        #[source]
        source: DecodeError,
    },

    /// Reading an entry's contents failed part way through.
    #[error("{path}: Stream read error")]
    StreamRead {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Someone tried to modify the archive.
    #[error("Operation '{operation}' is not supported: archives are opened read-only and their format can't be modified")]
    NotSupported { operation: &'static str },

    /// The decoder can't be used at all (missing capability, wrong version, ...)
    #[error("Archive decoder unavailable: {0}")]
    Unavailable(String),
}

impl FsError {
    pub(crate) fn not_supported(operation: &'static str) -> Self {
        FsError::NotSupported { operation }
    }
}
