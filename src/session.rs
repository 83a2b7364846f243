//! The archive session: one opened archive, its entry table, and the policy
//! for what to do when something goes wrong.
//!
//! Sessions are single-threaded. Every operation runs to completion before
//! returning, and sharing one between threads isn't supported
//! (it's neither `Send` nor `Sync`). Streams handed out by a session are
//! independent byte sources, but callers should finish with them before
//! closing the session.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use log::*;

use crate::decoder::*;
use crate::mime::{MagicSniffer, MimeSniffer};
use crate::path;
use crate::result::*;
use crate::zip::ZipDecoder;

/// The most advisories a session keeps; older ones are dropped first.
pub const MAX_ADVISORIES: usize = 1024;

/// What happens when reading an archive goes wrong.
///
/// This only governs content-level trouble (opening the archive,
/// reading an entry's bytes). Mutation attempts and missing decoder
/// capabilities fail the same way in both modes.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum ErrorMode {
    /// Fail the operation with an error.
    Throw,
    /// Record an [`Advisory`] and carry on with the most complete result we can build.
    /// Open failures of the "file open error" class are still errors.
    #[default]
    LogAndContinue,
}

/// The kinds of problems reported through the advisory channel
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdvisoryKind {
    /// The archive couldn't be opened, but not badly enough to fail.
    OpenWarning,
    /// Reading an entry failed part way through.
    StreamRead,
    /// An entry's contents didn't match its stored CRC-32.
    IntegrityMismatch,
    /// The decoder couldn't produce a stream for an entry.
    StreamUnavailable,
}

/// A timestamped diagnostic that didn't interrupt the operation that raised it.
#[derive(Debug, Clone)]
pub struct Advisory {
    pub at: DateTime<Local>,
    pub kind: AdvisoryKind,
    pub message: String,
}

impl Advisory {
    fn new(kind: AdvisoryKind, message: String) -> Self {
        Self {
            at: Local::now(),
            kind,
            message,
        }
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{:?}",
            self.at.format("%Y-%m-%d %H:%M:%S"),
            self.message,
            self.kind
        )
    }
}

/// Configures and opens a [`Session`].
///
/// ```no_run
/// # use arcfs::*;
/// let session = Session::builder()
///     .prefix("/srv/archives")
///     .error_mode(ErrorMode::Throw)
///     .open("reports/2019.zip")?;
/// # Ok::<(), FsError>(())
/// ```
#[derive(Default)]
pub struct SessionBuilder {
    decoder: Option<Arc<dyn ArchiveDecoder>>,
    sniffer: Option<Arc<dyn MimeSniffer>>,
    prefix: Option<String>,
    password: Option<String>,
    mode: ErrorMode,
    volume_callback: Option<VolumeCallback>,
}

impl SessionBuilder {
    /// Uses the given decoder instead of the built-in ZIP one.
    pub fn decoder<D: ArchiveDecoder + 'static>(mut self, decoder: D) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    /// Uses the given MIME sniffer instead of [`MagicSniffer`].
    pub fn sniffer<S: MimeSniffer + 'static>(mut self, sniffer: S) -> Self {
        self.sniffer = Some(Arc::new(sniffer));
        self
    }

    /// Sets the prefix applied to the archive location
    /// and stripped from every path callers hand us.
    pub fn prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = path::normalize_prefix(&prefix.into());
        self
    }

    pub fn password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn volume_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Utf8Path) -> Option<Utf8PathBuf> + Send + Sync + 'static,
    {
        self.volume_callback = Some(Arc::new(callback));
        self
    }

    /// Checks that the decoder is usable, then opens the archive at `location`.
    pub fn open(self, location: &str) -> FsResult<Session> {
        let decoder = self
            .decoder
            .unwrap_or_else(|| Arc::new(ZipDecoder) as Arc<dyn ArchiveDecoder>);
        decoder.check_available().map_err(FsError::Unavailable)?;

        let mut session = Session {
            decoder,
            sniffer: self
                .sniffer
                .unwrap_or_else(|| Arc::new(MagicSniffer) as Arc<dyn MimeSniffer>),
            prefix: self.prefix,
            mode: self.mode,
            password: None,
            volume_callback: self.volume_callback,
            archive: None,
            entries: Vec::new(),
            root: String::new(),
            location: String::new(),
            advisories: RefCell::new(VecDeque::new()),
        };
        session.open_archive(location, self.password)?;
        Ok(session)
    }
}

/// An opened archive, presented as a read-only filesystem.
///
/// See [`Filesystem`](crate::Filesystem) for the operations.
pub struct Session {
    decoder: Arc<dyn ArchiveDecoder>,
    pub(crate) sniffer: Arc<dyn MimeSniffer>,
    pub(crate) prefix: Option<String>,
    pub(crate) mode: ErrorMode,
    pub(crate) password: Option<String>,
    volume_callback: Option<VolumeCallback>,
    pub(crate) archive: Option<Box<dyn ArchiveHandle>>,
    /// Loaded once when the archive is opened, then never changed.
    pub(crate) entries: Vec<RawEntry>,
    /// Display name of the archive, used as the top-level path segment
    pub(crate) root: String,
    /// Where the archive was opened from, prefix included
    pub(crate) location: String,
    advisories: RefCell<VecDeque<Advisory>>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Opens the archive at `location` with the built-in ZIP decoder and default settings.
    pub fn open(location: &str) -> FsResult<Self> {
        Self::builder().open(location)
    }

    /// Opens (or re-opens) an archive, releasing whatever this session had open before.
    ///
    /// `location` has the session's prefix applied before it reaches the decoder;
    /// its base name becomes the archive root.
    ///
    /// In [`ErrorMode::Throw`], any failure is an [`FsError::ArchiveOpen`].
    /// In [`ErrorMode::LogAndContinue`], only "file open error" failures are;
    /// anything else is recorded as an advisory and leaves the session empty.
    pub fn open_archive(&mut self, location: &str, password: Option<String>) -> FsResult<()> {
        self.release_archive();
        self.password = password;

        let resolved = Utf8PathBuf::from(
            path::apply_prefix(self.prefix.as_deref(), location)
                .replace('/', std::path::MAIN_SEPARATOR_STR),
        );
        debug!("Opening {resolved}");

        let opened = self
            .decoder
            .open(
                &resolved,
                self.password.as_deref(),
                self.volume_callback.as_ref(),
            )
            .and_then(|mut handle| match handle.entries() {
                Ok(entries) => Ok((handle, entries)),
                Err(e) => {
                    // The handle is only released by close().
                    if let Err(close_error) = handle.close() {
                        warn!("{resolved}: couldn't close archive: {close_error}");
                    }
                    Err(e)
                }
            });

        match opened {
            Ok((handle, entries)) => {
                self.root = Utf8Path::new(location)
                    .file_name()
                    .unwrap_or(location)
                    .to_owned();
                self.location = path::apply_prefix(self.prefix.as_deref(), location);
                info!("{}: {} entries", self.root, entries.len());
                self.archive = Some(handle);
                self.entries = entries;
                Ok(())
            }
            Err(source) => match self.mode {
                ErrorMode::Throw => Err(FsError::ArchiveOpen {
                    location: resolved,
                    source,
                }),
                ErrorMode::LogAndContinue => {
                    self.advise(AdvisoryKind::OpenWarning, format!("{resolved}: {source}"));
                    if source.is_file_open_error() {
                        Err(FsError::ArchiveOpen {
                            location: resolved,
                            source,
                        })
                    } else {
                        Ok(())
                    }
                }
            },
        }
    }

    /// Closes the archive and releases everything the session held,
    /// recorded advisories included.
    ///
    /// Returns 0 on success and 1 if the decoder failed to close the archive
    /// or there was nothing open to close.
    pub fn close(&mut self) -> i32 {
        let status = match self.archive.take() {
            Some(mut archive) => match archive.close() {
                Ok(()) => 0,
                Err(e) => {
                    warn!("{}: couldn't close archive: {e}", self.root);
                    1
                }
            },
            None => {
                debug!("close() called without an open archive");
                1
            }
        };
        self.entries = Vec::new();
        self.password = None;
        self.volume_callback = None;
        self.root = String::new();
        self.location = String::new();
        self.advisories.borrow_mut().clear();
        status
    }

    /// Closes the current archive (if any) ahead of opening another,
    /// keeping the session's configuration.
    fn release_archive(&mut self) {
        if let Some(mut archive) = self.archive.take() {
            if let Err(e) = archive.close() {
                warn!("{}: couldn't close archive: {e}", self.root);
            }
        }
        self.entries = Vec::new();
        self.root = String::new();
        self.location = String::new();
    }

    /// Sets the password used for subsequent stream opens.
    pub fn set_password<S: Into<String>>(&mut self, password: S) -> &mut Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the volume callback used by subsequent opens.
    pub fn set_volume_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&Utf8Path) -> Option<Utf8PathBuf> + Send + Sync + 'static,
    {
        self.volume_callback = Some(Arc::new(callback));
        self
    }

    pub fn set_error_mode(&mut self, mode: ErrorMode) -> &mut Self {
        debug!("Error mode: {mode:?}");
        self.mode = mode;
        self
    }

    pub fn error_mode(&self) -> ErrorMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.archive.is_some()
    }

    /// The display name of the archive (its file name)
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The configured prefix, if any, with a single trailing slash.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Every entry in the archive, in enumeration order
    pub fn entries(&self) -> &[RawEntry] {
        &self.entries
    }

    /// The underlying archive handle, for anything the decoder offers
    /// beyond what the session exposes.
    pub fn archive(&self) -> Option<&dyn ArchiveHandle> {
        self.archive.as_deref()
    }

    /// The advisories recorded since the last [`close()`](Self::close)
    /// or [`take_advisories()`](Self::take_advisories), oldest first.
    ///
    /// Only the latest [`MAX_ADVISORIES`] are kept.
    pub fn advisories(&self) -> Vec<Advisory> {
        self.advisories.borrow().iter().cloned().collect()
    }

    /// Returns the advisories recorded so far, clearing them.
    pub fn take_advisories(&self) -> Vec<Advisory> {
        self.advisories.take().into()
    }

    /// Reports an advisory failure: logged, recorded, and otherwise ignored.
    pub(crate) fn advise(&self, kind: AdvisoryKind, message: String) {
        let advisory = Advisory::new(kind, message);
        warn!("{advisory}");
        let mut advisories = self.advisories.borrow_mut();
        if advisories.len() == MAX_ADVISORIES {
            advisories.pop_front();
        }
        advisories.push_back(advisory);
    }

    pub(crate) fn scheme(&self) -> &str {
        self.decoder.scheme()
    }

    /// `<root>/<entry name>`, as used in diagnostics and records
    pub(crate) fn display_path(&self, entry: &RawEntry) -> String {
        format!("{}/{}", self.root, entry.name)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release_archive();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("decoder", &self.decoder)
            .field("root", &self.root)
            .field("prefix", &self.prefix)
            .field("mode", &self.mode)
            .field("entries", &self.entries.len())
            .field("open", &self.archive.is_some())
            .finish()
    }
}
