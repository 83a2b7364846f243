//! Turning the paths callers hand us into names we can find in the archive.
//!
//! Three vocabularies meet here:
//!
//! 1. Caller paths, which may carry the session's prefix
//!    and may or may not start with the archive's root name
//!    (`archive.zip/docs/a.txt` and `docs/a.txt` mean the same thing).
//! 2. Entry names, relative to the archive root (`docs/a.txt`).
//! 3. Resource locators (`zip://<archive>#/<entry>`) for anything that
//!    opens entries by URL instead of through a session.

use crate::session::Session;

/// Path separators we trim or strip, both logical and Windows-flavored
const SEPARATORS: &[char] = &['/', '\\'];

/// Normalizes a configured prefix to end in exactly one `/`.
/// An empty prefix means no prefix.
pub(crate) fn normalize_prefix(prefix: &str) -> Option<String> {
    if prefix.is_empty() {
        None
    } else {
        Some(format!("{}/", prefix.trim_end_matches(SEPARATORS)))
    }
}

/// Puts `prefix` in front of `path`.
pub(crate) fn apply_prefix(prefix: Option<&str>, path: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}{}", path.trim_start_matches(SEPARATORS)),
        None => path.to_owned(),
    }
}

/// Removes `prefix` from the front of `path`, if it's there.
pub(crate) fn strip_prefix<'a>(prefix: Option<&str>, path: &'a str) -> &'a str {
    prefix
        .and_then(|prefix| path.strip_prefix(prefix))
        .unwrap_or(path)
}

/// Maps a caller's path to a root-relative entry name.
///
/// The prefix is stripped if present, trailing separators are trimmed,
/// and if the archive's root name shows up, everything through it
/// (and one separator after it) goes too.
pub fn normalize<'a>(prefix: Option<&str>, root: &str, path: &'a str) -> &'a str {
    let location = strip_prefix(prefix, path).trim_end_matches(SEPARATORS);
    if root.is_empty() {
        return location;
    }
    match location.find(root) {
        Some(posit) => {
            let rest = &location[posit + root.len()..];
            rest.strip_prefix(SEPARATORS).unwrap_or(rest)
        }
        None => location,
    }
}

/// Builds `<scheme>://<archive>#/<entry>`, percent-encoding both paths.
pub fn locator(scheme: &str, archive: &str, entry: &str) -> String {
    let mut out = String::with_capacity(scheme.len() + archive.len() + entry.len() + 8);
    out.push_str(scheme);
    out.push_str("://");
    percent_encode(archive, &mut out);
    out.push_str("#/");
    percent_encode(entry, &mut out);
    out
}

/// RFC 3986 encoding: everything but unreserved characters becomes `%XX`.
fn percent_encode(input: &str, out: &mut String) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    for &b in input.as_bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0xf) as usize] as char);
        }
    }
}

impl Session {
    /// Maps a caller's path to a root-relative entry name.
    /// See [`normalize()`].
    pub fn normalize<'a>(&self, path: &'a str) -> &'a str {
        normalize(self.prefix.as_deref(), &self.root, path)
    }

    /// The resource locator for the named entry of this session's archive.
    ///
    /// The archive part is the location the archive was opened from,
    /// with the session's prefix applied.
    pub fn locator(&self, entry_name: &str) -> String {
        locator(self.scheme(), &self.location, entry_name)
    }
}
