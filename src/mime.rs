//! Guessing MIME types from the first bytes of an entry.

use memchr::memchr;

/// How many leading bytes of an entry are handed to a [`MimeSniffer`]
pub const MIME_PROBE_LEN: usize = 2048;

/// Guesses a MIME type from (up to [`MIME_PROBE_LEN`]) leading bytes of a file.
///
/// Returning `None` means "no idea"; callers record an empty MIME type.
pub trait MimeSniffer {
    fn detect(&self, prefix: &[u8]) -> Option<String>;
}

impl<F> MimeSniffer for F
where
    F: Fn(&[u8]) -> Option<String>,
{
    fn detect(&self, prefix: &[u8]) -> Option<String> {
        self(prefix)
    }
}

/// Magic numbers at the very start of a file
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"Rar!\x1a\x07", "application/x-rar"),
    (b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
    (b"\x1f\x8b", "application/gzip"),
    (b"BZh", "application/x-bzip2"),
    (b"\xfd7zXZ\x00", "application/x-xz"),
    (b"\x28\xb5\x2f\xfd", "application/zstd"),
    (b"\x7fELF", "application/x-executable"),
    (b"\x00asm", "application/wasm"),
];

/// A small magic-number sniffer, good enough for the common cases.
///
/// Beyond the binary signatures it knows, it tells HTML and XML apart from
/// other text, and calls anything else without NUL bytes `text/plain`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MagicSniffer;

impl MimeSniffer for MagicSniffer {
    fn detect(&self, prefix: &[u8]) -> Option<String> {
        Some(String::from(sniff(prefix)))
    }
}

fn sniff(prefix: &[u8]) -> &'static str {
    if prefix.is_empty() {
        return "application/x-empty";
    }
    if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| prefix.starts_with(magic)) {
        return *mime;
    }
    if prefix.len() >= 12 && &prefix[..4] == b"RIFF" && &prefix[8..12] == b"WEBP" {
        return "image/webp";
    }
    if !looks_like_text(prefix) {
        return "application/octet-stream";
    }

    let text = trim_text_start(prefix);
    if starts_with_ignore_case(text, b"<!doctype html") || starts_with_ignore_case(text, b"<html") {
        "text/html"
    } else if text.starts_with(b"<?xml") {
        "text/xml"
    } else {
        "text/plain"
    }
}

/// UTF-8 (allowing a character cut off by the probe length) with no NULs
fn looks_like_text(prefix: &[u8]) -> bool {
    if memchr(0, prefix).is_some() {
        return false;
    }
    match std::str::from_utf8(prefix) {
        Ok(_) => true,
        // `error_len() == None` means the input ended mid-character.
        Err(e) => e.error_len().is_none(),
    }
}

fn trim_text_start(text: &[u8]) -> &[u8] {
    let text = text.strip_prefix(b"\xef\xbb\xbf").unwrap_or(text);
    let start = text
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(text.len());
    &text[start..]
}

fn starts_with_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn signatures() {
        assert_eq!(sniff(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"), "image/png");
        assert_eq!(sniff(b"PK\x03\x04\x14\0"), "application/zip");
        assert_eq!(sniff(b"RIFF\x10\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(sniff(b""), "application/x-empty");
    }

    #[test]
    fn text_flavors() {
        assert_eq!(sniff(b"  <!DOCTYPE html>\n<html>"), "text/html");
        assert_eq!(sniff(b"\xef\xbb\xbf<html lang=\"en\">"), "text/html");
        assert_eq!(sniff(b"<?xml version=\"1.0\"?>"), "text/xml");
        assert_eq!(sniff("body { color: #fff; } /* ünïcödé */".as_bytes()), "text/plain");
    }

    #[test]
    fn truncated_utf8_is_still_text() {
        let text = "aaaä".as_bytes();
        assert_eq!(sniff(&text[..text.len() - 1]), "text/plain");
        assert_eq!(sniff(b"abc\0def"), "application/octet-stream");
        assert_eq!(sniff(b"\xc3\x28 broken"), "application/octet-stream");
    }

    #[test]
    fn closures_are_sniffers() {
        let sniffer = |_: &[u8]| -> Option<String> { None };
        assert_eq!(sniffer.detect(b"anything"), None);
        assert_eq!(
            MagicSniffer.detect(b"hello").as_deref(),
            Some("text/plain")
        );
    }
}
