//! Finding entries by name.
//!
//! Archives don't store directories as such, just a flat list of names.
//! Everything directory-like is answered by prefix checks over that list,
//! in the archive's own order. Matching is case-sensitive.

use memchr::memchr;

use crate::decoder::RawEntry;

/// An entry's name as used for matching.
///
/// Some formats mark directories with a trailing slash (`docs/`) and some
/// don't (`docs`); both match the path `docs`.
pub fn entry_key(name: &str) -> &str {
    name.strip_suffix('/').unwrap_or(name)
}

/// Finds the entry named exactly `path`, along with its position in `entries`.
pub fn find<'e>(entries: &'e [RawEntry], path: &str) -> Option<(usize, &'e RawEntry)> {
    entries
        .iter()
        .enumerate()
        .find(|(_, entry)| entry_key(&entry.name) == path)
}

/// Returns the entries under the directory `path`, in archive order.
///
/// Non-recursive listings only include entries directly in `path`.
/// An empty `path` lists from the top of the archive.
pub fn children<'e>(
    entries: &'e [RawEntry],
    path: &str,
    recursive: bool,
) -> Vec<(usize, &'e RawEntry)> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| is_child(entry_key(&entry.name), path, recursive))
        .collect()
}

fn is_child(key: &str, path: &str, recursive: bool) -> bool {
    // An entry is never its own ancestor.
    if !path.is_empty() && (!key.starts_with(path) || key == path) {
        return false;
    }
    if !recursive {
        // Skip the separator right after `path`; any later one means
        // the entry is at least two levels down.
        let deeper = key
            .as_bytes()
            .get(path.len() + 1..)
            .map_or(false, |rest| memchr(b'/', rest).is_some());
        if deeper {
            return false;
        }
    }
    true
}
