//! Input-file parsing and the immutable lookup tables built from it
//!
//! Three operator-supplied files drive a scan:
//! - the mapping file (`-i`): `u:<old> <new>` / `g:<old> <new>` lines
//! - the roots file (`-d`): one filesystem root per line
//! - the exclusion file (`-e`): one basename per line
//!
//! All three share the same line conventions: empty lines and lines starting
//! with `#` are ignored. Malformed or duplicate entries are warned about and
//! skipped; only an unopenable file is fatal.
//!
//! The tables are immutable after load and read by every worker without
//! synchronization.

use crate::error::InputError;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A single old -> new identifier mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdPair {
    /// Identifier to match against
    pub old: u32,

    /// Identifier to assign on match
    pub new: u32,
}

/// Ordered table of old -> new identifier mappings
///
/// Queried by linear scan; the first pair whose `old` matches wins. The
/// table rejects duplicate `old` values at load time, so in practice every
/// probe matches at most one pair.
#[derive(Debug, Default, Clone)]
pub struct IdMap {
    pairs: Vec<IdPair>,
}

impl IdMap {
    /// Create an empty table
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Append a mapping, rejecting duplicate `old` values.
    ///
    /// Returns `false` (keeping the first occurrence) if `old` is already
    /// present.
    pub fn push(&mut self, old: u32, new: u32) -> bool {
        if self.pairs.iter().any(|p| p.old == old) {
            return false;
        }
        self.pairs.push(IdPair { old, new });
        true
    }

    /// Look up the replacement for `old`, if any
    pub fn lookup(&self, old: u32) -> Option<u32> {
        self.pairs.iter().find(|p| p.old == old).map(|p| p.new)
    }

    /// Number of mappings in the table
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Check whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterate over the mappings in load order
    pub fn iter(&self) -> impl Iterator<Item = &IdPair> {
        self.pairs.iter()
    }
}

/// The UID and GID mapping tables parsed from the `-i` file
#[derive(Debug, Default, Clone)]
pub struct Mappings {
    /// Old uid -> new uid
    pub uids: IdMap,

    /// Old gid -> new gid
    pub gids: IdMap,
}

/// Parse the mapping file.
///
/// Grammar per line: `u:<old> <new>` or `g:<old> <new>`. The tag is
/// case-insensitive; old and new ids are separated by one or more spaces,
/// tabs or commas. Malformed lines are logged and skipped.
pub fn parse_mapping_file(path: &Path) -> Result<Mappings, InputError> {
    let file = File::open(path).map_err(|source| InputError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;

    let mut mappings = Mappings::default();

    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(file = %path.display(), line = lineno + 1, error = %e, "Unreadable line skipped");
                continue;
            }
        };
        if is_skippable(&line) {
            continue;
        }

        match parse_mapping_line(&line) {
            Some((Tag::Uid, old, new)) => {
                if !mappings.uids.push(old, new) {
                    warn!(line = lineno + 1, old, "Duplicate old uid, keeping first mapping");
                }
            }
            Some((Tag::Gid, old, new)) => {
                if !mappings.gids.push(old, new) {
                    warn!(line = lineno + 1, old, "Duplicate old gid, keeping first mapping");
                }
            }
            None => {
                warn!(line = lineno + 1, content = %line, "Mangled mapping line skipped");
            }
        }
    }

    info!(
        uids = mappings.uids.len(),
        gids = mappings.gids.len(),
        "Mapping tables loaded"
    );
    Ok(mappings)
}

enum Tag {
    Uid,
    Gid,
}

fn parse_mapping_line(line: &str) -> Option<(Tag, u32, u32)> {
    let (tag, rest) = line.split_once(':')?;
    let tag = tag.trim();
    let tag = if tag.eq_ignore_ascii_case("u") {
        Tag::Uid
    } else if tag.eq_ignore_ascii_case("g") {
        Tag::Gid
    } else {
        return None;
    };

    let mut ids = rest
        .split(|c: char| c == ' ' || c == '\t' || c == ',')
        .filter(|t| !t.is_empty());
    let old = ids.next()?.parse().ok()?;
    let new = ids.next()?.parse().ok()?;
    if ids.next().is_some() {
        return None;
    }
    Some((tag, old, new))
}

/// Parse the roots file into an ordered, duplicate-free list of paths.
///
/// Duplicates are warned about and dropped. An empty list is an error: there
/// is nothing to scan.
pub fn parse_roots_file(path: &Path) -> Result<Vec<PathBuf>, InputError> {
    let file = File::open(path).map_err(|source| InputError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;

    let mut roots: Vec<PathBuf> = Vec::new();

    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(file = %path.display(), line = lineno + 1, error = %e, "Unreadable line skipped");
                continue;
            }
        };
        if is_skippable(&line) {
            continue;
        }

        let root = PathBuf::from(line.trim_end());
        if roots.contains(&root) {
            warn!(root = %root.display(), "Duplicate root ignored");
            continue;
        }
        roots.push(root);
    }

    if roots.is_empty() {
        return Err(InputError::NoRoots);
    }
    info!(count = roots.len(), "Root list loaded");
    Ok(roots)
}

/// Immutable set of basenames excluded from the scan
///
/// Matched by equality against each directory-entry basename. An excluded
/// directory is never opened, so nothing beneath it is visited.
#[derive(Debug, Default, Clone)]
pub struct ExcludeFilter {
    names: Vec<OsString>,
}

impl ExcludeFilter {
    /// A filter that excludes nothing (no `-e` file given)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check whether `name` is excluded
    pub fn matches(&self, name: &OsStr) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Number of exclusion entries
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check whether the filter excludes nothing
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate over the excluded basenames in load order
    pub fn iter(&self) -> impl Iterator<Item = &OsString> {
        self.names.iter()
    }
}

/// Parse the exclusion file
pub fn parse_exclude_file(path: &Path) -> Result<ExcludeFilter, InputError> {
    let file = File::open(path).map_err(|source| InputError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;

    let mut names: Vec<OsString> = Vec::new();

    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(file = %path.display(), line = lineno + 1, error = %e, "Unreadable line skipped");
                continue;
            }
        };
        if is_skippable(&line) {
            continue;
        }

        let name = OsString::from(line.trim_end());
        if names.iter().any(|n| n == &name) {
            warn!(name = %name.to_string_lossy(), "Duplicate exclusion ignored");
            continue;
        }
        names.push(name);
    }

    info!(count = names.len(), "Exclusion list loaded");
    Ok(ExcludeFilter { names })
}

fn is_skippable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}
