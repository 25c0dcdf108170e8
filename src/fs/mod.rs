//! Filesystem abstractions consumed by the planner and the readers.
//!
//! The planner only needs metadata (listing, stat, block locations) and the
//! readers only need a seekable byte stream per file, so the [`FileSystem`]
//! trait is kept to exactly those calls. Two implementations ship with the
//! crate:
//!
//! - [`LocalFileSystem`] - the host filesystem, with synthetic block
//!   locations computed from a fixed block size and host list
//! - [`FakeFileSystem`] - an in-memory filesystem for unit tests, with
//!   injectable hosts, block layouts, and open failures
//!
//! All operations are synchronous. Implementations must be `Send + Sync` so a
//! single instance can be shared by readers running on different threads.

mod fake;
mod local;

pub use fake::FakeFileSystem;
pub use local::LocalFileSystem;

use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

/// A readable, seekable handle to one file.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Metadata for a file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub path: PathBuf,
    pub len: u64,
    pub is_dir: bool,
    pub block_size: u64,
}

impl FileStatus {
    /// Final path component as a string, or an empty string for roots.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

/// Hosts serving one block of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLocation {
    pub offset: u64,
    pub length: u64,
    pub hosts: Vec<String>,
}

impl BlockLocation {
    pub fn new(offset: u64, length: u64, hosts: Vec<String>) -> Self {
        Self {
            offset,
            length,
            hosts,
        }
    }

    /// Number of bytes this block shares with `[start, start + len)`.
    #[must_use]
    pub fn overlap(&self, start: u64, len: u64) -> u64 {
        let lo = self.offset.max(start);
        let hi = (self.offset + self.length).min(start + len);
        hi.saturating_sub(lo)
    }
}

/// Metadata and data access to a (possibly distributed) filesystem.
pub trait FileSystem: Send + Sync {
    /// Stat a single path.
    ///
    /// # Errors
    ///
    /// Returns `io::ErrorKind::NotFound` if the path does not exist.
    fn status(&self, path: &Path) -> io::Result<FileStatus>;

    /// List the direct children of a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` does not exist or is not a directory.
    fn list_status(&self, dir: &Path) -> io::Result<Vec<FileStatus>>;

    /// Block locations overlapping `[start, start + len)` of a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist.
    fn block_locations(&self, path: &Path, start: u64, len: u64) -> io::Result<Vec<BlockLocation>>;

    /// Expand a glob pattern into matching paths, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is invalid or the listing fails.
    fn glob(&self, pattern: &str) -> crate::Result<Vec<PathBuf>>;

    /// Open a file for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be read.
    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>>;
}

/// Split `[0, len)` into fixed-size blocks, each served by `hosts`.
pub(crate) fn uniform_blocks(
    len: u64,
    block_size: u64,
    hosts: &[String],
    start: u64,
    range: u64,
) -> Vec<BlockLocation> {
    let block_size = block_size.max(1);
    let end = start.saturating_add(range).min(len);
    let mut out = Vec::new();
    let mut offset = (start / block_size) * block_size;
    while offset < end {
        let length = block_size.min(len - offset);
        out.push(BlockLocation::new(offset, length, hosts.to_vec()));
        offset += length;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_clipped_to_both_ranges() {
        let b = BlockLocation::new(100, 50, vec![]);
        assert_eq!(b.overlap(0, 100), 0);
        assert_eq!(b.overlap(0, 120), 20);
        assert_eq!(b.overlap(120, 100), 30);
        assert_eq!(b.overlap(110, 10), 10);
        assert_eq!(b.overlap(150, 10), 0);
    }

    #[test]
    fn uniform_blocks_cover_requested_range_only() {
        let hosts = vec!["h1".to_string()];
        let all = uniform_blocks(250, 100, &hosts, 0, 250);
        assert_eq!(all.len(), 3);
        assert_eq!(all[2], BlockLocation::new(200, 50, hosts.clone()));

        let tail = uniform_blocks(250, 100, &hosts, 150, 100);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].offset, 100);

        assert!(uniform_blocks(0, 100, &hosts, 0, 0).is_empty());
    }
}
