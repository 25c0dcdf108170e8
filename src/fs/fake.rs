//! In-memory [`FileSystem`] for tests.
//!
//! Files can carry real bytes or be "sized" (a length with no stored content,
//! read back as zeros), which lets planner tests describe multi-megabyte
//! inputs cheaply. Block locations, hosts, and open failures can be injected
//! per file, and every opened handle is counted so tests can assert how many
//! are live at once.

use super::{BlockLocation, FileStatus, FileSystem, ReadSeek, uniform_blocks};
use crate::{Error, Result};
use glob::{MatchOptions, Pattern};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const FAKE_BLOCK_SIZE: u64 = 128 * 1024 * 1024;

#[derive(Clone)]
enum Content {
    Bytes(Arc<Vec<u8>>),
    Sized(u64),
}

impl Content {
    fn len(&self) -> u64 {
        match self {
            Self::Bytes(b) => b.len() as u64,
            Self::Sized(n) => *n,
        }
    }
}

#[derive(Clone)]
struct FakeFile {
    content: Content,
    blocks: Option<Vec<BlockLocation>>,
}

#[derive(Default)]
struct State {
    files: BTreeMap<PathBuf, FakeFile>,
    dirs: BTreeMap<PathBuf, u64>,
    failing: HashSet<PathBuf>,
}

#[derive(Default)]
struct HandleCounters {
    live: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

/// An in-memory filesystem. Cloning shares the underlying state.
#[derive(Clone)]
pub struct FakeFileSystem {
    state: Arc<Mutex<State>>,
    counters: Arc<HandleCounters>,
    hosts: Vec<String>,
    block_size: u64,
}

impl Default for FakeFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            counters: Arc::new(HandleCounters::default()),
            hosts: vec!["localhost".to_string()],
            block_size: FAKE_BLOCK_SIZE,
        }
    }

    /// Hosts reported for files added without explicit block locations.
    #[must_use]
    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake filesystem mutex poisoned")
    }

    fn insert(&self, path: impl Into<PathBuf>, file: FakeFile) {
        let path = path.into();
        let mut state = self.state();
        for parent in path.ancestors().skip(1) {
            if parent.as_os_str().is_empty() {
                break;
            }
            state.dirs.entry(parent.to_path_buf()).or_insert(0);
        }
        state.files.insert(path, file);
    }

    /// Add a file holding `data`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_file(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.insert(
            path,
            FakeFile {
                content: Content::Bytes(Arc::new(data.into())),
                blocks: None,
            },
        );
    }

    /// Add a file holding `data` whose blocks are all served by `hosts`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_file_on(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>, hosts: &[&str]) {
        let data = data.into();
        let hosts: Vec<String> = hosts.iter().map(|h| (*h).to_string()).collect();
        let len = data.len() as u64;
        self.insert(
            path,
            FakeFile {
                content: Content::Bytes(Arc::new(data)),
                blocks: Some(uniform_blocks(len, self.block_size, &hosts, 0, len)),
            },
        );
    }

    /// Add a file of `len` bytes whose content reads back as zeros.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_sized_file(&self, path: impl Into<PathBuf>, len: u64) {
        self.insert(
            path,
            FakeFile {
                content: Content::Sized(len),
                blocks: None,
            },
        );
    }

    /// Add a sized file with an explicit block layout.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_sized_file_with_blocks(
        &self,
        path: impl Into<PathBuf>,
        len: u64,
        blocks: Vec<BlockLocation>,
    ) {
        self.insert(
            path,
            FakeFile {
                content: Content::Sized(len),
                blocks: Some(blocks),
            },
        );
    }

    /// Add a sized file whose blocks are all served by `hosts`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_sized_file_on(&self, path: impl Into<PathBuf>, len: u64, hosts: &[&str]) {
        let hosts: Vec<String> = hosts.iter().map(|h| (*h).to_string()).collect();
        let blocks = uniform_blocks(len, self.block_size, &hosts, 0, len);
        self.add_sized_file_with_blocks(path, len, blocks);
    }

    /// Add an (empty) directory, reporting `len` as its stat length.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_dir(&self, path: impl Into<PathBuf>, len: u64) {
        let path = path.into();
        let mut state = self.state();
        for parent in path.ancestors().skip(1) {
            if parent.as_os_str().is_empty() {
                break;
            }
            state.dirs.entry(parent.to_path_buf()).or_insert(0);
        }
        state.dirs.insert(path, len);
    }

    /// Make every later `open` of `path` fail.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_open(&self, path: impl Into<PathBuf>) {
        self.state().failing.insert(path.into());
    }

    /// Remove a file, e.g. to simulate it vanishing between planning and reading.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn remove(&self, path: &Path) -> bool {
        self.state().files.remove(path).is_some()
    }

    /// Handles currently open.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Highest number of handles that were ever open at the same time.
    #[must_use]
    pub fn peak_open_handles(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Number of successful `open` calls so far.
    #[must_use]
    pub fn total_opens(&self) -> usize {
        self.counters.total.load(Ordering::SeqCst)
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        )
    }
}

impl FileSystem for FakeFileSystem {
    fn status(&self, path: &Path) -> io::Result<FileStatus> {
        let state = self.state();
        if let Some(f) = state.files.get(path) {
            return Ok(FileStatus {
                path: path.to_path_buf(),
                len: f.content.len(),
                is_dir: false,
                block_size: self.block_size,
            });
        }
        if let Some(len) = state.dirs.get(path) {
            return Ok(FileStatus {
                path: path.to_path_buf(),
                len: *len,
                is_dir: true,
                block_size: self.block_size,
            });
        }
        Err(Self::not_found(path))
    }

    fn list_status(&self, dir: &Path) -> io::Result<Vec<FileStatus>> {
        let children: BTreeSet<PathBuf> = {
            let state = self.state();
            if !state.dirs.contains_key(dir) {
                return Err(Self::not_found(dir));
            }
            state
                .files
                .keys()
                .chain(state.dirs.keys())
                .filter(|p| p.parent() == Some(dir))
                .cloned()
                .collect()
        };
        children.iter().map(|p| self.status(p)).collect()
    }

    fn block_locations(&self, path: &Path, start: u64, len: u64) -> io::Result<Vec<BlockLocation>> {
        let state = self.state();
        let file = state.files.get(path).ok_or_else(|| Self::not_found(path))?;
        let total = file.content.len();
        Ok(match &file.blocks {
            Some(blocks) => blocks
                .iter()
                .filter(|b| b.overlap(start, len) > 0)
                .cloned()
                .collect(),
            None => uniform_blocks(total, self.block_size, &self.hosts, start, len),
        })
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let compiled = Pattern::new(pattern).map_err(|source| Error::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        let state = self.state();
        let mut out: Vec<PathBuf> = state
            .files
            .keys()
            .chain(state.dirs.keys())
            .filter(|p| compiled.matches_path_with(p, options))
            .cloned()
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        let content = {
            let state = self.state();
            if state.failing.contains(path) {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("injected open failure for {}", path.display()),
                ));
            }
            state
                .files
                .get(path)
                .ok_or_else(|| Self::not_found(path))?
                .content
                .clone()
        };

        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(live, Ordering::SeqCst);
        self.counters.total.fetch_add(1, Ordering::SeqCst);

        let inner: Box<dyn ReadSeek> = match content {
            Content::Bytes(bytes) => Box::new(Cursor::new(SharedBytes(bytes))),
            Content::Sized(len) => Box::new(Zeros { len, pos: 0 }),
        };
        Ok(Box::new(CountedHandle {
            inner,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

struct Zeros {
    len: u64,
    pos: u64,
}

impl Read for Zeros {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.len.saturating_sub(self.pos);
        let n = (buf.len() as u64).min(left) as usize;
        buf[..n].fill(0);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for Zeros {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let next = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(d) => self.len.checked_add_signed(d),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
        };
        self.pos = next.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        Ok(self.pos)
    }
}

struct CountedHandle {
    inner: Box<dyn ReadSeek>,
    counters: Arc<HandleCounters>,
}

impl Read for CountedHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for CountedHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Drop for CountedHandle {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn status_and_listing_include_implicit_dirs() -> anyhow::Result<()> {
        let fs = FakeFileSystem::new();
        fs.add_file("/in/a", b"abc".to_vec());
        fs.add_sized_file("/in/m/data", 10);
        fs.add_dir("/in/empty", 4096);

        let listed = fs.list_status(Path::new("/in"))?;
        let names: Vec<&str> = listed.iter().map(FileStatus::name).collect();
        assert_eq!(names, vec!["a", "empty", "m"]);
        assert!(listed[1].is_dir);
        assert_eq!(listed[1].len, 4096);
        assert_eq!(fs.status(Path::new("/in/m/data"))?.len, 10);
        Ok(())
    }

    #[test]
    fn handles_are_counted_until_dropped() -> anyhow::Result<()> {
        let fs = FakeFileSystem::new();
        fs.add_file("/f", b"hello".to_vec());
        let mut h1 = fs.open(Path::new("/f"))?;
        let h2 = fs.open(Path::new("/f"))?;
        assert_eq!(fs.open_handles(), 2);
        drop(h2);
        let mut s = String::new();
        h1.read_to_string(&mut s)?;
        assert_eq!(s, "hello");
        drop(h1);
        assert_eq!(fs.open_handles(), 0);
        assert_eq!(fs.peak_open_handles(), 2);
        assert_eq!(fs.total_opens(), 2);
        Ok(())
    }

    #[test]
    fn injected_failures_and_sized_reads() -> anyhow::Result<()> {
        let fs = FakeFileSystem::new();
        fs.add_sized_file("/zeros", 6);
        fs.add_file("/bad", b"x".to_vec());
        fs.fail_open("/bad");

        assert!(fs.open(Path::new("/bad")).is_err());
        assert_eq!(fs.open_handles(), 0);

        let mut buf = Vec::new();
        let mut h = fs.open(Path::new("/zeros"))?;
        h.seek(SeekFrom::Start(2))?;
        h.read_to_end(&mut buf)?;
        assert_eq!(buf, vec![0u8; 4]);
        Ok(())
    }

    #[test]
    fn glob_does_not_cross_separators() -> anyhow::Result<()> {
        let fs = FakeFileSystem::new();
        fs.add_file("/logs/a.seq", Vec::<u8>::new());
        fs.add_file("/logs/deep/b.seq", Vec::<u8>::new());
        let hits = fs.glob("/logs/*.seq")?;
        assert_eq!(hits, vec![PathBuf::from("/logs/a.seq")]);
        Ok(())
    }

    #[test]
    fn explicit_blocks_are_filtered_by_range() -> anyhow::Result<()> {
        let fs = FakeFileSystem::new();
        fs.add_sized_file_with_blocks(
            "/f",
            200,
            vec![
                BlockLocation::new(0, 100, vec!["h1".into()]),
                BlockLocation::new(100, 100, vec!["h2".into()]),
            ],
        );
        let blocks = fs.block_locations(Path::new("/f"), 120, 50)?;
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].hosts, vec!["h2".to_string()]);
        Ok(())
    }
}
