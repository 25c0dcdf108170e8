//! Pre-built records, clusters and scripted streams.

use crate::codec::{Record, RecordCodec, RecordStream, RecordWriter, SyncMarker};
use crate::fs::FakeFileSystem;
use crate::input::{DATA_FILE_NAME, INDEX_FILE_NAME};
use crate::split::SplitComponent;
use crate::{Error, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// `count` records keyed `"{prefix}-{i:06}"`, each value `value_len` bytes of
/// the record's index.
///
/// # Example
///
/// ```
/// use seqcombine::testing::numbered_records;
///
/// let records = numbered_records("k", 3, 4);
/// assert_eq!(records[2].key, b"k-000002");
/// assert_eq!(records[2].value, vec![2, 2, 2, 2]);
/// ```
#[must_use]
pub fn numbered_records(prefix: &str, count: usize, value_len: usize) -> Vec<Record> {
    (0..count)
        .map(|i| Record::new(format!("{prefix}-{i:06}"), vec![i as u8; value_len]))
        .collect()
}

/// Encode `records` as an in-memory sequence file.
///
/// The sync marker is derived from `seed`, so the same inputs always produce
/// the same bytes.
///
/// # Errors
///
/// Returns an error if a record is too large to encode.
pub fn seqfile_bytes(seed: &str, records: &[Record]) -> Result<Vec<u8>> {
    let mut writer = RecordWriter::new(Vec::new(), SyncMarker::derive(seed.as_bytes()))?;
    for record in records {
        writer.append_record(record)?;
    }
    writer.finish()
}

/// Builder for a [`FakeFileSystem`] laid out like a small cluster.
///
/// # Example
///
/// ```
/// use seqcombine::testing::FakeCluster;
/// use seqcombine::fs::FileSystem;
/// use std::path::Path;
///
/// let fs = FakeCluster::new()
///     .block_size(1024)
///     .file("/in/a", 4096, &["n1", "n2"])
///     .map_file("/in/m", 2048, &["n3"])
///     .build();
/// assert_eq!(fs.block_locations(Path::new("/in/a"), 0, 4096).unwrap().len(), 4);
/// ```
#[derive(Clone)]
pub struct FakeCluster {
    fs: FakeFileSystem,
}

impl FakeCluster {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fs: FakeFileSystem::new(),
        }
    }

    /// Block size used for files added after this call.
    #[must_use]
    pub fn block_size(mut self, block_size: u64) -> Self {
        self.fs = self.fs.with_block_size(block_size);
        self
    }

    /// A zero-filled file of `len` bytes whose blocks live on `hosts`.
    #[must_use]
    pub fn file(self, path: &str, len: u64, hosts: &[&str]) -> Self {
        self.fs.add_sized_file_on(path, len, hosts);
        self
    }

    /// A directory-backed input whose nested data file has `data_len` bytes.
    #[must_use]
    pub fn map_file(self, dir: &str, data_len: u64, hosts: &[&str]) -> Self {
        let dir = Path::new(dir);
        self.fs.add_dir(dir, 0);
        self.fs.add_sized_file_on(dir.join(DATA_FILE_NAME), data_len, hosts);
        self.fs.add_sized_file_on(dir.join(INDEX_FILE_NAME), 64, hosts);
        self
    }

    /// A real sequence file holding `records`, with blocks on `hosts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be encoded.
    pub fn seqfile(self, path: &str, records: &[Record], hosts: &[&str]) -> Result<Self> {
        let bytes = seqfile_bytes(path, records)?;
        if hosts.is_empty() {
            self.fs.add_file(path, bytes);
        } else {
            self.fs.add_file_on(path, bytes, hosts);
        }
        Ok(self)
    }

    /// A directory-backed input whose nested data file holds `records`.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be encoded.
    pub fn map_seqfile(self, dir: &str, records: &[Record]) -> Result<Self> {
        let dir = Path::new(dir);
        let data = dir.join(DATA_FILE_NAME);
        self.fs.add_dir(dir, 0);
        self.fs
            .add_file(&data, seqfile_bytes(&data.to_string_lossy(), records)?);
        self.fs.add_file(dir.join(INDEX_FILE_NAME), Vec::<u8>::new());
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> FakeFileSystem {
        self.fs
    }
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// One scripted outcome of [`RecordStream::next_record`].
#[derive(Debug, Clone)]
pub enum Step {
    /// Yield `record`, leaving the stream `offset` bytes into its range.
    Record { record: Record, offset: u64 },
    /// Fail with a decode error.
    Corrupt,
}

impl Step {
    /// A record keyed `key` with an empty value.
    #[must_use]
    pub fn record(key: &str, offset: u64) -> Self {
        Self::Record {
            record: Record::new(key, Vec::new()),
            offset,
        }
    }
}

/// A [`RecordCodec`] whose streams replay scripted steps per path.
///
/// Streams ignore the filesystem and report positions relative to their
/// component's start. Open and live stream counts are tracked so tests can
/// check how many streams a reader holds at once.
#[derive(Clone, Default)]
pub struct ScriptedCodec {
    scripts: HashMap<PathBuf, Vec<Step>>,
    failing: HashSet<PathBuf>,
    live: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    opens: Arc<AtomicUsize>,
}

impl ScriptedCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the stream opened for `path`.
    #[must_use]
    pub fn component(mut self, path: impl Into<PathBuf>, steps: Vec<Step>) -> Self {
        self.scripts.insert(path.into(), steps);
        self
    }

    /// Make opening `path` fail.
    #[must_use]
    pub fn failing(mut self, path: impl Into<PathBuf>) -> Self {
        self.failing.insert(path.into());
        self
    }

    #[must_use]
    pub fn total_opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn peak_open_streams(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl RecordCodec for ScriptedCodec {
    fn sync_interval(&self) -> u64 {
        1
    }

    fn open_range(
        &self,
        _fs: &dyn crate::fs::FileSystem,
        component: &SplitComponent,
    ) -> Result<Box<dyn RecordStream>> {
        let not_found = || {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no script for {}", component.path.display()),
            ))
        };
        if self.failing.contains(&component.path) {
            return Err(not_found());
        }
        let steps = self.scripts.get(&component.path).ok_or_else(not_found)?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            path: component.path.clone(),
            start: component.start,
            pos: component.start,
            steps: steps.iter().cloned().collect(),
            live: Arc::clone(&self.live),
        }))
    }
}

struct ScriptedStream {
    path: PathBuf,
    start: u64,
    pos: u64,
    steps: VecDeque<Step>,
    live: Arc<AtomicUsize>,
}

impl RecordStream for ScriptedStream {
    fn next_record(&mut self) -> Result<Option<Record>> {
        match self.steps.pop_front() {
            None => Ok(None),
            Some(Step::Record { record, offset }) => {
                self.pos = self.start + offset;
                Ok(Some(record))
            }
            Some(Step::Corrupt) => Err(Error::decode(&self.path, self.pos, "scripted corruption")),
        }
    }

    fn position(&self) -> u64 {
        self.pos
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
