//! Record files on the local filesystem for tests.
//!
//! [`TempDirPath`] owns a temporary directory that is removed on drop and
//! knows how to lay out plain and directory-backed record files inside it.

use crate::Result;
use crate::codec::{Record, RecordCodec, RecordWriter, SeqFileCodec};
use crate::fs::LocalFileSystem;
use crate::input::{DATA_FILE_NAME, INDEX_FILE_NAME};
use crate::split::SplitComponent;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory that is automatically deleted when dropped.
pub struct TempDirPath {
    #[allow(dead_code)]
    temp_dir: TempDir,
    path: PathBuf,
}

impl TempDirPath {
    /// Create a new temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().to_path_buf();
        Ok(Self { temp_dir, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.path.join(relative)
    }

    /// The directory as a glob root, with `suffix` appended.
    #[must_use]
    pub fn pattern(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.path.display())
    }

    /// Write `records` as a sequence file at `relative`, creating parent
    /// directories. Returns the file's path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_seqfile(&self, relative: impl AsRef<Path>, records: &[Record]) -> Result<PathBuf> {
        let path = self.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = RecordWriter::create(&path)?;
        for record in records {
            writer.append_record(record)?;
        }
        writer.finish()?;
        Ok(path)
    }

    /// Write a directory-backed input at `relative`: the records go to its
    /// nested data file next to an index file. Returns the directory's path.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be written.
    pub fn write_map_file(
        &self,
        relative: impl AsRef<Path>,
        records: &[Record],
    ) -> Result<PathBuf> {
        let dir = self.join(relative);
        self.write_seqfile(dir.join(DATA_FILE_NAME), records)?;
        // The index content is never read; only its presence matters.
        fs::write(dir.join(INDEX_FILE_NAME), b"")?;
        Ok(dir)
    }

    /// Write raw bytes at `relative`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_bytes(&self, relative: impl AsRef<Path>, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

/// Read every record of a local sequence file, start to end.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or decoded.
pub fn read_seqfile(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let len = fs::metadata(path)?.len();
    let component = SplitComponent::new(path, 0, len);
    let mut stream = SeqFileCodec.open_range(&LocalFileSystem::new(), &component)?;
    let mut out = Vec::new();
    while let Some(record) = stream.next_record()? {
        out.push(record);
    }
    Ok(out)
}
