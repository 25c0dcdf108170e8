//! Host filesystem implementation of [`FileSystem`].

use super::{BlockLocation, FileStatus, FileSystem, ReadSeek, uniform_blocks};
use crate::{Error, Result};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Default synthetic block size (64 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024 * 1024;

/// The local filesystem.
///
/// A local disk has no block placement, so block locations are synthesized:
/// every file is cut into `block_size` blocks and every block is reported as
/// served by all of `hosts`.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    block_size: u64,
    hosts: Vec<String>,
}

impl Default for LocalFileSystem {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            hosts: vec!["localhost".to_string()],
        }
    }
}

impl LocalFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    #[must_use]
    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    fn to_status(&self, path: PathBuf, meta: &fs::Metadata) -> FileStatus {
        FileStatus {
            path,
            len: if meta.is_dir() { 0 } else { meta.len() },
            is_dir: meta.is_dir(),
            block_size: self.block_size,
        }
    }
}

impl FileSystem for LocalFileSystem {
    fn status(&self, path: &Path) -> io::Result<FileStatus> {
        let meta = fs::metadata(path)?;
        Ok(self.to_status(path.to_path_buf(), &meta))
    }

    fn list_status(&self, dir: &Path) -> io::Result<Vec<FileStatus>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            out.push(self.to_status(entry.path(), &meta));
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    fn block_locations(&self, path: &Path, start: u64, len: u64) -> io::Result<Vec<BlockLocation>> {
        let status = self.status(path)?;
        Ok(uniform_blocks(
            status.len,
            self.block_size,
            &self.hosts,
            start,
            len,
        ))
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let paths = glob::glob(pattern).map_err(|source| Error::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let mut result = Vec::new();
        for entry in paths {
            let path = entry.map_err(glob::GlobError::into_error)?;
            result.push(path);
        }
        result.sort();
        Ok(result)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        let file = File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}
