//! Logical inputs and their resolution to physical data files.
//!
//! A listed input is either a plain record file or a directory-backed file: a
//! directory holding an `index` and the real records in a nested `data` file.
//! The kind is decided once, at listing time, and [`resolve`] turns every
//! input into a [`ResolvedInput`] describing the bytes that will actually be
//! read.

use crate::fs::{BlockLocation, FileSystem};
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Name of the nested data file inside a directory-backed input.
pub const DATA_FILE_NAME: &str = "data";
/// Name of the index file inside a directory-backed input.
pub const INDEX_FILE_NAME: &str = "index";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    Plain,
    DirectoryBacked { nested: PathBuf },
}

/// A logical input as it came out of the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFileRef {
    pub path: PathBuf,
    /// Length reported by the listing. For a directory-backed input this is the
    /// directory's own stat length, not the data length.
    pub len: u64,
    pub blocks: Vec<BlockLocation>,
    pub kind: InputKind,
}

impl InputFileRef {
    pub fn plain(path: impl Into<PathBuf>, len: u64, blocks: Vec<BlockLocation>) -> Self {
        Self {
            path: path.into(),
            len,
            blocks,
            kind: InputKind::Plain,
        }
    }

    /// A directory-backed input whose data lives at `<dir>/data`.
    pub fn directory_backed(dir: impl Into<PathBuf>, dir_len: u64) -> Self {
        let path = dir.into();
        let nested = path.join(DATA_FILE_NAME);
        Self {
            path,
            len: dir_len,
            blocks: Vec::new(),
            kind: InputKind::DirectoryBacked { nested },
        }
    }

    #[must_use]
    pub fn is_directory_backed(&self) -> bool {
        matches!(self.kind, InputKind::DirectoryBacked { .. })
    }
}

/// An input ready for planning: the bytes that will really be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    /// The path the input was listed under.
    pub logical_path: PathBuf,
    /// The physical file holding the records.
    pub data_path: PathBuf,
    pub len: u64,
    pub blocks: Vec<BlockLocation>,
}

impl ResolvedInput {
    /// Hosts of the blocks overlapping `[start, start + len)` with the number
    /// of those bytes each holds, heaviest first (ties by name).
    #[must_use]
    pub fn host_weights(&self, start: u64, len: u64) -> Vec<(String, u64)> {
        let mut weights: Vec<(String, u64)> = Vec::new();
        for block in &self.blocks {
            let bytes = block.overlap(start, len);
            if bytes == 0 {
                continue;
            }
            for host in &block.hosts {
                match weights.iter_mut().find(|(h, _)| h == host) {
                    Some((_, w)) => *w += bytes,
                    None => weights.push((host.clone(), bytes)),
                }
            }
        }
        weights.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        weights
    }

    /// Host names of [`ResolvedInput::host_weights`].
    #[must_use]
    pub fn hosts_for(&self, start: u64, len: u64) -> Vec<String> {
        self.host_weights(start, len)
            .into_iter()
            .map(|(h, _)| h)
            .collect()
    }
}

/// Resolve one input.
///
/// Plain inputs keep their listed length and blocks. Directory-backed inputs
/// take the length and block locations of their nested data file.
///
/// # Errors
///
/// Returns [`Error::Resolution`] if a directory-backed input has no data file,
/// or an I/O error if block locations cannot be fetched.
pub fn resolve_one(fs: &dyn FileSystem, input: &InputFileRef) -> Result<ResolvedInput> {
    match &input.kind {
        InputKind::Plain => Ok(ResolvedInput {
            logical_path: input.path.clone(),
            data_path: input.path.clone(),
            len: input.len,
            blocks: input.blocks.clone(),
        }),
        InputKind::DirectoryBacked { nested } => {
            let status = nested_status(fs, &input.path, nested)?;
            let blocks = fs.block_locations(nested, 0, status.len)?;
            log::debug!(
                "resolved {} to {} ({} bytes)",
                input.path.display(),
                nested.display(),
                status.len
            );
            Ok(ResolvedInput {
                logical_path: input.path.clone(),
                data_path: nested.clone(),
                len: status.len,
                blocks,
            })
        }
    }
}

fn nested_status(
    fs: &dyn FileSystem,
    dir: &Path,
    nested: &Path,
) -> Result<crate::fs::FileStatus> {
    let missing = |source| Error::Resolution {
        dir: dir.to_path_buf(),
        nested: nested.to_path_buf(),
        source,
    };
    let status = fs.status(nested).map_err(missing)?;
    if status.is_dir {
        return Err(missing(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "nested data path is a directory",
        )));
    }
    Ok(status)
}

/// Resolve every input, failing fast on the first bad one.
///
/// # Errors
///
/// See [`resolve_one`].
pub fn resolve(fs: &dyn FileSystem, inputs: &[InputFileRef]) -> Result<Vec<ResolvedInput>> {
    inputs.iter().map(|i| resolve_one(fs, i)).collect()
}
