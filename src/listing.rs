//! Turning input patterns into [`InputFileRef`]s.
//!
//! Each root is a glob pattern (a plain path is a pattern that matches itself).
//! Matches are expanded one level:
//!
//! - a file is a plain input
//! - a directory that holds both `data` and `index` is one directory-backed input
//! - any other directory contributes its children: files as plain inputs,
//!   sub-directories as directory-backed inputs
//!
//! Hidden entries (names starting with `_` or `.`) are skipped at every level,
//! and the result is sorted by path and de-duplicated so planning is
//! reproducible for a given listing.
//!
//! # Examples
//!
//! ```no_run
//! use seqcombine::fs::LocalFileSystem;
//! use seqcombine::listing::list_inputs;
//!
//! let fs = LocalFileSystem::new();
//! let inputs = list_inputs(&fs, &["logs/2024-*/part-*", "lookup/"])?;
//! # Ok::<(), seqcombine::Error>(())
//! ```

use crate::fs::{FileStatus, FileSystem};
use crate::input::{DATA_FILE_NAME, INDEX_FILE_NAME, InputFileRef};
use crate::{Error, Result};
use std::path::Path;

/// True for names the listing ignores.
#[must_use]
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('_') || name.starts_with('.')
}

/// List every input matched by `roots`.
///
/// # Errors
///
/// Returns [`Error::NoInputMatch`] for a root that matches nothing,
/// [`Error::Pattern`] for an invalid pattern, or an I/O error from the
/// filesystem.
pub fn list_inputs<S: AsRef<str>>(fs: &dyn FileSystem, roots: &[S]) -> Result<Vec<InputFileRef>> {
    let mut out = Vec::new();
    for root in roots {
        let pattern = root.as_ref();
        let matches = fs.glob(pattern)?;
        if matches.is_empty() {
            return Err(Error::NoInputMatch(pattern.to_string()));
        }
        for path in matches {
            let status = fs.status(&path)?;
            if is_hidden(status.name()) {
                continue;
            }
            list_one(fs, &status, &mut out)?;
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out.dedup_by(|a, b| a.path == b.path);
    log::debug!("listed {} inputs from {} roots", out.len(), roots.len());
    Ok(out)
}

fn list_one(fs: &dyn FileSystem, status: &FileStatus, out: &mut Vec<InputFileRef>) -> Result<()> {
    if !status.is_dir {
        out.push(plain(fs, status)?);
        return Ok(());
    }
    if looks_directory_backed(fs, &status.path) {
        out.push(InputFileRef::directory_backed(&status.path, status.len));
        return Ok(());
    }
    for child in fs.list_status(&status.path)? {
        if is_hidden(child.name()) {
            continue;
        }
        if child.is_dir {
            out.push(InputFileRef::directory_backed(&child.path, child.len));
        } else {
            out.push(plain(fs, &child)?);
        }
    }
    Ok(())
}

fn plain(fs: &dyn FileSystem, status: &FileStatus) -> Result<InputFileRef> {
    let blocks = fs.block_locations(&status.path, 0, status.len)?;
    Ok(InputFileRef::plain(&status.path, status.len, blocks))
}

fn looks_directory_backed(fs: &dyn FileSystem, dir: &Path) -> bool {
    let is_file = |name: &str| fs.status(&dir.join(name)).is_ok_and(|s| !s.is_dir);
    is_file(DATA_FILE_NAME) && is_file(INDEX_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FakeFileSystem;
    use crate::input::InputKind;
    use std::path::PathBuf;

    fn cluster() -> FakeFileSystem {
        let fs = FakeFileSystem::new();
        fs.add_sized_file("/in/a.seq", 10);
        fs.add_sized_file("/in/b.seq", 20);
        fs.add_sized_file("/in/_SUCCESS", 0);
        fs.add_sized_file("/in/.a.seq.crc", 4);
        fs.add_sized_file("/in/map1/data", 30);
        fs.add_sized_file("/in/map1/index", 3);
        fs.add_sized_file("/solo/data", 40);
        fs.add_sized_file("/solo/index", 4);
        fs
    }

    #[test]
    fn directory_children_are_listed_and_tagged() -> anyhow::Result<()> {
        let fs = cluster();
        let inputs = list_inputs(&fs, &["/in"])?;
        let paths: Vec<PathBuf> = inputs.iter().map(|i| i.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/in/a.seq"),
                PathBuf::from("/in/b.seq"),
                PathBuf::from("/in/map1"),
            ]
        );
        assert_eq!(inputs[1].len, 20);
        assert_eq!(
            inputs[2].kind,
            InputKind::DirectoryBacked {
                nested: PathBuf::from("/in/map1/data")
            }
        );
        Ok(())
    }

    #[test]
    fn a_directory_backed_root_is_one_input() -> anyhow::Result<()> {
        let fs = cluster();
        let inputs = list_inputs(&fs, &["/solo"])?;
        assert_eq!(inputs.len(), 1);
        assert!(inputs[0].is_directory_backed());
        Ok(())
    }

    #[test]
    fn patterns_dedupe_and_fail_on_no_match() -> anyhow::Result<()> {
        let fs = cluster();
        let inputs = list_inputs(&fs, &["/in/*.seq", "/in/a.seq"])?;
        assert_eq!(inputs.len(), 2);

        let err = list_inputs(&fs, &["/nowhere/*"]).unwrap_err();
        assert!(matches!(err, Error::NoInputMatch(ref p) if p == "/nowhere/*"));
        Ok(())
    }
}
