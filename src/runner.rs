//! A local stand-in for the task scheduler.
//!
//! [`LocalRunner`] hands every split to its own [`CompositeRecordReader`] and
//! runs a task over it, one split after another or on a rayon pool. Readers
//! share nothing, so the only coordination is collecting results back in
//! split order.

use crate::Result;
use crate::codec::{Record, RecordCodec};
use crate::fs::FileSystem;
use crate::reader::CompositeRecordReader;
use crate::split::CombinedSplit;
#[cfg(feature = "parallel-io")]
use rayon::prelude::*;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecMode {
    Sequential,
    /// Run splits on the global rayon pool. `threads` sizes the pool the first
    /// time it is built; `None` uses one thread per CPU.
    Parallel { threads: Option<usize> },
}

pub struct LocalRunner {
    pub mode: ExecMode,
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self {
            mode: ExecMode::Parallel { threads: None },
        }
    }
}

impl LocalRunner {
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            mode: ExecMode::Sequential,
        }
    }

    #[must_use]
    pub fn parallel(threads: Option<usize>) -> Self {
        Self {
            mode: ExecMode::Parallel { threads },
        }
    }

    /// Run `task` once per split, each with a fresh reader, and return the
    /// results in split order.
    ///
    /// # Errors
    ///
    /// Returns the first task error in split order. In parallel mode every
    /// split still runs before the error is returned.
    pub fn run<R, F>(
        &self,
        splits: &[CombinedSplit],
        fs: Arc<dyn FileSystem>,
        codec: Arc<dyn RecordCodec>,
        task: F,
    ) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(&mut CompositeRecordReader) -> Result<R> + Sync,
    {
        let run_one = |index: usize, split: &CombinedSplit| -> Result<R> {
            let mut reader = CompositeRecordReader::new(split.clone(), fs.clone(), codec.clone());
            let out = task(&mut reader);
            if let Err(e) = &out {
                log::warn!("split {index} failed: {e}");
            }
            reader.close();
            out
        };

        log::info!("running {} splits ({:?})", splits.len(), self.mode);
        match self.mode {
            ExecMode::Sequential => splits
                .iter()
                .enumerate()
                .map(|(i, s)| run_one(i, s))
                .collect(),
            ExecMode::Parallel { threads } => run_parallel(splits, threads, run_one),
        }
    }

    /// Read every split to the end, returning its records.
    ///
    /// # Errors
    ///
    /// See [`LocalRunner::run`].
    pub fn collect_records(
        &self,
        splits: &[CombinedSplit],
        fs: Arc<dyn FileSystem>,
        codec: Arc<dyn RecordCodec>,
    ) -> Result<Vec<Vec<Record>>> {
        self.run(splits, fs, codec, |reader| reader.collect())
    }

    /// Count the records of every split.
    ///
    /// # Errors
    ///
    /// See [`LocalRunner::run`].
    pub fn count_records(
        &self,
        splits: &[CombinedSplit],
        fs: Arc<dyn FileSystem>,
        codec: Arc<dyn RecordCodec>,
    ) -> Result<Vec<u64>> {
        self.run(splits, fs, codec, |reader| {
            while reader.has_next()? {
                reader.next_record()?;
            }
            Ok(reader.records_read())
        })
    }
}

#[cfg(feature = "parallel-io")]
fn run_parallel<R, F>(
    splits: &[CombinedSplit],
    threads: Option<usize>,
    run_one: F,
) -> Result<Vec<R>>
where
    R: Send,
    F: Fn(usize, &CombinedSplit) -> Result<R> + Sync,
{
    let threads = threads.unwrap_or_else(num_cpus::get).max(1);
    // ok() to ignore "already built" on repeated runs
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
    // Every split runs to completion; the error reported is the first in
    // split order, not the first to finish.
    let results: Vec<Result<R>> = splits
        .par_iter()
        .enumerate()
        .map(|(i, s)| run_one(i, s))
        .collect();
    results.into_iter().collect()
}

#[cfg(not(feature = "parallel-io"))]
fn run_parallel<R, F>(
    splits: &[CombinedSplit],
    threads: Option<usize>,
    run_one: F,
) -> Result<Vec<R>>
where
    F: Fn(usize, &CombinedSplit) -> Result<R>,
{
    log::debug!("parallel-io is disabled, ignoring threads={threads:?} and running in order");
    splits
        .iter()
        .enumerate()
        .map(|(i, s)| run_one(i, s))
        .collect()
}
