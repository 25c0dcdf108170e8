//! Reading a combined split as one record stream.
//!
//! [`CompositeRecordReader`] walks the components of a [`CombinedSplit`] in
//! order. A component's stream is opened lazily, on the first request after the
//! reader starts or moves past the previous component, and released as soon as
//! it runs dry, so at most one file handle is open at any time.
//!
//! Progress is reported over the whole split:
//!
//! ```text
//! (bytes of finished components + bytes consumed in the current one) / split bytes
//! ```
//!
//! The value never decreases, stays below `1.0` while records may remain, and
//! is exactly `1.0` once the reader is exhausted.
//!
//! Failures are fatal. A component that cannot be opened surfaces as
//! [`Error::ComponentOpen`], corrupt data as [`Error::RecordDecode`]; after
//! either, every further call returns [`Error::ReaderFailed`]. Retrying is left
//! to whoever schedules the task.
//!
//! # Examples
//!
//! ```no_run
//! use seqcombine::codec::SeqFileCodec;
//! use seqcombine::fs::LocalFileSystem;
//! use seqcombine::{CompositeRecordReader, PlannerConfig, SplitPlanner};
//! use std::sync::Arc;
//!
//! let fs = Arc::new(LocalFileSystem::new());
//! let planner = SplitPlanner::new(fs.clone(), PlannerConfig::for_codec(&SeqFileCodec));
//! for split in planner.plan_roots(&["data/part-*"])? {
//!     let mut reader = CompositeRecordReader::new(split, fs.clone(), Arc::new(SeqFileCodec));
//!     while reader.has_next()? {
//!         let record = reader.next_record()?;
//!         println!("{} bytes, {:.0}% done", record.payload_len(), reader.progress() * 100.0);
//!     }
//! }
//! # Ok::<(), seqcombine::Error>(())
//! ```

pub mod state;

pub use state::{Event, Phase, transition};

use crate::codec::{Record, RecordCodec, RecordStream};
use crate::fs::FileSystem;
use crate::split::{CombinedSplit, SplitComponent};
use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;

pub struct CompositeRecordReader {
    split: CombinedSplit,
    fs: Arc<dyn FileSystem>,
    codec: Arc<dyn RecordCodec>,
    phase: Phase,
    stream: Option<Box<dyn RecordStream>>,
    peeked: Option<Record>,
    cumulative: u64,
    /// Bytes of the failed component consumed before its stream was dropped.
    consumed_at_fault: u64,
    total: u64,
    records_read: u64,
}

impl CompositeRecordReader {
    pub fn new(
        split: CombinedSplit,
        fs: Arc<dyn FileSystem>,
        codec: Arc<dyn RecordCodec>,
    ) -> Self {
        log::debug!("reading split {split}");
        let total = split.len();
        Self {
            split,
            fs,
            codec,
            phase: Phase::Init,
            stream: None,
            peeked: None,
            cumulative: 0,
            consumed_at_fault: 0,
            total,
            records_read: 0,
        }
    }

    /// Whether another record is available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ComponentOpen`] or [`Error::RecordDecode`] when the next
    /// component cannot be opened or read, and [`Error::ReaderFailed`] once the
    /// reader has failed.
    pub fn has_next(&mut self) -> Result<bool> {
        self.fill()
    }

    /// The next record.
    ///
    /// # Errors
    ///
    /// As [`CompositeRecordReader::has_next`], plus [`Error::ExhaustedReader`]
    /// when no records remain.
    pub fn next_record(&mut self) -> Result<Record> {
        if !self.fill()? {
            return Err(Error::ExhaustedReader);
        }
        let record = self.peeked.take().ok_or(Error::ExhaustedReader)?;
        self.records_read += 1;
        Ok(record)
    }

    /// Fraction of the split's bytes consumed, in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.phase == Phase::Exhausted || self.total == 0 {
            return if self.phase == Phase::Exhausted { 1.0 } else { 0.0 };
        }
        let consumed = self.cumulative + self.consumed_in_current(true);
        (consumed as f64 / self.total as f64).clamp(0.0, 1.0)
    }

    /// Aggregate byte position across the split.
    #[must_use]
    pub fn position(&self) -> u64 {
        if self.phase == Phase::Exhausted {
            return self.total;
        }
        self.cumulative + self.consumed_in_current(false)
    }

    /// Release the open stream, if any, and drop the reader.
    pub fn close(mut self) {
        self.release();
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn split(&self) -> &CombinedSplit {
        &self.split
    }

    /// Index of the component being opened or read.
    #[must_use]
    pub fn component_index(&self) -> Option<usize> {
        self.phase.component()
    }

    #[must_use]
    pub fn current_path(&self) -> Option<&Path> {
        self.current().map(|c| c.path.as_path())
    }

    #[must_use]
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    fn current(&self) -> Option<&SplitComponent> {
        self.phase
            .component()
            .and_then(|i| self.split.components.get(i))
    }

    /// Bytes consumed in the open component. While the component is still
    /// open the count is held one byte short of its length, so only advancing
    /// past it accounts for its last byte.
    fn consumed_in_current(&self, hold_back: bool) -> u64 {
        let Some(component) = self.current() else {
            return 0;
        };
        let consumed = match self.stream.as_ref() {
            Some(stream) => stream.position().saturating_sub(component.start),
            None => self.consumed_at_fault,
        };
        let cap = if hold_back {
            component.length.saturating_sub(1)
        } else {
            component.length
        };
        consumed.min(cap)
    }

    fn step(&mut self, event: Event) {
        self.phase = transition(self.phase, event, self.split.num_components());
    }

    fn release(&mut self) {
        self.stream = None;
        self.peeked = None;
    }

    fn fault(&mut self, err: Error) -> Error {
        self.consumed_at_fault = self.consumed_in_current(false);
        self.release();
        self.step(Event::Fault);
        err
    }

    /// Make sure a record is buffered, driving the phase machine as needed.
    /// Returns `false` once the split is exhausted.
    fn fill(&mut self) -> Result<bool> {
        loop {
            if self.peeked.is_some() {
                return Ok(true);
            }
            match self.phase {
                Phase::Init => self.step(Event::Demand),
                Phase::Opening(i) => {
                    let component = &self.split.components[i];
                    match self.codec.open_range(self.fs.as_ref(), component) {
                        Ok(stream) => {
                            log::debug!("opened component {i}: {component}");
                            self.stream = Some(stream);
                            self.step(Event::Opened);
                        }
                        Err(source) => {
                            let err = Error::ComponentOpen {
                                path: component.path.clone(),
                                source: Box::new(source),
                            };
                            return Err(self.fault(err));
                        }
                    }
                }
                Phase::Reading(_) => {
                    let next = match self.stream.as_mut() {
                        Some(stream) => stream.next_record(),
                        None => Ok(None),
                    };
                    match next {
                        Ok(Some(record)) => self.peeked = Some(record),
                        Ok(None) => self.step(Event::EndOfStream),
                        Err(err) => return Err(self.fault(err)),
                    }
                }
                Phase::Advancing(i) => {
                    self.stream = None;
                    self.cumulative += self.split.components[i].length;
                    self.step(Event::Closed);
                }
                Phase::Exhausted => return Ok(false),
                Phase::Failed(i) => {
                    return Err(Error::ReaderFailed {
                        path: self.split.components[i].path.clone(),
                    });
                }
            }
        }
    }
}

impl Iterator for CompositeRecordReader {
    type Item = Result<Record>;

    /// Yields records until the split is exhausted. A failure is yielded once,
    /// after which iteration ends.
    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.phase, Phase::Failed(_)) {
            return None;
        }
        match self.fill() {
            Ok(true) => Some(self.next_record()),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
