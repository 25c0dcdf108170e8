//! Record codec traits.
//!
//! The planner and the composite reader never look inside a record file. They
//! talk to the format through two traits:
//!
//! - [`RecordCodec`] knows the format's synchronization interval (the planner's
//!   default minimum split size) and opens a [`RecordStream`] over one byte
//!   range of one file.
//! - [`RecordStream`] yields the records that belong to that range and reports
//!   how far into the file it has read.
//!
//! [`SeqFileCodec`] is the bundled reference codec: length-prefixed
//! key/value records with a sync marker written at least every
//! [`SYNC_INTERVAL`] bytes.

pub mod seqfile;

pub use seqfile::{RecordWriter, SYNC_INTERVAL, SeqFileCodec, SyncMarker};

use crate::Result;
use crate::fs::FileSystem;
use crate::split::SplitComponent;

/// One key/value record, both sides kept as raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Bytes of key plus value.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// A sequential record format with resynchronization points.
pub trait RecordCodec: Send + Sync {
    /// Distance in bytes within which a resynchronization point is guaranteed.
    fn sync_interval(&self) -> u64;

    /// Open a stream over the records that belong to `component`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its header is invalid.
    fn open_range(
        &self,
        fs: &dyn FileSystem,
        component: &SplitComponent,
    ) -> Result<Box<dyn RecordStream>>;
}

/// Records of one byte range, in file order. Dropping the stream releases the
/// underlying file handle.
pub trait RecordStream: Send {
    /// Next record of the range, or `None` once the range is done.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RecordDecode`] on corrupt data.
    fn next_record(&mut self) -> Result<Option<Record>>;

    /// Absolute byte offset the stream has read up to.
    fn position(&self) -> u64;
}
