//! Error type shared by the planner, the readers, and the collaborator traits.
//!
//! Every failure is raised to the immediate caller. Nothing in this crate
//! skips a bad input or retries an operation; those policies belong to
//! whoever schedules the work.

use std::io;
use std::path::PathBuf;

/// Boxed error used when wrapping a collaborator failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A directory-backed input has no nested data file.
    #[error("directory-backed input {} has no data file at {}", dir.display(), nested.display())]
    Resolution {
        dir: PathBuf,
        nested: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The computed splits do not losslessly partition the input bytes.
    #[error("split plan does not partition the input: {0}")]
    PlanningInvariant(String),

    /// A split component could not be opened (missing file, bad header, ...).
    #[error("failed to open split component {}", path.display())]
    ComponentOpen {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// Corrupt data inside a component's byte range.
    #[error("corrupt record data in {} at byte {offset}: {reason}", path.display())]
    RecordDecode {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// `next_record` was called after the reader reported no more records.
    #[error("record reader is exhausted")]
    ExhaustedReader,

    /// The reader hit a fatal error earlier and can no longer be used.
    #[error("record reader failed while reading {}", path.display())]
    ReaderFailed { path: PathBuf },

    #[error("invalid planner configuration: {0}")]
    InvalidConfig(String),

    #[error("input pattern {0} matched no files")]
    NoInputMatch(String),

    #[error("invalid input pattern {pattern}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// A split descriptor or configuration could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Descriptor(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn decode(path: impl Into<PathBuf>, offset: u64, reason: impl Into<String>) -> Self {
        Self::RecordDecode {
            path: path.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// True for the errors that end a reader's task.
    #[must_use]
    pub fn is_task_fatal(&self) -> bool {
        matches!(
            self,
            Self::ComponentOpen { .. } | Self::RecordDecode { .. } | Self::ReaderFailed { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Descriptor(e.to_string())
    }
}

impl From<postcard::Error> for Error {
    fn from(e: postcard::Error) -> Self {
        Self::Descriptor(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
