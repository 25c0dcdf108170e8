//! Split descriptors.
//!
//! A [`CombinedSplit`] is the unit of work handed to one task: an ordered list
//! of [`SplitComponent`] byte ranges plus the hosts that hold most of those
//! bytes. Splits are immutable once planned and are shipped across the job
//! boundary as plain data, either as JSON or as a compact `postcard` encoding.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::path::{Path, PathBuf};

/// A contiguous byte range `[start, start + length)` of one physical file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SplitComponent {
    pub path: PathBuf,
    pub start: u64,
    pub length: u64,
}

impl SplitComponent {
    pub fn new(path: impl Into<PathBuf>, start: u64, length: u64) -> Self {
        Self {
            path: path.into(),
            start,
            length,
        }
    }

    /// Exclusive end offset.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.length)
    }
}

impl Display for SplitComponent {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(f, "{}:{}+{}", self.path.display(), self.start, self.length)
    }
}

/// An ordered set of components processed by a single task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedSplit {
    pub components: Vec<SplitComponent>,
    /// Preferred hosts, best first.
    pub locations: Vec<String>,
}

impl CombinedSplit {
    pub fn new(components: Vec<SplitComponent>, locations: Vec<String>) -> Self {
        Self {
            components,
            locations,
        }
    }

    /// Total bytes across all components.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.components
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(c.length))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    #[must_use]
    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.components.iter().map(|c| c.path.as_path())
    }

    /// Encode as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Descriptor`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Descriptor`] if `s` is not a valid descriptor or holds
    /// an empty or overflowing component.
    pub fn from_json(s: &str) -> Result<Self> {
        let split: Self = serde_json::from_str(s)?;
        split.check_ranges()?;
        Ok(split)
    }

    /// Encode with `postcard`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Descriptor`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Decode a `postcard` descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Descriptor`] if `bytes` is not a valid descriptor or
    /// holds an empty or overflowing component.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let split: Self = postcard::from_bytes(bytes)?;
        split.check_ranges()?;
        Ok(split)
    }

    /// Reject components no planner could have produced: empty ranges, ranges
    /// whose end does not fit in a `u64`, and splits whose total length does
    /// not either.
    fn check_ranges(&self) -> Result<()> {
        let mut total = 0u64;
        for c in &self.components {
            if c.length == 0 {
                return Err(Error::Descriptor(format!("empty component {c}")));
            }
            if c.start.checked_add(c.length).is_none() {
                return Err(Error::Descriptor(format!("component {c} overflows")));
            }
            total = total
                .checked_add(c.length)
                .ok_or_else(|| Error::Descriptor(format!("split length overflows at {c}")))?;
        }
        Ok(())
    }

    /// Check the per-component invariants against known file lengths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PlanningInvariant`] for an empty component or one that
    /// runs past the end of its file.
    pub fn check_components(&self, file_len: impl Fn(&Path) -> Option<u64>) -> Result<()> {
        for c in &self.components {
            if c.length == 0 {
                return Err(Error::PlanningInvariant(format!("empty component {c}")));
            }
            match file_len(&c.path) {
                Some(len) if c.end() <= len => {}
                Some(len) => {
                    return Err(Error::PlanningInvariant(format!(
                        "component {c} ends past file length {len}"
                    )));
                }
                None => {
                    return Err(Error::PlanningInvariant(format!(
                        "component {c} refers to a file that was not planned"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Display for CombinedSplit {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(f, "Paths:")?;
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{c}")?;
        }
        if !self.locations.is_empty() {
            write!(f, " Locations:{}", self.locations.join(":"))?;
        }
        Ok(())
    }
}
