//! Planner configuration.
//!
//! [`PlannerConfig`] is a plain struct with a `Default` and `serde` support, so
//! it can be built in code or loaded from a JSON document:
//!
//! ```
//! use seqcombine::config::{Locality, PlannerConfig};
//!
//! let cfg =
//!     PlannerConfig::from_json_str(r#"{ "max_split_size": 1048576, "locality": "greedy" }"#)?;
//! assert_eq!(cfg.max_split_size, 1 << 20);
//! assert_eq!(cfg.locality, Locality::Greedy);
//! # Ok::<(), seqcombine::Error>(())
//! ```

use crate::codec::{RecordCodec, SYNC_INTERVAL};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default upper bound on a split (64 MiB).
pub const DEFAULT_MAX_SPLIT_SIZE: u64 = 64 * 1024 * 1024;

/// How the planner uses block locations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locality {
    /// Pack per host first, then greedily pack whatever is left.
    #[default]
    NodeLocal,
    /// One greedy pass in listing order, ignoring hosts.
    Greedy,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Smallest byte range the planner will cut a file into. Defaults to the
    /// codec's sync interval.
    pub min_split_size: u64,
    /// Soft upper bound on the bytes of one split.
    pub max_split_size: u64,
    /// Leftover bytes on one host that still make a host-local split.
    /// Zero sends every leftover to the final greedy pass.
    pub min_split_size_node: u64,
    /// Cut files larger than `max_split_size` into byte ranges.
    pub split_large_files: bool,
    pub locality: Locality,
    /// Glob patterns; files matching a pool are only combined with each other.
    pub pools: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            min_split_size: SYNC_INTERVAL,
            max_split_size: DEFAULT_MAX_SPLIT_SIZE,
            min_split_size_node: 0,
            split_large_files: false,
            locality: Locality::NodeLocal,
            pools: Vec::new(),
        }
    }
}

impl PlannerConfig {
    /// Defaults with the minimum split size taken from `codec`.
    #[must_use]
    pub fn for_codec(codec: &dyn RecordCodec) -> Self {
        Self {
            min_split_size: codec.sync_interval(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_split_sizes(mut self, min: u64, max: u64) -> Self {
        self.min_split_size = min;
        self.max_split_size = max;
        self
    }

    #[must_use]
    pub fn with_locality(mut self, locality: Locality) -> Self {
        self.locality = locality;
        self
    }

    #[must_use]
    pub fn with_pool(mut self, pattern: impl Into<String>) -> Self {
        self.pools.push(pattern.into());
        self
    }

    #[must_use]
    pub fn splitting_large_files(mut self, on: bool) -> Self {
        self.split_large_files = on;
        self
    }

    /// Parse a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Descriptor`] for malformed JSON or
    /// [`Error::InvalidConfig`] if the values do not validate.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a JSON file.
    ///
    /// # Errors
    ///
    /// See [`PlannerConfig::from_json_str`]; also fails if the file cannot be read.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `max_split_size` is zero, smaller than
    /// `min_split_size`, or a pool pattern does not compile.
    pub fn validate(&self) -> Result<()> {
        if self.max_split_size == 0 {
            return Err(Error::InvalidConfig("max_split_size must be positive".into()));
        }
        if self.min_split_size > self.max_split_size {
            return Err(Error::InvalidConfig(format!(
                "min_split_size {} exceeds max_split_size {}",
                self.min_split_size, self.max_split_size
            )));
        }
        for pool in &self.pools {
            glob::Pattern::new(pool)
                .map_err(|e| Error::InvalidConfig(format!("pool pattern {pool}: {e}")))?;
        }
        Ok(())
    }

    /// Whether oversize files may be cut without any piece dropping below the
    /// minimum split size.
    #[must_use]
    pub(crate) fn can_chunk(&self) -> bool {
        self.split_large_files && self.max_split_size >= self.min_split_size.saturating_mul(2)
    }
}
