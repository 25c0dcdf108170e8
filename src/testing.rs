//! Testing utilities for planners, readers and tasks built on them.
//!
//! - **Fixtures** ([`fixtures`]): record generators, fake clusters with block
//!   placement, and a scripted codec whose streams replay a fixed sequence of
//!   records and failures.
//! - **Mock I/O** ([`mock_io`]): temporary directories and record files on the
//!   local filesystem.
//!
//! # Quick Start
//!
//! ```
//! use seqcombine::testing::*;
//! use seqcombine::{CompositeRecordReader, PlannerConfig, SplitPlanner};
//! use seqcombine::codec::SeqFileCodec;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let cluster = FakeCluster::new()
//!     .seqfile("/in/a", &numbered_records("a", 50, 16), &["n1"])?
//!     .seqfile("/in/b", &numbered_records("b", 50, 16), &["n2"])?
//!     .build();
//!
//! let fs = Arc::new(cluster);
//! let splits = SplitPlanner::new(fs.clone(), PlannerConfig::default()).plan_roots(&["/in/*"])?;
//! let mut total = 0;
//! for split in splits {
//!     total += CompositeRecordReader::new(split, fs.clone(), Arc::new(SeqFileCodec)).count();
//! }
//! assert_eq!(total, 100);
//! # Ok(())
//! # }
//! ```

pub mod fixtures;
pub mod mock_io;

pub use fixtures::*;
pub use mock_io::*;
