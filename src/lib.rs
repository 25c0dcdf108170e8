//! # Seqcombine
//!
//! Pack many small record files into a bounded number of **combined splits**
//! and read each split back as **one continuous record stream**.
//!
//! Jobs over thousands of tiny files pay a per-task cost for every file. This
//! crate plans splits that bundle whole files (and, optionally, chunks of large
//! ones) up to a size budget, keeps the bytes of a split close to the hosts that
//! store them, and hands each split to a reader that walks its files in order.
//!
//! ## Key Features
//!
//! - **Locality-aware packing** - pieces are grouped per host first, then packed greedily
//! - **Directory-backed inputs** - a directory holding `data` + `index` is read through its `data` file
//! - **Pools** - inputs matching a pattern are only combined with each other
//! - **Composite reader** - lazy opening, one open file at a time, one progress value per split
//! - **Portable descriptors** - splits serialize to JSON or postcard
//!
//! ## Quick Start
//!
//! ```no_run
//! use seqcombine::codec::SeqFileCodec;
//! use seqcombine::fs::LocalFileSystem;
//! use seqcombine::*;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let fs = Arc::new(LocalFileSystem::new());
//! let config = PlannerConfig::for_codec(&SeqFileCodec).with_split_sizes(1 << 20, 64 << 20);
//! let splits = SplitPlanner::new(fs.clone(), config).plan_roots(&["logs/2024-*"])?;
//!
//! let counts = LocalRunner::default().count_records(&splits, fs, Arc::new(SeqFileCodec))?;
//! println!("{} splits, {} records", splits.len(), counts.iter().sum::<u64>());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Planning
//!
//! [`SplitPlanner`] lists inputs ([`listing`]), resolves directory-backed ones
//! to their data file ([`input`]) and packs the bytes into [`CombinedSplit`]s.
//! Every resolved byte lands in exactly one split, and no split grows past
//! `max_split_size` unless it holds a single larger component.
//!
//! ### Reading
//!
//! [`CompositeRecordReader`] reads a split through a [`codec::RecordCodec`],
//! opening each component only when it is reached.
//!
//! ### Collaborators
//!
//! Filesystems ([`fs::FileSystem`]) and record formats ([`codec::RecordCodec`])
//! sit behind traits. The crate ships a local and an in-memory filesystem and
//! a sequence-file codec; [`runner::LocalRunner`] stands in for a scheduler.
//!
//! ## Logging
//!
//! The crate logs through the `log` facade and installs no logger.
//!
//! ## Feature Flags
//!
//! - `parallel-io` - Run splits on a rayon pool in [`ExecMode::Parallel`]; without it the
//!   runner falls back to sequential execution

pub mod codec;
pub mod config;
mod error;
pub mod fs;
pub mod input;
pub mod listing;
pub mod planner;
pub mod reader;
pub mod runner;
pub mod split;
pub mod testing;

// General re-exports
pub use codec::{Record, RecordCodec, RecordStream};
pub use config::{Locality, PlannerConfig};
pub use error::{BoxError, Error, Result};
pub use input::{InputFileRef, InputKind, ResolvedInput};
pub use planner::{SplitPlanner, plan, verify};
pub use reader::CompositeRecordReader;
pub use runner::{ExecMode, LocalRunner};
pub use split::{CombinedSplit, SplitComponent};
