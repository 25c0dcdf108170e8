//! Split planning.
//!
//! The planner turns a listing of inputs into a bounded number of
//! [`CombinedSplit`]s:
//!
//! 1. **Resolve** -- directory-backed inputs are replaced by their nested data
//!    file (length and block locations included).
//! 2. **Pool** -- inputs are grouped by the configured pool patterns; splits
//!    never mix pools.
//! 3. **Cut** -- every file becomes one piece, or several byte-range pieces
//!    when large-file splitting is on and the file exceeds the maximum.
//! 4. **Pack** -- with [`Locality::NodeLocal`], pieces are first packed per
//!    host (hosts in name order), keeping only splits that filled up; whatever
//!    is left, or everything with [`Locality::Greedy`], is packed in one greedy
//!    pass in listing order. A bin closes when the next piece would push it
//!    past `max_split_size`; a piece larger than the maximum is a split on its
//!    own.
//! 5. **Verify** -- the splits must partition the resolved bytes exactly, with
//!    no gaps, no overlaps, and no bin over the size bound.
//!
//! Planning only issues metadata calls; no record data is read.

use crate::config::{Locality, PlannerConfig};
use crate::fs::FileSystem;
use crate::input::{InputFileRef, ResolvedInput, resolve};
use crate::listing::list_inputs;
use crate::split::{CombinedSplit, SplitComponent};
use crate::{Error, Result};
use glob::Pattern;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Most hosts recorded as a split's preferred locations.
pub const MAX_SPLIT_LOCATIONS: usize = 3;

/// A byte range of one resolved file, with its hosts weighted by bytes held.
#[derive(Debug, Clone)]
struct Piece {
    component: SplitComponent,
    hosts: Vec<(String, u64)>,
}

impl Piece {
    fn len(&self) -> u64 {
        self.component.length
    }

    fn on_host(&self, host: &str) -> bool {
        self.hosts.iter().any(|(h, _)| h == host)
    }
}

/// Pieces accumulated for one split, by index.
#[derive(Default)]
struct Bin {
    members: Vec<usize>,
    size: u64,
}

impl Bin {
    fn push(&mut self, i: usize, len: u64) {
        self.members.push(i);
        self.size += len;
    }
}

/// Plans combined splits over a filesystem.
pub struct SplitPlanner {
    fs: Arc<dyn FileSystem>,
    config: PlannerConfig,
}

impl SplitPlanner {
    pub fn new(fs: Arc<dyn FileSystem>, config: PlannerConfig) -> Self {
        Self { fs, config }
    }

    #[must_use]
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// List `roots` and plan over the result.
    ///
    /// # Errors
    ///
    /// See [`list_inputs`] and [`SplitPlanner::plan`].
    pub fn plan_roots<S: AsRef<str>>(&self, roots: &[S]) -> Result<Vec<CombinedSplit>> {
        let inputs = list_inputs(self.fs.as_ref(), roots)?;
        self.plan(&inputs)
    }

    /// Plan splits over already-listed inputs.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] if the configuration does not validate
    /// - [`Error::Resolution`] if a directory-backed input has no data file
    /// - [`Error::PlanningInvariant`] if the result is not a lossless partition
    pub fn plan(&self, inputs: &[InputFileRef]) -> Result<Vec<CombinedSplit>> {
        self.config.validate()?;
        let resolved = dedup_by_data_path(resolve(self.fs.as_ref(), inputs)?);

        let pools = self
            .config
            .pools
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let mut grouped: Vec<Vec<&ResolvedInput>> = vec![Vec::new(); pools.len() + 1];
        for input in &resolved {
            let pool = pools
                .iter()
                .position(|p| p.matches_path(&input.logical_path))
                .unwrap_or(pools.len());
            grouped[pool].push(input);
        }

        let mut splits = Vec::new();
        for group in grouped {
            let pieces = self.cut(&group);
            splits.extend(self.pack(&pieces));
        }

        verify(&resolved, &splits, self.config.max_split_size)?;
        log::info!(
            "planned {} splits over {} inputs ({} bytes)",
            splits.len(),
            resolved.len(),
            resolved.iter().map(|r| r.len).sum::<u64>()
        );
        Ok(splits)
    }

    fn cut(&self, inputs: &[&ResolvedInput]) -> Vec<Piece> {
        let mut pieces = Vec::new();
        for input in inputs {
            if input.len == 0 {
                log::warn!("skipping empty input {}", input.logical_path.display());
                continue;
            }
            for (start, length) in chunk_ranges(input.len, &self.config) {
                pieces.push(Piece {
                    component: SplitComponent::new(&input.data_path, start, length),
                    hosts: input.host_weights(start, length),
                });
            }
        }
        pieces
    }

    fn pack(&self, pieces: &[Piece]) -> Vec<CombinedSplit> {
        let max = self.config.max_split_size;
        let mut assigned = vec![false; pieces.len()];
        let mut out = Vec::new();

        if self.config.locality == Locality::NodeLocal {
            let hosts: BTreeSet<&str> = pieces
                .iter()
                .flat_map(|p| p.hosts.iter().map(|(h, _)| h.as_str()))
                .collect();
            for host in hosts {
                let mut bin = Bin::default();
                for (i, piece) in pieces.iter().enumerate() {
                    if assigned[i] || !piece.on_host(host) {
                        continue;
                    }
                    if piece.len() > max {
                        out.push(emit(pieces, &[i], &mut assigned));
                        continue;
                    }
                    if bin.size + piece.len() > max {
                        out.push(emit(pieces, &bin.members, &mut assigned));
                        bin = Bin::default();
                    }
                    bin.push(i, piece.len());
                }
                let min_node = self.config.min_split_size_node;
                if min_node > 0 && bin.size >= min_node {
                    out.push(emit(pieces, &bin.members, &mut assigned));
                }
                log::debug!("host {host}: {} splits so far", out.len());
            }
        }

        let mut bin = Bin::default();
        for (i, piece) in pieces.iter().enumerate() {
            if assigned[i] {
                continue;
            }
            if piece.len() > max {
                out.push(emit(pieces, &[i], &mut assigned));
                continue;
            }
            if !bin.members.is_empty() && bin.size + piece.len() > max {
                out.push(emit(pieces, &bin.members, &mut assigned));
                bin = Bin::default();
            }
            bin.push(i, piece.len());
        }
        if !bin.members.is_empty() {
            out.push(emit(pieces, &bin.members, &mut assigned));
        }
        out
    }
}

/// Plan with default settings apart from the two split sizes.
///
/// # Errors
///
/// See [`SplitPlanner::plan`].
pub fn plan(
    fs: Arc<dyn FileSystem>,
    inputs: &[InputFileRef],
    min_split_size: u64,
    max_split_size: u64,
) -> Result<Vec<CombinedSplit>> {
    let config = PlannerConfig::default().with_split_sizes(min_split_size, max_split_size);
    SplitPlanner::new(fs, config).plan(inputs)
}

/// Byte ranges `(start, length)` a file of `len` bytes is cut into.
///
/// Files are only cut when large-file splitting is on and there is room for
/// two minimum-size pieces under the maximum. Full-size pieces are taken until
/// less than twice the maximum remains; that remainder is halved, so no piece
/// is smaller than half the maximum.
fn chunk_ranges(len: u64, config: &PlannerConfig) -> Vec<(u64, u64)> {
    let max = config.max_split_size;
    if !config.can_chunk() || len <= max {
        return vec![(0, len)];
    }
    let mut out = Vec::new();
    let mut start = 0;
    let mut left = len;
    while left > max {
        let piece = if left < 2 * max { left / 2 } else { max };
        out.push((start, piece));
        start += piece;
        left -= piece;
    }
    out.push((start, left));
    out
}

fn emit(pieces: &[Piece], members: &[usize], assigned: &mut [bool]) -> CombinedSplit {
    let mut weights: HashMap<&str, u64> = HashMap::new();
    let mut components = Vec::with_capacity(members.len());
    for &i in members {
        assigned[i] = true;
        components.push(pieces[i].component.clone());
        for (host, bytes) in &pieces[i].hosts {
            *weights.entry(host.as_str()).or_default() += bytes;
        }
    }
    let mut ranked: Vec<(&str, u64)> = weights.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let locations = ranked
        .into_iter()
        .take(MAX_SPLIT_LOCATIONS)
        .map(|(h, _)| h.to_string())
        .collect();
    CombinedSplit::new(components, locations)
}

fn dedup_by_data_path(resolved: Vec<ResolvedInput>) -> Vec<ResolvedInput> {
    let mut seen = BTreeSet::new();
    resolved
        .into_iter()
        .filter(|r| {
            let fresh = seen.insert(r.data_path.clone());
            if !fresh {
                log::warn!(
                    "{} resolves to already listed {}",
                    r.logical_path.display(),
                    r.data_path.display()
                );
            }
            fresh
        })
        .collect()
}

/// Check that `splits` partition the bytes of `resolved` exactly and respect
/// the size bound.
///
/// # Errors
///
/// Returns [`Error::PlanningInvariant`] describing the first violation.
pub fn verify(
    resolved: &[ResolvedInput],
    splits: &[CombinedSplit],
    max_split_size: u64,
) -> Result<()> {
    let lens: HashMap<&Path, u64> = resolved
        .iter()
        .map(|r| (r.data_path.as_path(), r.len))
        .collect();
    let mut ranges: HashMap<&Path, Vec<(u64, u64)>> = HashMap::new();

    for split in splits {
        split.check_components(|p| lens.get(p).copied())?;
        if split.num_components() > 1 && split.len() > max_split_size {
            return Err(Error::PlanningInvariant(format!(
                "split of {} bytes exceeds maximum {max_split_size}: {split}",
                split.len()
            )));
        }
        for c in &split.components {
            ranges
                .entry(c.path.as_path())
                .or_default()
                .push((c.start, c.end()));
        }
    }

    for (path, len) in &lens {
        let mut covered = ranges.remove(path).unwrap_or_default();
        covered.sort_unstable();
        let mut cursor = 0;
        for (start, end) in covered {
            if start != cursor {
                let what = if start < cursor { "overlap" } else { "gap" };
                return Err(Error::PlanningInvariant(format!(
                    "{what} in {} at byte {cursor}",
                    path.display()
                )));
            }
            cursor = end;
        }
        if cursor != *len {
            return Err(Error::PlanningInvariant(format!(
                "{} covered up to {cursor} of {len} bytes",
                path.display()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FakeFileSystem;
    use pretty_assertions::assert_eq;

    const MB: u64 = 1024 * 1024;

    fn planner(fs: &FakeFileSystem, config: PlannerConfig) -> SplitPlanner {
        SplitPlanner::new(Arc::new(fs.clone()), config)
    }

    #[test]
    fn chunking_keeps_pieces_between_half_and_full_max() {
        let cfg = PlannerConfig::default()
            .with_split_sizes(10, 100)
            .splitting_large_files(true);
        assert_eq!(chunk_ranges(100, &cfg), vec![(0, 100)]);
        assert_eq!(chunk_ranges(150, &cfg), vec![(0, 75), (75, 75)]);
        assert_eq!(chunk_ranges(200, &cfg), vec![(0, 100), (100, 100)]);
        assert_eq!(
            chunk_ranges(351, &cfg),
            vec![(0, 100), (100, 100), (200, 75), (275, 76)]
        );
        let off = PlannerConfig::default().with_split_sizes(10, 100);
        assert_eq!(chunk_ranges(351, &off), vec![(0, 351)]);
    }

    #[test]
    fn greedy_closes_bins_before_overflow() -> anyhow::Result<()> {
        let fs = FakeFileSystem::new();
        for (name, len) in [("a", 40), ("b", 30), ("c", 30), ("d", 200), ("e", 10)] {
            fs.add_sized_file(format!("/in/{name}"), len);
        }
        let cfg = PlannerConfig::default()
            .with_split_sizes(1, 64)
            .with_locality(Locality::Greedy);
        let splits = planner(&fs, cfg).plan_roots(&["/in"])?;
        let shape: Vec<Vec<String>> = splits
            .iter()
            .map(|s| s.components.iter().map(|c| c.to_string()).collect())
            .collect();
        assert_eq!(
            shape,
            vec![
                vec!["/in/a:0+40".to_string()],
                vec!["/in/d:0+200".to_string()],
                vec!["/in/b:0+30".to_string(), "/in/c:0+30".to_string()],
                vec!["/in/e:0+10".to_string()],
            ]
        );
        Ok(())
    }

    #[test]
    fn node_local_groups_by_host_first() -> anyhow::Result<()> {
        let fs = FakeFileSystem::new();
        fs.add_sized_file_on("/in/a1", 30, &["n1"]);
        fs.add_sized_file_on("/in/b1", 30, &["n2"]);
        fs.add_sized_file_on("/in/a2", 30, &["n1"]);
        fs.add_sized_file_on("/in/b2", 30, &["n2"]);
        fs.add_sized_file_on("/in/a3", 30, &["n1"]);
        let cfg = PlannerConfig::default().with_split_sizes(1, 64);
        let splits = planner(&fs, cfg).plan_roots(&["/in"])?;

        // Only n1 overflows a bin; n2's pieces fall through to the greedy pass.
        assert_eq!(splits.len(), 3);
        assert_eq!(splits[0].locations, vec!["n1".to_string()]);
        assert_eq!(
            splits[0].paths().collect::<Vec<_>>(),
            vec![Path::new("/in/a1"), Path::new("/in/a2")]
        );
        assert_eq!(
            splits[1].paths().collect::<Vec<_>>(),
            vec![Path::new("/in/a3"), Path::new("/in/b1")]
        );
        assert_eq!(splits[1].locations, vec!["n1".to_string(), "n2".to_string()]);
        assert_eq!(splits[2].paths().collect::<Vec<_>>(), vec![Path::new("/in/b2")]);
        assert_eq!(splits[2].locations, vec!["n2".to_string()]);
        Ok(())
    }

    #[test]
    fn node_leftovers_can_stay_local() -> anyhow::Result<()> {
        let fs = FakeFileSystem::new();
        fs.add_sized_file_on("/in/a", 20, &["n1"]);
        fs.add_sized_file_on("/in/b", 20, &["n2"]);
        let mut cfg = PlannerConfig::default().with_split_sizes(1, 64);
        cfg.min_split_size_node = 10;
        let splits = planner(&fs, cfg.clone()).plan_roots(&["/in"])?;
        assert_eq!(splits.len(), 2);

        cfg.min_split_size_node = 0;
        let splits = planner(&fs, cfg).plan_roots(&["/in"])?;
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].locations, vec!["n1".to_string(), "n2".to_string()]);
        Ok(())
    }

    #[test]
    fn verify_rejects_gaps_overlaps_and_oversize_bins() {
        let resolved = vec![ResolvedInput {
            logical_path: "/f".into(),
            data_path: "/f".into(),
            len: 100,
            blocks: vec![],
        }];
        let split = |parts: &[(u64, u64)]| {
            CombinedSplit::new(
                parts
                    .iter()
                    .map(|&(s, l)| SplitComponent::new("/f", s, l))
                    .collect(),
                vec![],
            )
        };

        assert!(verify(&resolved, &[split(&[(0, 100)])], 64).is_ok());
        assert!(verify(&resolved, &[split(&[(0, 40)]), split(&[(40, 60)])], 64).is_ok());

        let gap = verify(&resolved, &[split(&[(0, 40)]), split(&[(50, 50)])], 64);
        assert!(matches!(gap, Err(Error::PlanningInvariant(ref m)) if m.contains("gap")));
        let overlap = verify(&resolved, &[split(&[(0, 60)]), split(&[(40, 60)])], 64);
        assert!(matches!(overlap, Err(Error::PlanningInvariant(ref m)) if m.contains("overlap")));
        let short = verify(&resolved, &[split(&[(0, 60)])], 64);
        assert!(short.is_err());
        let oversize = verify(&resolved, &[split(&[(0, 40), (40, 60)])], 64);
        assert!(oversize.is_err());
    }

    #[test]
    fn empty_inputs_produce_no_components() -> anyhow::Result<()> {
        let fs = FakeFileSystem::new();
        fs.add_sized_file("/in/empty", 0);
        fs.add_sized_file("/in/full", 5 * MB);
        let splits = planner(&fs, PlannerConfig::default()).plan_roots(&["/in"])?;
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].components, vec![SplitComponent::new("/in/full", 0, 5 * MB)]);
        Ok(())
    }
}
