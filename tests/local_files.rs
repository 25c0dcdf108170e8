//! Planning and reading record files on the local disk.

use anyhow::Result;
use pretty_assertions::assert_eq;
use seqcombine::codec::{SYNC_INTERVAL, SeqFileCodec};
use seqcombine::fs::LocalFileSystem;
use seqcombine::testing::{TempDirPath, numbered_records};
use seqcombine::*;
use std::path::PathBuf;
use std::sync::Arc;
use test_log::test;

fn sorted(mut v: Vec<Record>) -> Vec<Record> {
    v.sort_by(|a, b| a.key.cmp(&b.key));
    v
}

/// A small job directory: two plain parts, one directory-backed part, one
/// large part, and the usual hidden clutter.
fn job_dir() -> Result<(TempDirPath, Vec<Record>)> {
    let tmp = TempDirPath::new()?;
    let part0 = numbered_records("p0", 40, 24);
    let part1 = numbered_records("p1", 7, 200);
    let map0 = numbered_records("m0", 60, 16);
    let big = numbered_records("big", 3000, 48);

    tmp.write_seqfile("in/part-0", &part0)?;
    tmp.write_seqfile("in/part-1", &part1)?;
    tmp.write_map_file("in/map-0", &map0)?;
    tmp.write_seqfile("in/part-big", &big)?;
    tmp.write_bytes("in/_SUCCESS", b"")?;
    tmp.write_bytes("in/.part-0.crc", b"junk")?;

    let all = part0.into_iter().chain(part1).chain(map0).chain(big).collect();
    Ok((tmp, all))
}

fn config() -> PlannerConfig {
    PlannerConfig::for_codec(&SeqFileCodec)
        .with_split_sizes(SYNC_INTERVAL, 16_000)
        .splitting_large_files(true)
}

#[test]
fn listing_skips_hidden_entries_and_tags_directories() -> Result<()> {
    let (tmp, _) = job_dir()?;
    let inputs = listing::list_inputs(&LocalFileSystem::new(), &[tmp.pattern("in")])?;

    let names: Vec<String> = inputs
        .iter()
        .filter_map(|i| i.path.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["map-0", "part-0", "part-1", "part-big"]);
    assert!(inputs[0].is_directory_backed());
    assert!(!inputs[1].is_directory_backed());
    Ok(())
}

#[test]
fn every_record_is_read_exactly_once() -> Result<()> {
    let (tmp, expected) = job_dir()?;
    let fs: Arc<dyn seqcombine::fs::FileSystem> = Arc::new(LocalFileSystem::new());
    let splits = SplitPlanner::new(fs.clone(), config()).plan_roots(&[tmp.pattern("in")])?;

    // The large part is cut into several ranges.
    let big = tmp.join("in/part-big");
    let big_ranges = splits
        .iter()
        .flat_map(|s| s.components.iter())
        .filter(|c| c.path == big)
        .count();
    assert!(big_ranges > 2, "expected part-big to be chunked, got {big_ranges} ranges");
    assert!(splits.iter().all(|s| s.len() <= 16_000 || s.num_components() == 1));

    let per_split = LocalRunner::sequential().collect_records(&splits, fs, Arc::new(SeqFileCodec))?;
    let read: Vec<Record> = per_split.into_iter().flatten().collect();
    assert_eq!(read.len(), expected.len());
    assert_eq!(sorted(read), sorted(expected));
    Ok(())
}

#[test]
fn parallel_runner_matches_sequential() -> Result<()> {
    let (tmp, _) = job_dir()?;
    let fs: Arc<dyn seqcombine::fs::FileSystem> = Arc::new(LocalFileSystem::new());
    let splits = SplitPlanner::new(fs.clone(), config()).plan_roots(&[tmp.pattern("in")])?;
    let codec: Arc<dyn RecordCodec> = Arc::new(SeqFileCodec);

    let seq = LocalRunner::sequential().collect_records(&splits, fs.clone(), codec.clone())?;
    let par = LocalRunner::parallel(Some(4)).collect_records(&splits, fs, codec)?;
    assert_eq!(seq, par);
    Ok(())
}

#[test]
fn descriptors_survive_encoding_and_still_read() -> Result<()> {
    let (tmp, _) = job_dir()?;
    let fs: Arc<dyn seqcombine::fs::FileSystem> = Arc::new(LocalFileSystem::new());
    let splits = SplitPlanner::new(fs.clone(), config()).plan_roots(&[tmp.pattern("in")])?;
    let codec: Arc<dyn RecordCodec> = Arc::new(SeqFileCodec);

    for split in &splits {
        let from_json = CombinedSplit::from_json(&split.to_json()?)?;
        let from_bytes = CombinedSplit::from_bytes(&split.to_bytes()?)?;
        assert_eq!(&from_json, split);
        assert_eq!(&from_bytes, split);

        let direct: Vec<Record> =
            CompositeRecordReader::new(split.clone(), fs.clone(), codec.clone())
                .collect::<seqcombine::Result<_>>()?;
        let decoded: Vec<Record> = CompositeRecordReader::new(from_bytes, fs.clone(), codec.clone())
            .collect::<seqcombine::Result<_>>()?;
        assert_eq!(direct, decoded);
    }
    Ok(())
}

#[test]
fn directory_without_data_file_fails_resolution() -> Result<()> {
    let tmp = TempDirPath::new()?;
    tmp.write_seqfile("in/part-0", &numbered_records("p", 3, 4))?;
    tmp.write_bytes("in/stray/notes.txt", b"not records")?;

    let fs = Arc::new(LocalFileSystem::new());
    let err = SplitPlanner::new(fs, config())
        .plan_roots(&[tmp.pattern("in")])
        .unwrap_err();
    match err {
        Error::Resolution { dir, nested, .. } => {
            assert_eq!(dir, tmp.join("in/stray"));
            assert_eq!(nested, tmp.join("in/stray").join("data"));
        }
        other => anyhow::bail!("unexpected error {other}"),
    }
    Ok(())
}

#[test]
fn config_loads_from_json_file() -> Result<()> {
    let tmp = TempDirPath::new()?;
    let path: PathBuf = tmp.write_bytes(
        "planner.json",
        br#"{"max_split_size": 1048576, "locality": "greedy", "pools": ["/in/a-*"]}"#,
    )?;
    let cfg = PlannerConfig::from_json_file(&path)?;
    assert_eq!(cfg.max_split_size, 1_048_576);
    assert_eq!(cfg.locality, Locality::Greedy);
    assert_eq!(cfg.min_split_size, SYNC_INTERVAL);
    assert_eq!(cfg.pools, vec!["/in/a-*".to_string()]);

    tmp.write_bytes("bad.json", br#"{"min_split_size": 10, "max_split_size": 5}"#)?;
    assert!(matches!(
        PlannerConfig::from_json_file(tmp.join("bad.json")),
        Err(Error::InvalidConfig(_))
    ));
    Ok(())
}
