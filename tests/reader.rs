//! Composite reader over real sequence files.

use anyhow::Result;
use pretty_assertions::assert_eq;
use seqcombine::codec::SeqFileCodec;
use seqcombine::fs::{FakeFileSystem, FileSystem};
use seqcombine::reader::Phase;
use seqcombine::testing::{FakeCluster, numbered_records, seqfile_bytes};
use seqcombine::*;
use std::path::Path;
use std::sync::Arc;
use test_log::test;

fn whole(fs: &FakeFileSystem, path: &str) -> Result<SplitComponent> {
    let len = fs.status(Path::new(path))?.len;
    Ok(SplitComponent::new(path, 0, len))
}

fn reader(fs: &FakeFileSystem, components: Vec<SplitComponent>) -> CompositeRecordReader {
    CompositeRecordReader::new(
        CombinedSplit::new(components, vec![]),
        Arc::new(fs.clone()),
        Arc::new(SeqFileCodec),
    )
}

#[test]
fn records_come_back_in_component_order() -> Result<()> {
    let a = numbered_records("a", 120, 40);
    let b = numbered_records("b", 3, 8);
    let c = numbered_records("c", 75, 100);
    let fs = FakeCluster::new()
        .seqfile("/in/a", &a, &[])?
        .seqfile("/in/b", &b, &[])?
        .seqfile("/in/c", &c, &[])?
        .build();

    let components = vec![whole(&fs, "/in/a")?, whole(&fs, "/in/b")?, whole(&fs, "/in/c")?];
    let total: u64 = components.iter().map(|c| c.length).sum();
    let mut r = reader(&fs, components);

    let mut seen = Vec::new();
    while r.has_next()? {
        seen.push(r.next_record()?);
        assert!(fs.open_handles() <= 1);
    }
    let expected: Vec<Record> = a.into_iter().chain(b).chain(c).collect();
    assert_eq!(seen, expected);
    assert_eq!(r.position(), total);
    assert_eq!(fs.peak_open_handles(), 1);
    assert_eq!(fs.total_opens(), 3);
    assert_eq!(fs.open_handles(), 0);
    Ok(())
}

#[test]
fn progress_reaches_one_exactly_when_exhausted() -> Result<()> {
    let fs = FakeCluster::new()
        .seqfile("/in/a", &numbered_records("a", 200, 64), &[])?
        .seqfile("/in/b", &numbered_records("b", 200, 64), &[])?
        .build();
    let mut r = reader(&fs, vec![whole(&fs, "/in/a")?, whole(&fs, "/in/b")?]);

    let mut last = r.progress();
    assert_eq!(last, 0.0);
    loop {
        let more = r.has_next()?;
        let p = r.progress();
        assert!(p >= last, "progress went back from {last} to {p}");
        if !more {
            assert_eq!(p, 1.0);
            break;
        }
        assert!(p < 1.0);
        last = p;
        r.next_record()?;
    }
    assert_eq!(r.phase(), Phase::Exhausted);
    assert!(matches!(r.next_record(), Err(Error::ExhaustedReader)));
    Ok(())
}

#[test]
fn second_component_open_failure_surfaces_before_its_records() -> Result<()> {
    let fs = FakeCluster::new()
        .seqfile("/in/a", &numbered_records("a", 5, 4), &[])?
        .seqfile("/in/b", &numbered_records("b", 5, 4), &[])?
        .build();
    fs.fail_open("/in/b");
    let mut r = reader(&fs, vec![whole(&fs, "/in/a")?, whole(&fs, "/in/b")?]);

    let mut keys = Vec::new();
    let err = loop {
        match r.next() {
            Some(Ok(record)) => keys.push(record.key),
            Some(Err(e)) => break e,
            None => anyhow::bail!("reader ended without the open failure"),
        }
    };
    assert_eq!(keys.len(), 5);
    assert!(keys.iter().all(|k| k.starts_with(b"a-")));
    assert!(matches!(&err, Error::ComponentOpen { path, .. } if path == Path::new("/in/b")));
    assert!(err.is_task_fatal());

    assert_eq!(r.current_path(), Some(Path::new("/in/b")));
    assert!(matches!(r.has_next(), Err(Error::ReaderFailed { .. })));
    assert!(r.next().is_none());
    assert_eq!(fs.open_handles(), 0);
    Ok(())
}

#[test]
fn first_component_open_failure_yields_nothing() -> Result<()> {
    let fs = FakeCluster::new()
        .seqfile("/in/a", &numbered_records("a", 5, 4), &[])?
        .build();
    fs.fail_open("/in/a");
    let mut r = reader(&fs, vec![whole(&fs, "/in/a")?]);
    assert!(matches!(r.has_next(), Err(Error::ComponentOpen { .. })));
    assert_eq!(r.records_read(), 0);
    Ok(())
}

#[test]
fn truncated_file_is_a_decode_error_mid_stream() -> Result<()> {
    let records = numbered_records("t", 10, 32);
    let mut bytes = seqfile_bytes("/in/t", &records)?;
    bytes.truncate(bytes.len() - 5);
    let fs = FakeFileSystem::new();
    fs.add_file("/in/t", bytes);

    let mut r = reader(&fs, vec![whole(&fs, "/in/t")?]);
    let mut good = 0;
    let err = loop {
        match r.next_record() {
            Ok(_) => good += 1,
            Err(e) => break e,
        }
    };
    assert_eq!(good, 9);
    assert!(matches!(err, Error::RecordDecode { .. }));
    assert!(matches!(r.next_record(), Err(Error::ReaderFailed { .. })));
    assert_eq!(fs.open_handles(), 0);
    Ok(())
}

#[test]
fn dropping_a_reader_mid_component_releases_its_handle() -> Result<()> {
    let fs = FakeCluster::new()
        .seqfile("/in/a", &numbered_records("a", 50, 4), &[])?
        .build();
    let mut r = reader(&fs, vec![whole(&fs, "/in/a")?]);
    r.next_record()?;
    assert_eq!(fs.open_handles(), 1);
    r.close();
    assert_eq!(fs.open_handles(), 0);
    Ok(())
}
