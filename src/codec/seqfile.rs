//! A reference record codec for tests and local runs.
//!
//! The reader and planner only rely on the [`RecordCodec`] seam; this module
//! is one small implementation of it, used to exercise splitting, sync
//! recovery and the composite reader against real bytes. It is not meant as
//! an interchange format, and files it writes are only read back by this
//! module.
//!
//! Layout used by this codec (all integers big-endian):
//!
//! ```text
//! header   := MAGIC (4 bytes) sync (16 bytes)
//! entry    := record | escape
//! escape   := i32 -1, sync (16 bytes)
//! record   := i32 record_len, i32 key_len, key, value
//! ```
//!
//! `record_len` is `key_len + value_len`. The writer emits an escape before a
//! record once at least [`SYNC_INTERVAL`] bytes have been written since the
//! previous one, so a reader dropped at an arbitrary offset can scan forward
//! to the next sync marker and resume on a record boundary.
//!
//! # Range ownership
//!
//! A stream opened on `[start, start + length)` reads from the first sync at or
//! after `start` (or from the header end when `start` is zero) and keeps going
//! until it reads a sync that begins at or beyond the end of the range. Every
//! sync block therefore belongs to exactly one range, and adjacent ranges of
//! the same file yield every record exactly once.

use super::{Record, RecordCodec, RecordStream};
use crate::fs::{FileSystem, ReadSeek};
use crate::split::SplitComponent;
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const MAGIC: [u8; 4] = *b"SQF\x01";
pub const SYNC_HASH_SIZE: usize = 16;
/// Escape marker plus sync hash.
pub const SYNC_SIZE: u64 = 4 + SYNC_HASH_SIZE as u64;
/// Minimum number of bytes between two sync markers.
pub const SYNC_INTERVAL: u64 = 100 * SYNC_SIZE;
pub const HEADER_LEN: u64 = MAGIC.len() as u64 + SYNC_HASH_SIZE as u64;

const SYNC_ESCAPE: i32 = -1;

/// The 16-byte marker a file uses between sync blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncMarker(pub [u8; SYNC_HASH_SIZE]);

impl SyncMarker {
    /// Derive a marker from arbitrary seed bytes.
    #[must_use]
    pub fn derive(seed: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"seqcombine-sync");
        hasher.update(seed);
        let digest = hasher.finalize();
        let bytes: &[u8] = digest.as_ref();
        let mut out = [0u8; SYNC_HASH_SIZE];
        out.copy_from_slice(&bytes[..SYNC_HASH_SIZE]);
        Self(out)
    }

    /// A marker unique to `path` and the current time.
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let mut seed = path.to_string_lossy().into_owned().into_bytes();
        seed.extend_from_slice(&nanos.to_be_bytes());
        Self::derive(&seed)
    }
}

/// Writes records in the sequence-file layout.
pub struct RecordWriter<W: Write> {
    out: W,
    sync: SyncMarker,
    pos: u64,
    last_sync: u64,
    records: u64,
}

impl RecordWriter<BufWriter<File>> {
    /// Create (or truncate) a record file on the local filesystem.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or the header cannot be
    /// written.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), SyncMarker::for_path(path))
    }
}

impl<W: Write> RecordWriter<W> {
    /// Wrap `out` and write the file header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be written.
    pub fn new(mut out: W, sync: SyncMarker) -> Result<Self> {
        out.write_all(&MAGIC)?;
        out.write_all(&sync.0)?;
        Ok(Self {
            out,
            sync,
            pos: HEADER_LEN,
            last_sync: 0,
            records: 0,
        })
    }

    /// Append one record, writing a sync marker first if one is due.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is too large or the write fails.
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let too_large = || {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "record larger than i32::MAX bytes",
            )
        };
        let key_len = i32::try_from(key.len()).map_err(|_| too_large())?;
        let record_len = key
            .len()
            .checked_add(value.len())
            .and_then(|n| i32::try_from(n).ok())
            .ok_or_else(too_large)?;

        if self.pos >= self.last_sync + SYNC_INTERVAL {
            self.sync()?;
        }
        self.out.write_all(&record_len.to_be_bytes())?;
        self.out.write_all(&key_len.to_be_bytes())?;
        self.out.write_all(key)?;
        self.out.write_all(value)?;
        self.pos += 8 + key.len() as u64 + value.len() as u64;
        self.records += 1;
        Ok(())
    }

    pub fn append_record(&mut self, record: &Record) -> Result<()> {
        self.append(&record.key, &record.value)
    }

    /// Force a sync marker at the current position.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn sync(&mut self) -> Result<()> {
        if self.last_sync != self.pos {
            self.last_sync = self.pos;
            self.out.write_all(&SYNC_ESCAPE.to_be_bytes())?;
            self.out.write_all(&self.sync.0)?;
            self.pos += SYNC_SIZE;
        }
        Ok(())
    }

    /// Bytes written so far, header included.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Flush and hand back the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// The sequence-file codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeqFileCodec;

impl RecordCodec for SeqFileCodec {
    fn sync_interval(&self) -> u64 {
        SYNC_INTERVAL
    }

    fn open_range(
        &self,
        fs: &dyn FileSystem,
        component: &SplitComponent,
    ) -> Result<Box<dyn RecordStream>> {
        let stream = SeqFileStream::open(fs, component)?;
        Ok(Box::new(stream))
    }
}

struct SeqFileStream {
    path: PathBuf,
    input: Box<dyn ReadSeek>,
    sync: [u8; SYNC_HASH_SIZE],
    pos: u64,
    end: u64,
    file_len: u64,
    sync_seen: bool,
    more: bool,
}

impl SeqFileStream {
    fn open(fs: &dyn FileSystem, component: &SplitComponent) -> Result<Self> {
        let path = component.path.clone();
        let file_len = fs.status(&path)?.len;
        let mut input = fs.open(&path)?;

        let mut header = [0u8; HEADER_LEN as usize];
        if read_full(&mut input, &mut header)? < header.len() {
            return Err(Error::decode(path, 0, "truncated file header"));
        }
        if header[..MAGIC.len()] != MAGIC {
            return Err(Error::decode(path, 0, "not a sequence record file"));
        }
        let mut sync = [0u8; SYNC_HASH_SIZE];
        sync.copy_from_slice(&header[MAGIC.len()..]);

        let Some(end) = component.start.checked_add(component.length) else {
            return Err(Error::decode(path, component.start, "range end overflows"));
        };
        let mut stream = Self {
            path,
            input,
            sync,
            pos: HEADER_LEN,
            end,
            file_len,
            sync_seen: false,
            more: component.start < end,
        };
        if component.start > 0 {
            stream.sync_to(component.start)?;
        }
        log::debug!(
            "opened {} for [{}, {}) at byte {}",
            stream.path.display(),
            component.start,
            end,
            stream.pos
        );
        Ok(stream)
    }

    /// Position the stream at the first sync escape starting at or after
    /// `position`, or at end of file when there is none.
    fn sync_to(&mut self, position: u64) -> Result<()> {
        if position.saturating_add(SYNC_SIZE) >= self.file_len {
            self.seek(self.file_len)?;
            return Ok(());
        }
        self.seek(position + 4)?;
        let mut window = [0u8; SYNC_HASH_SIZE];
        if read_full(&mut self.input, &mut window)? < SYNC_HASH_SIZE {
            self.seek(self.file_len)?;
            return Ok(());
        }
        self.pos += SYNC_HASH_SIZE as u64;

        let mut i = 0usize;
        loop {
            let matched = (0..SYNC_HASH_SIZE)
                .all(|j| self.sync[j] == window[(i + j) % SYNC_HASH_SIZE]);
            if matched {
                // Back up to the escape in front of the hash.
                return self.seek(self.pos - SYNC_SIZE);
            }
            let mut byte = [0u8; 1];
            if read_full(&mut self.input, &mut byte)? == 0 {
                return Ok(());
            }
            self.pos += 1;
            window[i % SYNC_HASH_SIZE] = byte[0];
            i += 1;
        }
    }

    fn seek(&mut self, to: u64) -> Result<()> {
        self.pos = self.input.seek(SeekFrom::Start(to))?;
        Ok(())
    }

    /// Read a length prefix; `None` on a clean end of file.
    fn read_int(&mut self) -> Result<Option<i32>> {
        let mut buf = [0u8; 4];
        match read_full(&mut self.input, &mut buf)? {
            0 => Ok(None),
            4 => {
                self.pos += 4;
                Ok(Some(i32::from_be_bytes(buf)))
            }
            _ => Err(Error::decode(&self.path, self.pos, "truncated length prefix")),
        }
    }

    fn read_bytes(&mut self, len: usize, what: &str) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        if read_full(&mut self.input, &mut buf)? < len {
            return Err(Error::decode(&self.path, self.pos, format!("truncated {what}")));
        }
        self.pos += len as u64;
        Ok(buf)
    }

    fn fail<T>(&mut self, offset: u64, reason: impl Into<String>) -> Result<T> {
        self.more = false;
        Err(Error::decode(&self.path, offset, reason))
    }
}

impl RecordStream for SeqFileStream {
    fn next_record(&mut self) -> Result<Option<Record>> {
        if !self.more {
            return Ok(None);
        }
        let entry_start = self.pos;
        let Some(mut record_len) = self.read_int()? else {
            self.more = false;
            return Ok(None);
        };

        if record_len == SYNC_ESCAPE {
            let marker = self.read_bytes(SYNC_HASH_SIZE, "sync marker")?;
            if marker != self.sync {
                return self.fail(entry_start, "sync marker mismatch");
            }
            self.sync_seen = true;
            match self.read_int()? {
                Some(len) => record_len = len,
                None => {
                    self.more = false;
                    return Ok(None);
                }
            }
        } else {
            self.sync_seen = false;
        }

        if entry_start >= self.end && self.sync_seen {
            self.more = false;
            return Ok(None);
        }

        let record_start = self.pos - 4;
        let Ok(record_len) = u64::try_from(record_len) else {
            return self.fail(record_start, format!("negative record length {record_len}"));
        };
        let remaining = self.file_len.saturating_sub(self.pos);
        if record_len + 4 > remaining {
            return self.fail(
                record_start,
                format!("record length {record_len} runs past end of file"),
            );
        }
        let Some(key_len) = self.read_int()? else {
            return self.fail(record_start, "missing key length");
        };
        let Ok(key_len) = u64::try_from(key_len) else {
            return self.fail(record_start, format!("negative key length {key_len}"));
        };
        if key_len > record_len {
            return self.fail(
                record_start,
                format!("key length {key_len} exceeds record length {record_len}"),
            );
        }

        let key = self.read_bytes(key_len as usize, "key")?;
        let value = self.read_bytes((record_len - key_len) as usize, "value")?;
        Ok(Some(Record { key, value }))
    }

    fn position(&self) -> u64 {
        self.pos
    }
}

/// Read until `buf` is full or the input ends; returns the bytes read.
fn read_full(input: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
