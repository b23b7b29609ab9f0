//! # Segment — append-only record files and their in-memory indexes
//!
//! A segment is one append-only file on disk paired with a [`SegmentIndex`]
//! that maps each key to the byte range of its **most recent** record within
//! that file. The index is rebuilt by replaying the file on
//! [`open`](Segment::open); nothing about the index itself is ever persisted.
//!
//! ## Record Format
//!
//! One record per line:
//!
//! ```text
//! key,value\n
//! ```
//!
//! The split point on read is the **first** comma — everything after it
//! (including further commas) is the opaque value payload. Keys therefore
//! must not contain `,` or `\n`; the caller validates this before writing.
//! Records are immutable: a newer value for the same key is appended as a
//! fresh record, never rewritten in place.
//!
//! ## Example
//!
//! ```rust,no_run
//! use segment::{encode_record, Segment};
//!
//! let mut seg = Segment::create("segment-000000.seg");
//! let line = encode_record("name", "alice");
//! seg.append(&line, "name").unwrap();
//! assert_eq!(seg.read_value("name").unwrap(), "alice");
//! ```

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Prefix shared by every segment file name.
pub const SEGMENT_PREFIX: &str = "segment-";

/// Extension shared by every segment file name.
pub const SEGMENT_EXT: &str = "seg";

/// The byte that splits a record line into key and value.
pub const RECORD_SEPARATOR: char = ',';

/// Builds the file name for the segment with the given sequence id.
///
/// Ids are zero-padded so that lexical file-name order equals creation
/// order: `segment-000000.seg`, `segment-000001.seg`, ...
pub fn segment_file_name(id: u64) -> String {
    format!("{}{:06}.{}", SEGMENT_PREFIX, id, SEGMENT_EXT)
}

/// Parses the sequence id out of a segment file path.
///
/// `segment-000042.seg` → `Some(42)`. Returns `None` for anything that does
/// not follow the naming convention (marker files, temp files, etc.).
pub fn parse_segment_id(path: &Path) -> Option<u64> {
    if path.extension().and_then(|e| e.to_str()) != Some(SEGMENT_EXT) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let id_str = stem.strip_prefix(SEGMENT_PREFIX)?;
    id_str.parse().ok()
}

/// Serializes a key-value pair into one newline-terminated record line.
pub fn encode_record(key: &str, value: &str) -> String {
    format!("{}{}{}\n", key, RECORD_SEPARATOR, value)
}

/// Splits a record line at the first separator into `(key, value)`.
///
/// The trailing newline (if any) is stripped from the value. Returns `None`
/// when the line contains no separator at all.
pub fn split_record(line: &str) -> Option<(&str, &str)> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.split_once(RECORD_SEPARATOR)
}

/// Errors that can occur during segment operations.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The key is not present in this segment's index.
    #[error("key not found")]
    KeyNotFound,

    /// The bytes at a recorded offset no longer parse as a record.
    #[error("corrupt record: {0}")]
    Corrupt(&'static str),
}

/// The byte range of one record within a segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSpan {
    /// Byte offset of the record's first byte.
    pub offset: u64,
    /// Record length in bytes, including the trailing newline. Always > 0.
    pub len: u64,
}

/// In-memory index for one segment file.
///
/// Maps each key to the [`RecordSpan`] of its most recently appended record
/// and tracks a monotonically increasing write cursor (the next append
/// offset). Re-recording a key overwrites its span — later write wins —
/// without duplicating it in the insertion-order list.
///
/// The index never touches disk and knows nothing about other segments.
#[derive(Debug, Default)]
pub struct SegmentIndex {
    spans: HashMap<String, RecordSpan>,
    /// Keys in first-insertion order, for deterministic iteration.
    order: Vec<String>,
    cursor: u64,
}

impl SegmentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one serialized line at the current cursor and advances the
    /// cursor by the line's byte length.
    ///
    /// `known_key` lets a caller that just constructed the line skip the
    /// re-parse; when omitted the key is derived by splitting the line at
    /// the first separator (a separator-less line indexes under the whole
    /// trimmed line, matching what replay sees on a malformed file).
    pub fn record(&mut self, line: &str, known_key: Option<&str>) {
        let key = match known_key {
            Some(k) => k,
            None => line
                .strip_suffix('\n')
                .unwrap_or(line)
                .split(RECORD_SEPARATOR)
                .next()
                .unwrap_or(""),
        };

        let span = RecordSpan {
            offset: self.cursor,
            len: line.len() as u64,
        };
        if self.spans.insert(key.to_string(), span).is_none() {
            self.order.push(key.to_string());
        }
        self.cursor += line.len() as u64;
    }

    /// Looks up the span of a key's most recent record in this segment.
    pub fn lookup(&self, key: &str) -> Result<RecordSpan, SegmentError> {
        self.span(key).ok_or(SegmentError::KeyNotFound)
    }

    /// Infallible variant of [`lookup`](SegmentIndex::lookup).
    #[must_use]
    pub fn span(&self, key: &str) -> Option<RecordSpan> {
        self.spans.get(key).copied()
    }

    /// Next write offset — equals the byte length of everything recorded.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Number of distinct keys in this segment.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Iterates keys in first-insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|k| k.as_str())
    }
}

/// One append-only file on disk plus its in-memory index.
///
/// File handles are scoped to each call: [`append`](Segment::append) and
/// [`read_value`](Segment::read_value) open, use, and close the file before
/// returning, so no descriptor outlives an operation.
#[derive(Debug)]
pub struct Segment {
    path: PathBuf,
    index: SegmentIndex,
}

impl Segment {
    /// Creates a fresh segment with an empty index.
    ///
    /// The file itself is created lazily on the first append.
    pub fn create<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            index: SegmentIndex::new(),
        }
    }

    /// Opens an existing segment file, rebuilding its index by replaying
    /// every record from start to end.
    ///
    /// Replay is deterministic: reopening the same file always reproduces
    /// the same spans and cursor.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, SegmentError> {
        let path = path.into();
        let file = File::open(&path)?;
        let mut rdr = BufReader::new(file);
        let mut index = SegmentIndex::new();

        // read_line keeps the trailing newline, so the cursor arithmetic
        // sees the exact on-disk byte count per record.
        let mut line = String::new();
        loop {
            line.clear();
            if rdr.read_line(&mut line)? == 0 {
                break;
            }
            index.record(&line, None);
        }

        Ok(Self { path, index })
    }

    /// Appends one record line: index first, then the file bytes.
    ///
    /// The write is fsynced before returning, so a record is either durable
    /// or was never acknowledged. If the disk write fails after the index
    /// update, the in-memory entry is not rolled back.
    pub fn append(&mut self, line: &str, key: &str) -> Result<(), SegmentError> {
        self.index.record(line, Some(key));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Reads back the value of a key's most recent record in this segment.
    ///
    /// Seeks to the recorded span, reads exactly `len` bytes, and splits at
    /// the first separator. A short read surfaces as `Io`; bytes that are
    /// not UTF-8 or carry no separator surface as `Corrupt`.
    pub fn read_value(&self, key: &str) -> Result<String, SegmentError> {
        let span = self.index.lookup(key)?;

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(span.offset))?;
        let mut buf = vec![0u8; span.len as usize];
        file.read_exact(&mut buf)?;

        let line = std::str::from_utf8(&buf)
            .map_err(|_| SegmentError::Corrupt("record is not valid UTF-8"))?;
        let (_, value) =
            split_record(line).ok_or(SegmentError::Corrupt("record has no separator"))?;
        Ok(value.to_string())
    }

    /// Path of the segment file on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// This segment's in-memory index.
    #[must_use]
    pub fn index(&self) -> &SegmentIndex {
        &self.index
    }
}
