//! # Store - StrataKV Segment Store
//!
//! The orchestrator that turns a directory of append-only [`segment`] files
//! into a single log-structured key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                SEGMENT STORE                  │
//! │                                               │
//! │ write.rs → rotate if active full → append     │
//! │              |                                │
//! │              v                                │
//! │        active segment (newest, last)          │
//! │                                               │
//! │ read.rs → segments newest → oldest            │
//! │            (first match wins)                 │
//! │                                               │
//! │ compaction.rs → dedup newest-first, rewrite   │
//! │                 into fresh segments           │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module          | Purpose                                              |
//! |-----------------|------------------------------------------------------|
//! | `lib.rs`        | `SegmentStore` struct, constructor/recovery, accessors, `Debug` |
//! | `guard.rs`      | directory validation + marker file lifecycle         |
//! | `write.rs`      | `set()` with pre-write rotation                      |
//! | `read.rs`       | `get()` with per-segment defensive skip              |
//! | `compaction.rs` | `compact()` — newest-first dedup into fresh segments |
//!
//! ## On-Disk Layout
//!
//! ```text
//! <root>/
//!   .strata             zero-length marker certifying the directory format
//!   segment-000000.seg  oldest segment
//!   segment-000001.seg  ...
//!   segment-000002.seg  active segment (newest, receives writes)
//! ```
//!
//! Segment names embed an explicit monotonically increasing sequence id
//! owned by the store, so lexical file-name order equals creation order and
//! no wall-clock collision is possible.
//!
//! ## Durability
//!
//! Every append is fsynced before `set` returns: a record is either durable
//! or was never acknowledged. There is no checksum layer; corruption is
//! caught only when record parsing fails, and the read path skips such
//! records per segment instead of failing the lookup.

mod compaction;
mod guard;
mod read;
mod write;

pub use guard::{GuardError, MARKER_FILENAME};

use anyhow::{Context, Result};
use segment::{parse_segment_id, segment_file_name, Segment};
use std::fs;
use std::path::{Path, PathBuf};

/// Default segment byte threshold used when callers have no opinion.
pub const DEFAULT_SEGMENT_BYTES: u64 = 1024 * 1024;

/// A log-structured key-value store over multiple bounded-size segments.
///
/// # Write Path
///
/// 1. Rotate first: if no segment exists or the active segment's cursor has
///    reached the threshold, open a fresh segment (so a segment overshoots
///    the threshold by at most one record).
/// 2. Serialize the record line, update the active index, append + fsync.
///
/// # Read Path
///
/// Scan segments newest → oldest; the first segment whose index knows the
/// key answers. An unreadable record is treated as a miss for that segment
/// and the scan continues — older data stays available past a bad segment.
///
/// # Recovery
///
/// On [`open`](SegmentStore::open) the directory is validated (marker file)
/// and every `segment-*.seg` file is replayed to rebuild its index. The
/// rebuild is deterministic: the same on-disk state always reproduces the
/// same index contents.
///
/// Single-threaded by design: mutating operations take `&mut self`, no
/// locks, and two instances over one directory are unsupported.
pub struct SegmentStore {
    /// Database directory holding the marker and all segment files.
    pub(crate) root: PathBuf,
    /// Segments oldest → newest; the last one is active.
    pub(crate) segments: Vec<Segment>,
    /// Rotation threshold in bytes, clamped to >= 1.
    pub(crate) threshold: u64,
    /// Sequence id for the next segment file.
    pub(crate) next_segment_id: u64,
}

impl std::fmt::Debug for SegmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentStore")
            .field("root", &self.root)
            .field("segment_count", &self.segments.len())
            .field("threshold", &self.threshold)
            .field("next_segment_id", &self.next_segment_id)
            .field(
                "active_cursor",
                &self.segments.last().map(|s| s.index().cursor()),
            )
            .finish()
    }
}

impl SegmentStore {
    /// Opens (or creates) a store rooted at `root`.
    ///
    /// # Arguments
    ///
    /// * `root` — database directory. Created (with the marker file) when
    ///   absent; rejected with [`GuardError`] when it exists but is not a
    ///   recognized store directory.
    /// * `segment_bytes_threshold` — rotation threshold in bytes, clamped
    ///   to a minimum of 1 to rule out an unbounded active segment.
    ///
    /// # Recovery Steps
    ///
    /// 1. Run the directory guard (create-or-validate, exactly once).
    /// 2. Enumerate `segment-*.seg` files and sort by sequence id.
    /// 3. Replay each file to rebuild its in-memory index.
    /// 4. Continue the id counter from the highest id found.
    pub fn open<P: AsRef<Path>>(root: P, segment_bytes_threshold: u64) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        guard::prepare(&root)
            .with_context(|| format!("failed to open store at {}", root.display()))?;

        let mut ids: Vec<u64> = Vec::new();
        for entry in fs::read_dir(&root)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(id) = parse_segment_id(&path) {
                    ids.push(id);
                }
            }
        }
        // Oldest first; zero-padded ids make this equal to lexical order.
        ids.sort_unstable();

        let mut segments = Vec::with_capacity(ids.len());
        for id in &ids {
            let path = root.join(segment_file_name(*id));
            let seg = Segment::open(&path)
                .with_context(|| format!("failed to replay segment {}", path.display()))?;
            tracing::debug!(
                segment = %path.display(),
                keys = seg.index().len(),
                bytes = seg.index().cursor(),
                "recovered segment index"
            );
            segments.push(seg);
        }

        let next_segment_id = ids.last().map(|id| id + 1).unwrap_or(0);

        Ok(Self {
            root,
            segments,
            threshold: segment_bytes_threshold.max(1),
            next_segment_id,
        })
    }

    /// Number of segments currently backing the store.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// The configured rotation threshold in bytes.
    #[must_use]
    pub fn segment_bytes_threshold(&self) -> u64 {
        self.threshold
    }

    /// Updates the rotation threshold. Useful for testing or runtime tuning.
    pub fn set_segment_bytes_threshold(&mut self, threshold: u64) {
        self.threshold = threshold.max(1);
    }

    /// The database directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Segments oldest → newest, for inspection and tests.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Hands out a fresh segment under the next sequence id.
    ///
    /// The id counter never moves backwards, so rotation never collides
    /// with names already burned by a compaction rewrite.
    pub(crate) fn allocate_segment(&mut self) -> Segment {
        let path = self.root.join(segment_file_name(self.next_segment_id));
        self.next_segment_id += 1;
        Segment::create(path)
    }
}

#[cfg(test)]
mod tests;
