//! Read path: `get()` scans segments newest → oldest.
//!
//! The first segment whose index knows the key answers, so the newest write
//! always wins. An unreadable record (I/O failure, corruption) is logged
//! and treated as a miss for that segment only — the scan continues into
//! older segments rather than surfacing one bad segment's failure to the
//! caller.

use anyhow::Result;
use segment::{Segment, SegmentError};

use crate::SegmentStore;

impl SegmentStore {
    /// Looks up the current value of a key.
    ///
    /// Returns `Ok(None)` when no segment holds the key — "not found" is a
    /// normal result, not an error, and per-segment lookup misses never
    /// escape this API.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lookup_segments(&self.segments, key))
    }
}

/// Resolves a key against a segment list with live read semantics.
///
/// Shared between [`SegmentStore::get`] and compaction, which must observe
/// exactly what a caller would observe (newest record wins, bad records
/// skipped) rather than copying raw bytes.
pub(crate) fn lookup_segments(segments: &[Segment], key: &str) -> Option<String> {
    for seg in segments.iter().rev() {
        match seg.read_value(key) {
            Ok(value) => return Some(value),
            Err(SegmentError::KeyNotFound) => continue,
            Err(err) => {
                tracing::warn!(
                    segment = %seg.path().display(),
                    %err,
                    "skipping unreadable record, continuing into older segments"
                );
                continue;
            }
        }
    }
    None
}
