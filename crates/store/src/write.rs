//! Write path: `set()` with pre-write rotation.
//!
//! The rotation check runs **before** the append, so a segment may exceed
//! the threshold by at most one record's length, never by more. Once a
//! segment stops being active it is never written again.

use anyhow::{ensure, Context, Result};
use segment::encode_record;

use crate::SegmentStore;

impl SegmentStore {
    /// Inserts or updates a key.
    ///
    /// The value is an opaque, already-serialized single-line payload; the
    /// store does not interpret it beyond the line framing. A newer value
    /// for an existing key is appended as a fresh record — older records
    /// stay on disk until compaction discards them.
    ///
    /// # Errors
    ///
    /// Returns an error when the key is empty or either side would break
    /// line framing (a `,` in the key, a newline in key or value), and on
    /// I/O failure during the append. A failed append does not roll back
    /// the already-updated in-memory index.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        ensure!(!key.is_empty(), "key must not be empty");
        ensure!(
            !key.contains(','),
            "key must not contain the record separator ','"
        );
        ensure!(
            !key.contains('\n') && !value.contains('\n'),
            "keys and values must not contain newlines"
        );

        // Rotate before writing, never after.
        let rotate = self
            .segments
            .last()
            .map_or(true, |seg| seg.index().cursor() >= self.threshold);
        if rotate {
            let seg = self.allocate_segment();
            tracing::debug!(segment = %seg.path().display(), "rotating to new active segment");
            self.segments.push(seg);
        }

        let line = encode_record(key, value);
        let active = self
            .segments
            .last_mut()
            .ok_or_else(|| anyhow::anyhow!("no active segment after rotation check"))?;
        active
            .append(&line, key)
            .with_context(|| format!("failed to append record for key '{}'", key))?;

        Ok(())
    }
}
