//! Compaction: rewrites the live key set into the minimum number of fresh
//! segments that fit the threshold, discarding superseded records.
//!
//! The walk is newest → oldest with a "checked keys" set, so only the most
//! recent write per key survives. Values are fetched through the normal
//! read path, not copied as raw bytes, which keeps compaction consistent
//! with live read semantics (including the defensive skip of unreadable
//! records). The store's segment list is replaced only after the whole
//! rewrite succeeds; a failed rewrite drops its partial output and leaves
//! the live store serving the pre-compaction segments. After the new list
//! is in place the superseded files are deleted best-effort.

use anyhow::Result;
use segment::{encode_record, segment_file_name, Segment};
use std::collections::HashSet;

use crate::read::lookup_segments;
use crate::SegmentStore;

impl SegmentStore {
    /// Consolidates all segments, keeping only each key's current value.
    ///
    /// # Arguments
    ///
    /// * `new_threshold` — byte threshold for the rewritten segments
    ///   (clamped to >= 1). Defaults to the store's configured threshold;
    ///   the override applies to this call only.
    ///
    /// # Algorithm
    ///
    /// 1. Walk the segment list newest → oldest; within a segment walk
    ///    keys in insertion order, skipping keys already checked in a
    ///    newer segment.
    /// 2. Fetch each surviving key's value via the live read path; a key
    ///    unreadable everywhere is dropped rather than aborting.
    /// 3. Append to the open output segment, sealing it and opening the
    ///    next one whenever its cursor reaches the threshold.
    /// 4. Install the rewritten list, then delete the superseded files.
    ///
    /// Repeated compaction at the same threshold is observably idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure while writing a rewritten segment.
    /// The partial output is removed and the pre-compaction segment list
    /// stays installed, so every key remains readable on the live store.
    /// Read failures in old segments are skipped, not propagated.
    pub fn compact(&mut self, new_threshold: Option<u64>) -> Result<()> {
        if self.segments.is_empty() {
            return Ok(());
        }
        let threshold = new_threshold.map_or(self.threshold, |t| t.max(1));

        let mut checked: HashSet<String> = HashSet::new();
        let mut rebuilt: Vec<Segment> = Vec::new();
        // Ids are handed out from a local counter and committed below, so
        // the rewrite can run while the old list is still borrowed.
        let mut next_id = self.next_segment_id;
        let mut current = Segment::create(self.root.join(segment_file_name(next_id)));
        next_id += 1;

        // An append failure stops the walk; the error is handled after the
        // loop, once the old list is no longer borrowed.
        let mut rewrite_error: Option<anyhow::Error> = None;

        'rewrite: for seg in self.segments.iter().rev() {
            for key in seg.index().keys() {
                if !checked.insert(key.to_string()) {
                    continue;
                }

                let value = match lookup_segments(&self.segments, key) {
                    Some(v) => v,
                    // Unreadable in every segment: nothing live to carry over.
                    None => continue,
                };

                if current.index().cursor() >= threshold {
                    rebuilt.push(current);
                    current = Segment::create(self.root.join(segment_file_name(next_id)));
                    next_id += 1;
                }

                let line = encode_record(key, &value);
                if let Err(err) = current.append(&line, key) {
                    rewrite_error = Some(anyhow::Error::new(err).context(format!(
                        "failed to rewrite record for key '{}'",
                        key
                    )));
                    break 'rewrite;
                }
            }
        }

        // The id counter advances even when the rewrite failed: discarded
        // output names are never reused by later writes.
        self.next_segment_id = next_id;

        if let Some(err) = rewrite_error {
            // Drop the partial output. The old list was never touched, so
            // the store keeps serving exactly what it served before.
            rebuilt.push(current);
            for partial in &rebuilt {
                let _ = std::fs::remove_file(partial.path());
            }
            return Err(err);
        }

        if !current.index().is_empty() {
            rebuilt.push(current);
        }

        // The rewritten segments are durable (every append fsyncs), so the
        // superseded files can go. Removal is best-effort: a leftover file
        // carries a lower sequence id than every rewritten segment, so it
        // loses all newest-first lookups after the next open anyway.
        let old_segments = std::mem::replace(&mut self.segments, rebuilt);
        for seg in &old_segments {
            let _ = std::fs::remove_file(seg.path());
        }

        tracing::info!(
            before = old_segments.len(),
            after = self.segments.len(),
            keys = checked.len(),
            threshold,
            "compaction complete"
        );

        Ok(())
    }
}
