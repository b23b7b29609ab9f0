use std::fs;
use std::path::Path;

use segment::SEGMENT_EXT;

/// Counts `.seg` files physically present in a directory.
pub fn count_segment_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == SEGMENT_EXT)
                .unwrap_or(false)
        })
        .count()
}
