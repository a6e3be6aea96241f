//! Run totals for the end-of-run summary
//!
//! The engine is single-threaded, so the counters are plain `u64` fields
//! updated in place. They are monotonic for the duration of a run and are
//! reported once at the end unless `--quiet` is in effect.

/// Byte and item totals accumulated over one replication run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    /// Bytes attributed to source regular files (`st_blocks * 512`)
    pub source_bytes: u64,
    /// Source objects visited (files, directories, links, devices)
    pub source_items: u64,
    /// Objects created or replaced at the destination
    pub copied_items: u64,
    /// Bytes read from source file content
    pub read_bytes: u64,
    /// Bytes written to destination file content
    pub written_bytes: u64,
    /// Objects removed from the destination
    pub removed_items: u64,
}

impl Counters {
    /// Create a zeroed counter set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one source object, with its block-rounded size for files
    pub fn add_source_item(&mut self, bytes: u64) {
        self.source_items += 1;
        self.source_bytes += bytes;
    }

    /// Record one object created or replaced at the destination
    pub fn add_copied_item(&mut self) {
        self.copied_items += 1;
    }

    /// Record content bytes read from the source
    pub fn add_read_bytes(&mut self, bytes: u64) {
        self.read_bytes += bytes;
    }

    /// Record content bytes written to the destination
    pub fn add_written_bytes(&mut self, bytes: u64) {
        self.written_bytes += bytes;
    }

    /// Record one object removed from the destination
    pub fn add_removed_item(&mut self) {
        self.removed_items += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let c = Counters::new();
        assert_eq!(c, Counters::default());
        assert_eq!(c.source_items, 0);
        assert_eq!(c.copied_items, 0);
    }

    #[test]
    fn counters_accumulate() {
        let mut c = Counters::new();
        c.add_source_item(1024);
        c.add_source_item(0);
        c.add_copied_item();
        c.add_read_bytes(512);
        c.add_written_bytes(512);
        c.add_removed_item();

        assert_eq!(c.source_items, 2);
        assert_eq!(c.source_bytes, 1024);
        assert_eq!(c.copied_items, 1);
        assert_eq!(c.read_bytes, 512);
        assert_eq!(c.written_bytes, 512);
        assert_eq!(c.removed_items, 1);
    }
}
