//! Hardlink topology tracking
//!
//! The first time a multiply-linked source inode is seen, the destination
//! path of its first copy is recorded here. Every later sighting of the
//! same inode links against that recorded path instead of copying again,
//! rebuilding the shared-inode topology at the destination.
//!
//! One table spans the whole run: hardlink groups routinely cross
//! directory boundaries. Entries count their sightings and retire once the
//! whole group (the source's `nlink`) has been seen, so the table is empty
//! at the end of a run that visited every member.

use crate::host::FileStat;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Key identifying one source inode
pub type InodeKey = (u64, u64);

/// State for one multiply-linked source inode
#[derive(Debug)]
pub struct HardlinkEntry {
    /// Destination path of the group's first copy
    pub dst_path: PathBuf,
    /// Destination inode once the first copy landed; used to detect
    /// "already correctly linked" on later runs
    pub dst_ino: Option<u64>,
    /// Link count of the source inode
    pub nlink: u64,
    /// Sightings so far, starting at 1 for the entry's creation
    pub seen: u64,
}

/// Source-inode to first-destination-path map
#[derive(Debug, Default)]
pub struct HardlinkTable {
    map: HashMap<InodeKey, HardlinkEntry>,
}

impl HardlinkTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: InodeKey) -> Option<&HardlinkEntry> {
        self.map.get(&key)
    }

    /// Record the first sighting of a source inode and the destination
    /// path its first copy will land at.
    pub fn insert(&mut self, st: &FileStat, dst_path: &Path) {
        self.map.insert(
            (st.dev, st.ino),
            HardlinkEntry {
                dst_path: dst_path.to_path_buf(),
                dst_ino: None,
                nlink: st.nlink,
                seen: 1,
            },
        );
    }

    /// Record the destination inode once the first copy has landed.
    pub fn set_dst_ino(&mut self, key: InodeKey, ino: u64) {
        if let Some(entry) = self.map.get_mut(&key) {
            entry.dst_ino = Some(ino);
        }
    }

    /// Count one more sighting of the inode; the entry retires when the
    /// whole group has been seen. Returns `true` if the entry was removed.
    pub fn record_sighting(&mut self, key: InodeKey) -> bool {
        let done = match self.map.get_mut(&key) {
            Some(entry) => {
                entry.seen += 1;
                entry.seen >= entry.nlink
            }
            None => false,
        };
        if done {
            self.map.remove(&key);
        }
        done
    }

    /// Drop an entry early (used when linking against it failed).
    pub fn remove(&mut self, key: InodeKey) {
        self.map.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(dev: u64, ino: u64, nlink: u64) -> FileStat {
        FileStat {
            mode: 0o100_644,
            uid: 0,
            gid: 0,
            size: 0,
            blocks: 0,
            mtime: 0,
            nlink,
            ino,
            rdev: 0,
            dev,
            flags: None,
            fsmid: None,
        }
    }

    #[test]
    fn entry_lifecycle_retires_at_nlink() {
        let mut table = HardlinkTable::new();
        let st = stat(1, 42, 3);
        table.insert(&st, Path::new("/dst/a"));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get((1, 42)).map(|e| e.seen), Some(1));

        assert!(!table.record_sighting((1, 42)));
        assert_eq!(table.get((1, 42)).map(|e| e.seen), Some(2));

        // Third sighting completes the group of three.
        assert!(table.record_sighting((1, 42)));
        assert!(table.is_empty());
    }

    #[test]
    fn dst_ino_is_recorded_after_first_copy() {
        let mut table = HardlinkTable::new();
        table.insert(&stat(1, 7, 2), Path::new("/dst/first"));
        assert_eq!(table.get((1, 7)).and_then(|e| e.dst_ino), None);

        table.set_dst_ino((1, 7), 99);
        assert_eq!(table.get((1, 7)).and_then(|e| e.dst_ino), Some(99));
        assert_eq!(
            table.get((1, 7)).map(|e| e.dst_path.clone()),
            Some(PathBuf::from("/dst/first"))
        );
    }

    #[test]
    fn failed_link_removes_entry() {
        let mut table = HardlinkTable::new();
        table.insert(&stat(1, 7, 4), Path::new("/dst/first"));
        table.remove((1, 7));
        assert!(table.is_empty());
        assert!(!table.record_sighting((1, 7)));
    }
}
