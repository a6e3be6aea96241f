//! Shared helpers for the end-to-end replication tests

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Write a file with the given content and permission bits.
pub fn write_file(path: &Path, body: &[u8], mode: u32) {
    fs::write(path, body).expect("write file");
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).expect("set mode");
}

/// Set a file's atime/mtime to whole seconds.
pub fn set_times(path: &Path, secs: i64, nanos: u32) {
    let t = filetime::FileTime::from_unix_time(secs, nanos);
    filetime::set_file_times(path, t, t).expect("set times");
}

/// Inode of a path.
pub fn inode(path: &Path) -> u64 {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).expect("stat").ino()
}

/// Whether any `*.tmp` leftovers exist under a tree.
pub fn has_tmp_leftovers(root: &Path) -> bool {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .any(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(".tmp"))
        })
}
