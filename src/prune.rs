//! Destination pruning
//!
//! Removes destination objects that have no counterpart at the source, and
//! whole destination trees that a non-directory source must replace.
//! Removal never crosses below the device of the call site, so a mount
//! point inside the destination tree is left untouched.

use crate::counters::Counters;
use crate::host::{FileKind, FileStat, Host};
use crate::replicate::Options;
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Remove `path` and everything below it, bounded to `dev_bound` (the
/// destination device of the call site; derived from `path` itself when
/// the caller has no hint). Returns the number of per-entry failures.
pub fn remove_tree(
    host: &dyn Host,
    opts: &Options,
    counters: &mut Counters,
    path: &Path,
    dev_bound: Option<u64>,
) -> u64 {
    let Ok(st) = host.lstat(path) else {
        return 0;
    };
    let bound = dev_bound.unwrap_or(st.dev);
    remove_node(host, opts, counters, path, &st, bound)
}

fn remove_node(
    host: &dyn Host,
    opts: &Options,
    counters: &mut Counters,
    path: &Path,
    st: &FileStat,
    dev_bound: u64,
) -> u64 {
    let mut failures = 0;

    if st.kind() == FileKind::Directory {
        if st.dev != dev_bound {
            warn!("{} not removed (mount point)", path.display());
            return 0;
        }
        match host.read_dir(path) {
            Ok(entries) => {
                for name in entries {
                    let child = path.join(&name);
                    if let Ok(child_st) = host.lstat(&child) {
                        failures +=
                            remove_node(host, opts, counters, &child, &child_st, dev_bound);
                    }
                }
            }
            Err(e) => {
                error!("{} readdir failed: {}", path.display(), e);
                failures += 1;
            }
        }
        if !may_remove(opts, path) {
            return failures;
        }
        if st.flags.unwrap_or(0) != 0 {
            let _ = host.chflags(path, 0);
        }
        match host.rmdir(path) {
            Ok(()) => {
                counters.add_removed_item();
                info!("{} rmdir-ok", path.display());
            }
            Err(e) if opts.interactive && e.raw_os_error() == Some(libc::ENOTEMPTY) => {
                // Contents were kept at the prompt; the directory stays.
                debug!("{} kept (not empty)", path.display());
            }
            Err(e) => {
                error!("{} rmdir failed: {}", path.display(), e);
                failures += 1;
            }
        }
    } else {
        if !may_remove(opts, path) {
            return failures;
        }
        if st.flags.unwrap_or(0) != 0 {
            let _ = host.chflags(path, 0);
        }
        match host.remove(path) {
            Ok(()) => {
                counters.add_removed_item();
                info!("{} remove-ok", path.display());
            }
            Err(e) => {
                error!("{} remove failed: {}", path.display(), e);
                failures += 1;
            }
        }
    }
    failures
}

fn may_remove(opts: &Options, path: &Path) -> bool {
    if opts.no_remove {
        info!("{} not-removed", path.display());
        return false;
    }
    if opts.interactive {
        return confirm_removal(path);
    }
    true
}

/// Ask on standard error, read the answer from standard input. Only an
/// explicit `y`/`Y` confirms.
fn confirm_removal(path: &Path) -> bool {
    eprint!("remove {} (Yes/No) [No]? ", path.display());
    let _ = io::stderr().flush();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim_start().chars().next(), Some('y' | 'Y'))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::host::LocalHost;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn removes_nested_tree_and_counts_each_object() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("victim");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("a"), b"x").unwrap();
        fs::write(root.join("sub/b"), b"y").unwrap();

        let host = LocalHost::new();
        let opts = Options::default();
        let mut counters = Counters::new();
        let failures = remove_tree(&host, &opts, &mut counters, &root, None);

        assert_eq!(failures, 0);
        assert!(!root.exists());
        // a, sub/b, sub, victim
        assert_eq!(counters.removed_items, 4);
    }

    #[test]
    fn no_remove_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("victim");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("a"), b"x").unwrap();

        let host = LocalHost::new();
        let opts = Options {
            no_remove: true,
            ..Options::default()
        };
        let mut counters = Counters::new();
        let failures = remove_tree(&host, &opts, &mut counters, &root, None);

        assert_eq!(failures, 0);
        assert!(root.join("a").exists());
        assert_eq!(counters.removed_items, 0);
    }

    #[test]
    fn vanished_target_is_not_a_failure() {
        let dir = TempDir::new().unwrap();
        let host = LocalHost::new();
        let opts = Options::default();
        let mut counters = Counters::new();
        assert_eq!(
            remove_tree(&host, &opts, &mut counters, &dir.path().join("gone"), None),
            0
        );
    }
}
