//! Atomic replacement helpers
//!
//! Live systems may carry immutable or append-only file flags that make a
//! plain rename or link fail. These wrappers clear the blocking flags,
//! retry once, and restore the flags afterwards so an update stays atomic
//! from any reader's point of view.

use crate::host::Host;
use std::io;
use std::path::Path;

/// Rename `from` over `to`, clearing `to`'s file flags if they block the
/// first attempt.
///
/// `to_flags` is the flag word observed on the destination beforehand (if
/// any); it is restored when the retry also fails.
///
/// # Errors
///
/// Returns the retry's error when both attempts fail.
pub fn safe_rename(
    host: &dyn Host,
    from: &Path,
    to: &Path,
    to_flags: Option<u32>,
) -> io::Result<()> {
    match host.rename(from, to) {
        Ok(()) => Ok(()),
        Err(first) => {
            if host.chflags(to, 0).is_err() {
                return Err(first);
            }
            match host.rename(from, to) {
                Ok(()) => Ok(()),
                Err(second) => {
                    let _ = host.chflags(to, to_flags.unwrap_or(0));
                    Err(second)
                }
            }
        }
    }
}

/// Hard-link `from` to `to`, clearing `from`'s file flags if they block
/// the first attempt. The flags are restored after the retry either way;
/// the retry's error is preserved.
///
/// # Errors
///
/// Returns the retry's error when both attempts fail.
pub fn safe_link(
    host: &dyn Host,
    from: &Path,
    to: &Path,
    from_flags: Option<u32>,
) -> io::Result<()> {
    match host.link(from, to) {
        Ok(()) => Ok(()),
        Err(_first) => {
            let _ = host.chflags(from, 0);
            let result = host.link(from, to);
            if let Some(flags) = from_flags {
                if flags != 0 {
                    let _ = host.chflags(from, flags);
                }
            }
            result
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::host::LocalHost;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn safe_rename_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("from");
        let to = dir.path().join("to");
        fs::write(&from, b"new").unwrap();
        fs::write(&to, b"old").unwrap();

        safe_rename(&LocalHost::new(), &from, &to, None).unwrap();
        assert_eq!(fs::read(&to).unwrap(), b"new");
        assert!(!from.exists());
    }

    #[test]
    fn safe_rename_propagates_hard_failures() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("missing");
        let to = dir.path().join("to");

        assert!(safe_rename(&LocalHost::new(), &from, &to, None).is_err());
    }

    #[test]
    fn safe_link_creates_second_name_for_inode() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("a");
        let to = dir.path().join("b");
        fs::write(&from, b"x").unwrap();

        safe_link(&LocalHost::new(), &from, &to, Some(0)).unwrap();
        use std::os::unix::fs::MetadataExt;
        assert_eq!(
            fs::metadata(&from).unwrap().ino(),
            fs::metadata(&to).unwrap().ino()
        );
    }
}
