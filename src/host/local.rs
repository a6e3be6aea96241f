//! Local filesystem endpoint
//!
//! Routes every [`Host`] operation to the OS. Most calls go through std;
//! the ones std has no portable surface for (chflags, mknod, umask,
//! lchown) drop to `libc`.

use super::{FileStat, Host, ReadHandle, WriteHandle};
use std::ffi::{CString, OsString};
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

/// The local OS as a replication endpoint
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalHost;

impl LocalHost {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn cstr(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))
}

fn to_stat(md: &fs::Metadata, flags: Option<u32>) -> FileStat {
    FileStat {
        mode: md.mode(),
        uid: md.uid(),
        gid: md.gid(),
        size: md.size(),
        blocks: md.blocks(),
        mtime: md.mtime(),
        nlink: md.nlink(),
        ino: md.ino(),
        rdev: md.rdev(),
        dev: md.dev(),
        flags,
        fsmid: None,
    }
}

/// Fetch `st_flags` where the platform's stat carries one.
#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd"
))]
fn file_flags(path: &Path, follow: bool) -> Option<u32> {
    let cpath = cstr(path).ok()?;
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let rc = unsafe {
        if follow {
            libc::stat(cpath.as_ptr(), &mut st)
        } else {
            libc::lstat(cpath.as_ptr(), &mut st)
        }
    };
    if rc == 0 {
        Some(st.st_flags as u32)
    } else {
        None
    }
}

#[cfg(not(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd"
)))]
fn file_flags(_path: &Path, _follow: bool) -> Option<u32> {
    None
}

impl Host for LocalHost {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let md = fs::metadata(path)?;
        Ok(to_stat(&md, file_flags(path, true)))
    }

    fn lstat(&self, path: &Path) -> io::Result<FileStat> {
        let md = fs::symlink_metadata(path)?;
        Ok(to_stat(&md, file_flags(path, false)))
    }

    fn open(&self, path: &Path) -> io::Result<ReadHandle> {
        Ok(Box::new(fs::File::open(path)?))
    }

    fn create(&self, path: &Path, mode: u32) -> io::Result<WriteHandle> {
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(path)?;
        Ok(Box::new(file))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            names.push(entry?.file_name());
        }
        Ok(names)
    }

    fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::DirBuilder::new().mode(mode).create(path)
    }

    fn rmdir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn link(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::hard_link(from, to)
    }

    fn symlink(&self, target: &Path, path: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, path)
    }

    fn readlink(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        let cpath = cstr(path)?;
        let rc = unsafe { libc::chown(cpath.as_ptr(), uid as libc::uid_t, gid as libc::gid_t) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn lchown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        let cpath = cstr(path)?;
        let rc = unsafe { libc::lchown(cpath.as_ptr(), uid as libc::uid_t, gid as libc::gid_t) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(any(
        target_os = "macos",
        target_os = "freebsd",
        target_os = "dragonfly",
        target_os = "netbsd",
        target_os = "openbsd"
    ))]
    fn chflags(&self, path: &Path, flags: u32) -> io::Result<()> {
        let cpath = cstr(path)?;
        let rc = unsafe { libc::chflags(cpath.as_ptr(), flags as _) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(any(
        target_os = "macos",
        target_os = "freebsd",
        target_os = "dragonfly",
        target_os = "netbsd",
        target_os = "openbsd"
    )))]
    fn chflags(&self, _path: &Path, _flags: u32) -> io::Result<()> {
        // No file flags on this platform; stat reports None for them too.
        Ok(())
    }

    fn utimes(&self, path: &Path, atime: i64, mtime: i64) -> io::Result<()> {
        filetime::set_file_times(
            path,
            filetime::FileTime::from_unix_time(atime, 0),
            filetime::FileTime::from_unix_time(mtime, 0),
        )
    }

    fn mknod(&self, path: &Path, mode: u32, rdev: u64) -> io::Result<()> {
        let cpath = cstr(path)?;
        let rc = unsafe { libc::mknod(cpath.as_ptr(), mode as libc::mode_t, rdev as libc::dev_t) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn set_umask(&self, mask: u32) -> io::Result<u32> {
        let old = unsafe { libc::umask(mask as libc::mode_t) };
        Ok(old as u32)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::host::FileKind;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    #[test]
    fn lstat_reports_symlinks_without_following() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        let link = dir.path().join("link");
        fs::write(&file, b"x").unwrap();
        std::os::unix::fs::symlink("file", &link).unwrap();

        let host = LocalHost::new();
        assert_eq!(host.lstat(&link).unwrap().kind(), FileKind::Symlink);
        assert_eq!(host.stat(&link).unwrap().kind(), FileKind::Regular);
    }

    #[test]
    fn create_open_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        let host = LocalHost::new();

        let mut w = host.create(&path, 0o600).unwrap();
        w.write_all(b"payload").unwrap();
        w.flush().unwrap();
        drop(w);

        let mut body = Vec::new();
        host.open(&path).unwrap().read_to_end(&mut body).unwrap();
        assert_eq!(body, b"payload");
    }

    #[test]
    fn read_dir_excludes_dot_entries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a"), b"").unwrap();
        fs::write(dir.path().join("b"), b"").unwrap();

        let host = LocalHost::new();
        let mut names = host.read_dir(dir.path()).unwrap();
        names.sort();
        assert_eq!(names, vec![OsString::from("a"), OsString::from("b")]);
    }

    #[test]
    fn utimes_sets_mtime_seconds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"x").unwrap();

        let host = LocalHost::new();
        host.utimes(&path, 1_000_000, 2_000_000).unwrap();
        assert_eq!(host.lstat(&path).unwrap().mtime, 2_000_000);
    }
}
