//! Uniform filesystem endpoint abstraction
//!
//! Every I/O operation the replication engine performs goes through the
//! [`Host`] trait. A [`LocalHost`] routes straight to the OS; a
//! `RemoteHost` (see [`crate::remote`]) routes the same operations to a
//! slave process over a stream channel. The engine itself never branches
//! on which kind of endpoint it is talking to.
//!
//! Errors are plain `std::io::Error`; the errno of a failed remote
//! operation is reconstructed on the client side, so `raw_os_error()` is
//! meaningful for both endpoint kinds.

pub mod local;

pub use local::LocalHost;

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

// File-type bits, kept portable across libc variants (mode_t is not the
// same width everywhere).
const S_IFMT: u32 = 0o170_000;
const S_IFREG: u32 = 0o100_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFLNK: u32 = 0o120_000;
const S_IFBLK: u32 = 0o060_000;
const S_IFCHR: u32 = 0o020_000;

/// Object kind derived from the stat mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    BlockDev,
    CharDev,
    /// FIFOs, sockets, anything else: enumerated but never mirrored
    Other,
}

/// Metadata tuple returned by [`Host::stat`] / [`Host::lstat`]
///
/// `flags` carries the BSD `st_flags` word where the platform has one and
/// is `None` elsewhere. `fsmid` is the optional filesystem-assigned
/// content id; platforms without one report `None`, which downgrades every
/// content-id check to "unable to determine".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    /// 512-byte blocks allocated, used for byte accounting
    pub blocks: u64,
    /// Modification time in whole seconds since the epoch
    pub mtime: i64,
    pub nlink: u64,
    pub ino: u64,
    pub rdev: u64,
    pub dev: u64,
    pub flags: Option<u32>,
    pub fsmid: Option<u64>,
}

impl FileStat {
    /// Derive the object kind from the mode's format bits
    #[must_use]
    pub fn kind(&self) -> FileKind {
        match self.mode & S_IFMT {
            S_IFREG => FileKind::Regular,
            S_IFDIR => FileKind::Directory,
            S_IFLNK => FileKind::Symlink,
            S_IFBLK => FileKind::BlockDev,
            S_IFCHR => FileKind::CharDev,
            _ => FileKind::Other,
        }
    }

    /// Permission bits including setuid/setgid/sticky
    #[must_use]
    pub fn perms(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// A readable file handle on some endpoint
pub type ReadHandle = Box<dyn io::Read>;

/// A writable file handle on some endpoint
pub type WriteHandle = Box<dyn io::Write>;

/// One filesystem endpoint, local or remote
///
/// The operations mirror the POSIX calls the engine needs. Directory
/// enumeration is collapsed into [`Host::read_dir`], which returns entry
/// names in the order the OS produced them, with `.` and `..` already
/// excluded.
///
/// Flag manipulation ([`Host::chflags`]) is a no-op `Ok(())` on platforms
/// without file flags so that flag-restore sequences stay unconditional in
/// the engine.
pub trait Host {
    /// Stat following symlinks
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    /// Stat without following symlinks
    fn lstat(&self, path: &Path) -> io::Result<FileStat>;

    /// Open an existing file for sequential reading
    fn open(&self, path: &Path) -> io::Result<ReadHandle>;

    /// Create (or truncate) a file for sequential writing
    fn create(&self, path: &Path, mode: u32) -> io::Result<WriteHandle>;

    /// List a directory's entries in OS order, `.`/`..` excluded
    fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>>;

    fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()>;

    fn rmdir(&self, path: &Path) -> io::Result<()>;

    /// Unlink a non-directory
    fn remove(&self, path: &Path) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Create a hard link `to` referring to `from`'s inode
    fn link(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Create a symlink at `path` with the given target text
    fn symlink(&self, target: &Path, path: &Path) -> io::Result<()>;

    fn readlink(&self, path: &Path) -> io::Result<PathBuf>;

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()>;

    /// chown that does not follow a final symlink
    fn lchown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()>;

    /// Set BSD file flags; `Ok(())` no-op where unsupported
    fn chflags(&self, path: &Path, flags: u32) -> io::Result<()>;

    /// Set access and modification times (whole seconds)
    fn utimes(&self, path: &Path, atime: i64, mtime: i64) -> io::Result<()>;

    /// Create a device node
    fn mknod(&self, path: &Path, mode: u32, rdev: u64) -> io::Result<()>;

    /// Set the endpoint's umask, returning the previous value
    fn set_umask(&self, mask: u32) -> io::Result<u32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat_with_mode(mode: u32) -> FileStat {
        FileStat {
            mode,
            uid: 0,
            gid: 0,
            size: 0,
            blocks: 0,
            mtime: 0,
            nlink: 1,
            ino: 1,
            rdev: 0,
            dev: 1,
            flags: None,
            fsmid: None,
        }
    }

    #[test]
    fn kind_is_derived_from_format_bits() {
        assert_eq!(stat_with_mode(0o100_644).kind(), FileKind::Regular);
        assert_eq!(stat_with_mode(0o040_755).kind(), FileKind::Directory);
        assert_eq!(stat_with_mode(0o120_777).kind(), FileKind::Symlink);
        assert_eq!(stat_with_mode(0o060_600).kind(), FileKind::BlockDev);
        assert_eq!(stat_with_mode(0o020_600).kind(), FileKind::CharDev);
        assert_eq!(stat_with_mode(0o010_644).kind(), FileKind::Other);
    }

    #[test]
    fn perms_mask_keeps_special_bits() {
        assert_eq!(stat_with_mode(0o104_755).perms(), 0o4755);
        assert_eq!(stat_with_mode(0o100_600).perms(), 0o600);
    }
}
