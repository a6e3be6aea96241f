//! The replication driver
//!
//! [`Replicator::run`] makes a destination path reflect a source path:
//! unchanged objects are skipped from their metadata (optionally backed by
//! the content-identity channels), changed files are rewritten to a temp
//! name and renamed into place, hardlink groups are rebuilt through the
//! shared [`HardlinkTable`], and destination entries with no source
//! counterpart are pruned after each directory's source pass.
//!
//! Failures are summed, not thrown: every per-entry error is logged,
//! counted, and processing continues with the next sibling. The run's
//! return value is the total failure count; zero means fully synced.
//!
//! The engine is deliberately single-threaded and synchronous. Every state
//! transition on the two filesystems happens in program order, which is
//! what makes the write-temp / rename / flag-restore sequences observable
//! and the hardlink table trivially shareable across the traversal.

use crate::counters::Counters;
use crate::hardlinks::HardlinkTable;
use crate::host::{FileKind, FileStat, Host};
use crate::identity::{DigestCache, FscidCache, Identity};
use crate::ignore::{IgnoreList, Origin};
use crate::prune;
use crate::replace::{safe_link, safe_rename};
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn};

/// Copy block size for content streaming
const COPY_BLOCK: usize = 64 * 1024;

/// Mode flags consumed by the engine
///
/// One instance is threaded through the whole run; nothing here is
/// process-global.
#[derive(Debug, Clone)]
pub struct Options {
    /// Confirm content even when the metadata tuple agrees
    pub force: bool,
    /// Refuse to replace a destination directory with a non-directory
    pub safety: bool,
    /// Prompt before each destination removal
    pub interactive: bool,
    /// Never delete anything at the destination
    pub no_remove: bool,
    /// Per-directory exclusion file name, when configured
    pub ignore_file: Option<OsString>,
    /// Digest cache file name; enables the digest identity channel
    pub digest_cache: Option<OsString>,
    /// Content-id cache file name; enables the content-id channel
    pub fscid_cache: Option<OsString>,
    /// Prior-snapshot root for incremental backups
    pub hardlink_base: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            force: false,
            safety: true,
            interactive: false,
            no_remove: false,
            ignore_file: None,
            digest_cache: None,
            fscid_cache: None,
            hardlink_base: None,
        }
    }
}

/// Recursive diff-and-apply engine for one run
pub struct Replicator<'a> {
    opts: &'a Options,
    src: &'a dyn Host,
    dst: &'a dyn Host,
    dst_root: Option<PathBuf>,
    hardlinks: HardlinkTable,
    counters: Counters,
    digest: Option<DigestCache>,
    fscid: Option<FscidCache>,
}

enum HardlinkProbe {
    /// Destination already refers to the right inode, or was just linked
    Done,
    /// Linking failed; the entry was charged as a failure
    Failed,
    /// Proceed with a normal copy
    Copy,
}

impl<'a> Replicator<'a> {
    #[must_use]
    pub fn new(opts: &'a Options, src: &'a dyn Host, dst: &'a dyn Host) -> Self {
        Self {
            opts,
            src,
            dst,
            dst_root: None,
            hardlinks: HardlinkTable::new(),
            counters: Counters::new(),
            digest: opts
                .digest_cache
                .as_ref()
                .map(|name| DigestCache::new(name.clone())),
            fscid: opts
                .fscid_cache
                .as_ref()
                .map(|name| FscidCache::new(name.clone())),
        }
    }

    /// Totals accumulated so far
    #[must_use]
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Hardlink groups still awaiting sightings (empty after a run that
    /// visited every member of every group)
    #[must_use]
    pub fn pending_hardlinks(&self) -> usize {
        self.hardlinks.len()
    }

    /// Replicate `spath` onto `dpath`, or refresh digest caches only when
    /// `dpath` is `None`. Returns the number of per-entry failures.
    pub fn run(&mut self, spath: &Path, dpath: Option<&Path>) -> u64 {
        self.dst_root = dpath.map(Path::to_path_buf);
        let failures = self.replicate(spath, dpath, None, None);
        let (src, dst) = (self.src, self.dst);
        if let Some(cache) = self.digest.as_mut() {
            cache.flush(src);
        }
        if let Some(cache) = self.fscid.as_mut() {
            cache.flush(dst);
        }
        failures
    }

    fn replicate(
        &mut self,
        spath: &Path,
        dpath: Option<&Path>,
        src_dev: Option<u64>,
        dst_dev: Option<u64>,
    ) -> u64 {
        let mut failures = 0u64;

        // A source that vanished between its parent's readdir and now is
        // not an error.
        let Ok(sst) = self.src.lstat(spath) else {
            return 0;
        };
        let kind = sst.kind();
        let size_blocks = if kind == FileKind::Regular {
            sst.blocks * 512
        } else {
            0
        };
        let mut dst_stat = dpath.and_then(|d| self.dst.lstat(d).ok());

        if kind == FileKind::Regular && sst.nlink > 1 {
            if let Some(dpath) = dpath {
                match self.probe_hardlink(spath, dpath, &sst, &mut dst_stat, dst_dev) {
                    HardlinkProbe::Done => {
                        self.counters.add_source_item(size_blocks);
                        return failures;
                    }
                    HardlinkProbe::Failed => return failures + 1,
                    HardlinkProbe::Copy => {}
                }
            }
        }

        // No-change fast path: mode and flags agree on both sides.
        if let (Some(dpath), Some(dst)) = (dpath, dst_stat.as_ref()) {
            if dst.mode == sst.mode && dst.flags == sst.flags {
                match kind {
                    FileKind::Symlink | FileKind::Directory => {
                        let host = self.dst;
                        if let Some(cache) = self.fscid.as_mut() {
                            if cache.check(host, sst.fsmid, dpath) == Identity::Equal {
                                trace!("{} subtree unchanged (content id)", dpath.display());
                                self.counters.add_source_item(0);
                                return failures;
                            }
                        }
                    }
                    FileKind::Regular => {
                        if dst.size == sst.size
                            && dst.uid == sst.uid
                            && dst.gid == sst.gid
                            && dst.mtime == sst.mtime
                            && self.content_unchanged(spath, dpath, &sst)
                        {
                            debug!("{} unchanged", dpath.display());
                            if sst.nlink > 1 {
                                self.hardlinks.set_dst_ino((sst.dev, sst.ino), dst.ino);
                            }
                            let host = self.dst;
                            if let Some(cache) = self.fscid.as_mut() {
                                cache.record(host, sst.fsmid, dpath);
                            }
                            self.counters.add_source_item(size_blocks);
                            return failures;
                        }
                    }
                    _ => {}
                }
            }
        }

        // A non-directory source facing a destination directory: refuse
        // under safety, otherwise clear the way.
        if kind != FileKind::Directory {
            if let (Some(dpath), Some(dst)) = (dpath, dst_stat.as_ref()) {
                if dst.kind() == FileKind::Directory {
                    if self.opts.safety {
                        error!(
                            "{} is a directory at the destination (safety)",
                            dpath.display()
                        );
                        return failures + 1;
                    }
                    failures +=
                        prune::remove_tree(self.dst, self.opts, &mut self.counters, dpath, dst_dev);
                    dst_stat = None;
                }
            }
        }

        match kind {
            FileKind::Directory => {
                failures += self.replicate_dir(spath, dpath, &sst, dst_stat, src_dev, dst_dev);
            }
            FileKind::Regular => match dpath {
                Some(dpath) => {
                    failures += self.replicate_regular(spath, dpath, &sst, dst_stat.as_ref());
                }
                None => {
                    // Digest refresh pass: no destination, no copying.
                    let (src, dst) = (self.src, self.dst);
                    if let Some(cache) = self.digest.as_mut() {
                        cache.check(src, spath, dst, None);
                    }
                    self.counters.add_source_item(size_blocks);
                }
            },
            FileKind::Symlink => match dpath {
                Some(dpath) => failures += self.replicate_symlink(spath, dpath, &sst),
                None => self.counters.add_source_item(0),
            },
            FileKind::BlockDev | FileKind::CharDev => match dpath {
                Some(dpath) => failures += self.replicate_device(dpath, &sst, dst_stat.as_ref()),
                None => self.counters.add_source_item(0),
            },
            FileKind::Other => {
                // FIFOs, sockets and the like are enumerated but not
                // mirrored.
                trace!("{} skipped (unsupported kind)", spath.display());
                self.counters.add_source_item(0);
            }
        }
        failures
    }

    /// Evaluate the optional content-identity channels once the metadata
    /// tuple has matched. Returns `true` when the file may be skipped.
    fn content_unchanged(&mut self, spath: &Path, dpath: &Path, sst: &FileStat) -> bool {
        let mut confirmed = false;
        let mut mismatch = false;
        let (src, dst) = (self.src, self.dst);

        if let Some(cache) = self.digest.as_mut() {
            match cache.check(src, spath, dst, Some(dpath)) {
                Identity::Equal => confirmed = true,
                Identity::Different => {
                    warn!("{} md5-CHECK-FAILED", spath.display());
                    mismatch = true;
                }
                Identity::Unknown => {}
            }
        }
        if let Some(cache) = self.fscid.as_mut() {
            match cache.check(dst, sst.fsmid, dpath) {
                Identity::Equal => confirmed = true,
                Identity::Different => {
                    warn!("{} fsmid-CHECK-FAILED", spath.display());
                    mismatch = true;
                }
                Identity::Unknown => {}
            }
        }
        !mismatch && (confirmed || !self.opts.force)
    }

    fn probe_hardlink(
        &mut self,
        spath: &Path,
        dpath: &Path,
        sst: &FileStat,
        dst_stat: &mut Option<FileStat>,
        dst_dev: Option<u64>,
    ) -> HardlinkProbe {
        let key = (sst.dev, sst.ino);

        let Some(entry) = self.hardlinks.get(key) else {
            // First sighting: this copy becomes the group's anchor.
            self.hardlinks.insert(sst, dpath);
            trace!(
                "{} first sighting of inode {} ({} links)",
                spath.display(),
                sst.ino,
                sst.nlink
            );
            return HardlinkProbe::Copy;
        };
        let first_path = entry.dst_path.clone();
        let dst_ino = entry.dst_ino;

        if let (Some(dst), Some(ino)) = (dst_stat.as_ref(), dst_ino) {
            if dst.ino == ino {
                // Destination already refers to the group's inode.
                self.hardlinks.record_sighting(key);
                trace!("{} already linked", dpath.display());
                return HardlinkProbe::Done;
            }
        }

        // Wrong or missing destination: clear it, then link against the
        // group's first copy. The caller's stat is invalidated either way.
        if let Some(dst) = dst_stat.take() {
            if dst.kind() == FileKind::Directory {
                prune::remove_tree(self.dst, self.opts, &mut self.counters, dpath, dst_dev);
            } else {
                let _ = self.dst.remove(dpath);
            }
        }
        match safe_link(self.dst, &first_path, dpath, sst.flags) {
            Ok(()) => {
                self.hardlinks.record_sighting(key);
                self.counters.add_copied_item();
                info!("{} link-ok", dpath.display());
                HardlinkProbe::Done
            }
            Err(e) if e.raw_os_error() == Some(libc::EMLINK) => {
                // The filesystem refused another link; restart the group
                // with this path as the new anchor and copy normally.
                self.hardlinks.remove(key);
                self.hardlinks.insert(sst, dpath);
                HardlinkProbe::Copy
            }
            Err(e) => {
                error!("{} link failed: {}", dpath.display(), e);
                self.hardlinks.remove(key);
                HardlinkProbe::Failed
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    fn replicate_dir(
        &mut self,
        spath: &Path,
        dpath: Option<&Path>,
        sst: &FileStat,
        dst_stat: Option<FileStat>,
        src_dev: Option<u64>,
        dst_dev: Option<u64>,
    ) -> u64 {
        let mut failures = 0u64;

        // Source device boundary: the mount point is statted, never
        // descended.
        if src_dev.is_some_and(|dev| dev != sst.dev) {
            debug!("{} not descending (source device boundary)", spath.display());
            self.counters.add_source_item(0);
            return failures;
        }
        // Destination device boundary: never write into a mount point.
        if let (Some(hint), Some(dst)) = (dst_dev, dst_stat.as_ref()) {
            if dst.kind() == FileKind::Directory && dst.dev != hint {
                warn!(
                    "{} not entering (destination mount point)",
                    spath.display()
                );
                self.counters.add_source_item(0);
                return failures;
            }
        }

        let orig_dst = dst_stat;
        let mut created = false;
        let mut widened = false;

        if let Some(dpath) = dpath {
            let mut have_dir = false;
            match orig_dst.as_ref() {
                Some(dst) if dst.kind() == FileKind::Directory => {
                    have_dir = true;
                    if dst.mode & 0o700 != 0o700 {
                        // Guarantee traversal; the real mode is restored on
                        // the way out.
                        let _ = self.dst.chmod(dpath, dst.perms() | 0o700);
                        widened = true;
                    }
                }
                Some(_) => {
                    failures +=
                        prune::remove_tree(self.dst, self.opts, &mut self.counters, dpath, dst_dev);
                }
                None => {}
            }
            if !have_dir {
                match self.dst.mkdir(dpath, (sst.perms()) | 0o700) {
                    Ok(()) => {
                        created = true;
                        info!("{} mkdir-ok", dpath.display());
                    }
                    Err(e) => {
                        error!("{} mkdir failed: {}", dpath.display(), e);
                        return failures + 1;
                    }
                }
            }
        }

        // Re-stat so the recursion and the prune pass carry the actual
        // destination device.
        let dcur = dpath.and_then(|d| self.dst.lstat(d).ok());
        let ddev = dcur.as_ref().map(|d| d.dev);

        let mut names = self.load_ignore_list(spath);

        match self.src.read_dir(spath) {
            Ok(entries) => {
                for name in entries {
                    if names.lookup_or_insert(&name, Origin::Source) != Origin::Source {
                        debug!("{} ignored", spath.join(&name).display());
                        continue;
                    }
                    let child_src = spath.join(&name);
                    let child_dst = dpath.map(|d| d.join(&name));
                    failures +=
                        self.replicate(&child_src, child_dst.as_deref(), Some(sst.dev), ddev);
                }
            }
            Err(e) => {
                error!("{} readdir failed: {}", spath.display(), e);
                failures += 1;
            }
        }

        // Prune pass: anything purely on the destination side goes, after
        // every source entry has been processed.
        if let Some(dpath) = dpath {
            match self.dst.read_dir(dpath) {
                Ok(entries) => {
                    for name in entries {
                        if names.lookup_or_insert(&name, Origin::Destination) == Origin::Destination
                        {
                            failures += prune::remove_tree(
                                self.dst,
                                self.opts,
                                &mut self.counters,
                                &dpath.join(&name),
                                ddev,
                            );
                        }
                    }
                }
                Err(e) => {
                    error!("{} readdir failed: {}", dpath.display(), e);
                    failures += 1;
                }
            }

            // Restore owner, mode and flags now that traversal is done.
            let prior = orig_dst.as_ref();
            if created
                || self.opts.force
                || prior.map_or(true, |d| d.uid != sst.uid || d.gid != sst.gid)
            {
                let _ = self.dst.chown(dpath, sst.uid, sst.gid);
            }
            if created || widened || prior.map_or(true, |d| d.perms() != sst.perms()) {
                let _ = self.dst.chmod(dpath, sst.perms());
            }
            if let Some(flags) = sst.flags {
                if created || prior.map_or(true, |d| d.flags != Some(flags)) {
                    let _ = self.dst.chflags(dpath, flags);
                }
            }
            if failures == 0 {
                let host = self.dst;
                if let Some(cache) = self.fscid.as_mut() {
                    cache.record(host, sst.fsmid, dpath);
                }
            }
        }

        // The root directory is the operand, not a mirrored item.
        if src_dev.is_some() {
            self.counters.add_source_item(0);
        }
        failures
    }

    /// Build the per-directory name list: configured ignore patterns plus
    /// the cache filenames that must never be mirrored or pruned.
    fn load_ignore_list(&mut self, spath: &Path) -> IgnoreList {
        let mut names = IgnoreList::new();
        if let Some(file_name) = &self.opts.ignore_file {
            names.add(file_name, Origin::IgnoreFile);
            let path = spath.join(file_name);
            if let Ok(mut reader) = self.src.open(&path) {
                let mut body = Vec::new();
                if reader.read_to_end(&mut body).is_ok() {
                    for line in body.split(|&b| b == b'\n') {
                        let line = match line.last() {
                            Some(b'\r') => &line[..line.len() - 1],
                            _ => line,
                        };
                        if line.is_empty() || line[0] == b'#' {
                            continue;
                        }
                        names.add(std::ffi::OsStr::from_bytes(line), Origin::IgnoreFile);
                    }
                }
            }
        }
        if let Some(name) = &self.opts.digest_cache {
            names.add(name, Origin::IgnoreFile);
        }
        if let Some(name) = &self.opts.fscid_cache {
            names.add(name, Origin::IgnoreFile);
        }
        names
    }

    fn replicate_regular(
        &mut self,
        spath: &Path,
        dpath: &Path,
        sst: &FileStat,
        dst: Option<&FileStat>,
    ) -> u64 {
        let size_blocks = sst.blocks * 512;

        if let Some(snapshot) = self.snapshot_path(dpath) {
            if self.link_from_snapshot(spath, dpath, &snapshot, sst) {
                info!("{} link-ok (snapshot)", dpath.display());
                self.finish_regular(dpath, sst, size_blocks);
                return 0;
            }
        }

        match self.copy_contents(spath, dpath, sst, dst) {
            Ok(()) => {
                info!("{} copy-ok", dpath.display());
                self.finish_regular(dpath, sst, size_blocks);
                0
            }
            Err(e) => {
                error!("{} copy failed: {}", dpath.display(), e);
                1
            }
        }
    }

    fn finish_regular(&mut self, dpath: &Path, sst: &FileStat, size_blocks: u64) {
        self.counters.add_source_item(size_blocks);
        self.counters.add_copied_item();
        if sst.nlink > 1 {
            if let Ok(new_dst) = self.dst.lstat(dpath) {
                self.hardlinks.set_dst_ino((sst.dev, sst.ino), new_dst.ino);
            }
        }
        let host = self.dst;
        if let Some(cache) = self.fscid.as_mut() {
            cache.record(host, sst.fsmid, dpath);
        }
    }

    /// Prior-snapshot path corresponding to `dpath`, when incremental
    /// backup mode is configured.
    fn snapshot_path(&self, dpath: &Path) -> Option<PathBuf> {
        let base = self.opts.hardlink_base.as_ref()?;
        let root = self.dst_root.as_ref()?;
        let rel = dpath.strip_prefix(root).ok()?;
        Some(base.join(rel))
    }

    /// Hard-link an unchanged file from the prior snapshot instead of
    /// copying. Under `force` the contents are compared byte for byte
    /// first.
    fn link_from_snapshot(
        &mut self,
        spath: &Path,
        dpath: &Path,
        snapshot: &Path,
        sst: &FileStat,
    ) -> bool {
        let Ok(hst) = self.dst.stat(snapshot) else {
            return false;
        };
        if hst.size != sst.size
            || hst.uid != sst.uid
            || hst.gid != sst.gid
            || hst.mtime != sst.mtime
        {
            return false;
        }
        if self.opts.force
            && !contents_equal(self.src, spath, self.dst, snapshot).unwrap_or(false)
        {
            return false;
        }
        self.dst.link(snapshot, dpath).is_ok()
    }

    fn copy_contents(
        &mut self,
        spath: &Path,
        dpath: &Path,
        sst: &FileStat,
        dst: Option<&FileStat>,
    ) -> io::Result<()> {
        let tmp = tmp_path(dpath);
        if self.dst.lstat(&tmp).is_ok() {
            // Leftover from an aborted run; flags could block the unlink.
            let _ = self.dst.chflags(&tmp, 0);
            let _ = self.dst.remove(&tmp);
        }

        let mut reader = self.src.open(spath)?;
        let mut writer = self.dst.create(&tmp, 0o600)?;
        let mut buf = vec![0u8; COPY_BLOCK];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    drop(writer);
                    let _ = self.dst.remove(&tmp);
                    return Err(e);
                }
            };
            self.counters.add_read_bytes(n as u64);
            if let Err(e) = writer.write_all(&buf[..n]) {
                drop(writer);
                let _ = self.dst.remove(&tmp);
                return Err(e);
            }
            self.counters.add_written_bytes(n as u64);
        }
        if let Err(e) = writer.flush() {
            drop(writer);
            let _ = self.dst.remove(&tmp);
            return Err(e);
        }
        drop(writer);
        drop(reader);

        // Metadata lands on the temp name; flags must wait until after the
        // rename because immutable flags would block it.
        let _ = self.dst.utimes(&tmp, sst.mtime, sst.mtime);
        let _ = self.dst.chown(&tmp, sst.uid, sst.gid);
        let _ = self.dst.chmod(&tmp, sst.perms());

        if let Err(e) = safe_rename(self.dst, &tmp, dpath, dst.and_then(|d| d.flags)) {
            let _ = self.dst.remove(&tmp);
            return Err(e);
        }
        if let Some(flags) = sst.flags {
            if flags != 0 {
                let _ = self.dst.chflags(dpath, flags);
            }
        }
        Ok(())
    }

    fn replicate_symlink(&mut self, spath: &Path, dpath: &Path, sst: &FileStat) -> u64 {
        let target = match self.src.readlink(spath) {
            Ok(t) => t,
            Err(e) => {
                error!("{} readlink failed: {}", spath.display(), e);
                return 1;
            }
        };
        let existing = self.dst.readlink(dpath).ok();
        if !self.opts.force && existing.as_deref() == Some(target.as_path()) {
            debug!("{} unchanged", dpath.display());
            self.counters.add_source_item(0);
            return 0;
        }

        let tmp = tmp_path(dpath);
        if self.dst.lstat(&tmp).is_ok() {
            let _ = self.dst.remove(&tmp);
        }
        // The created link records its permissions from the umask.
        let _ = self.dst.set_umask(!sst.mode & 0o777);
        let result = self.dst.symlink(&target, &tmp).and_then(|()| {
            let _ = self.dst.lchown(&tmp, sst.uid, sst.gid);
            safe_rename(self.dst, &tmp, dpath, None)
        });
        let _ = self.dst.set_umask(0);

        match result {
            Ok(()) => {
                info!("{} symlink-ok", dpath.display());
                self.counters.add_source_item(0);
                self.counters.add_copied_item();
                0
            }
            Err(e) => {
                let _ = self.dst.remove(&tmp);
                error!("{} symlink failed: {}", dpath.display(), e);
                1
            }
        }
    }

    fn replicate_device(&mut self, dpath: &Path, sst: &FileStat, dst: Option<&FileStat>) -> u64 {
        if let Some(dst) = dst {
            if dst.mode == sst.mode
                && dst.rdev == sst.rdev
                && dst.uid == sst.uid
                && dst.gid == sst.gid
            {
                debug!("{} unchanged", dpath.display());
                self.counters.add_source_item(0);
                return 0;
            }
        }

        let tmp = tmp_path(dpath);
        if self.dst.lstat(&tmp).is_ok() {
            let _ = self.dst.chflags(&tmp, 0);
            let _ = self.dst.remove(&tmp);
        }
        let result = self.dst.mknod(&tmp, sst.mode, sst.rdev).and_then(|()| {
            let _ = self.dst.chown(&tmp, sst.uid, sst.gid);
            safe_rename(self.dst, &tmp, dpath, dst.and_then(|d| d.flags))
        });
        match result {
            Ok(()) => {
                info!("{} mknod-ok", dpath.display());
                self.counters.add_source_item(0);
                self.counters.add_copied_item();
                0
            }
            Err(e) => {
                let _ = self.dst.remove(&tmp);
                error!("{} mknod failed: {}", dpath.display(), e);
                1
            }
        }
    }
}

/// Temp name used for every atomic replacement: `<path>.tmp`
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Compare two files byte for byte through their hosts.
fn contents_equal(
    a_host: &dyn Host,
    a: &Path,
    b_host: &dyn Host,
    b: &Path,
) -> io::Result<bool> {
    let mut ra = a_host.open(a)?;
    let mut rb = b_host.open(b)?;
    let mut buf_a = vec![0u8; COPY_BLOCK];
    let mut buf_b = vec![0u8; COPY_BLOCK];
    loop {
        let na = read_full(ra.as_mut(), &mut buf_a)?;
        let nb = read_full(rb.as_mut(), &mut buf_b)?;
        if na != nb || buf_a[..na] != buf_b[..nb] {
            return Ok(false);
        }
        if na == 0 {
            return Ok(true);
        }
    }
}

/// Read until the buffer is full or EOF; short reads mid-stream are
/// retried, only `0` terminates.
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::host::LocalHost;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn tmp_path_appends_suffix() {
        assert_eq!(
            tmp_path(Path::new("/a/b/file")),
            PathBuf::from("/a/b/file.tmp")
        );
    }

    #[test]
    fn contents_equal_detects_difference_and_equality() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        fs::write(&a, b"same").unwrap();
        fs::write(&b, b"same").unwrap();
        fs::write(&c, b"other").unwrap();

        let host = LocalHost::new();
        assert!(contents_equal(&host, &a, &host, &b).unwrap());
        assert!(!contents_equal(&host, &a, &host, &c).unwrap());
    }

    #[test]
    fn snapshot_path_is_relative_to_destination_root() {
        let opts = Options {
            hardlink_base: Some(PathBuf::from("/backups/prev")),
            ..Options::default()
        };
        let host = LocalHost::new();
        let mut rep = Replicator::new(&opts, &host, &host);
        rep.dst_root = Some(PathBuf::from("/backups/cur"));

        assert_eq!(
            rep.snapshot_path(Path::new("/backups/cur/a/b")),
            Some(PathBuf::from("/backups/prev/a/b"))
        );
        assert_eq!(rep.snapshot_path(Path::new("/elsewhere/a")), None);
    }
}
