//! Content identity checks
//!
//! Two independent optional channels decide whether a file (or, for the
//! content-id channel, a whole subtree) is unchanged even when the cheap
//! metadata comparison is inconclusive:
//!
//! - the **digest** channel hashes file content and remembers source
//!   digests in a per-directory cache file so unchanged sources are not
//!   re-read on every run;
//! - the **filesystem content id** channel compares the source's
//!   stat-provided content id against the id recorded in a per-directory
//!   cache on the destination side. On platforms whose stat carries no
//!   such id the channel reports [`Identity::Unknown`] and never
//!   short-circuits anything.
//!
//! Both caches are plain line-oriented text files living inside the tree
//! they describe; their filenames are always added to the active ignore
//! list so they are neither mirrored nor pruned.

use crate::host::Host;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of an identity check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Equal,
    Different,
    /// The channel could not decide (missing cache entry, unreadable
    /// file, or no content id on this platform)
    Unknown,
}

const DIGEST_BLOCK: usize = 64 * 1024;

fn compute_digest(host: &dyn Host, path: &Path) -> io::Result<String> {
    let mut reader = host.open(path)?;
    let mut ctx = md5::Context::new();
    let mut buf = vec![0u8; DIGEST_BLOCK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        ctx.consume(&buf[..n]);
    }
    Ok(format!("{:x}", ctx.compute()))
}

/// Per-directory digest cache keyed by file name
///
/// The cache file holds one `<32 hex chars> <name>` line per file and
/// lives in the source directory it describes. It is loaded lazily when
/// the first file of a directory is checked and written back (if
/// modified) when the walk moves on.
#[derive(Debug)]
pub struct DigestCache {
    file_name: OsString,
    dir: Option<PathBuf>,
    entries: HashMap<OsString, String>,
    dirty: bool,
}

impl DigestCache {
    #[must_use]
    pub fn new(file_name: OsString) -> Self {
        Self {
            file_name,
            dir: None,
            entries: HashMap::new(),
            dirty: false,
        }
    }

    /// Compare `spath`'s digest against `dpath`'s, consulting and
    /// maintaining the source-side cache. With `dpath == None` the source
    /// digest is recomputed and the cache refreshed, nothing is compared.
    pub fn check(
        &mut self,
        src: &dyn Host,
        spath: &Path,
        dst: &dyn Host,
        dpath: Option<&Path>,
    ) -> Identity {
        let (Some(dir), Some(name)) = (spath.parent(), spath.file_name()) else {
            return Identity::Unknown;
        };
        self.load_for(src, dir);

        let Some(dpath) = dpath else {
            match compute_digest(src, spath) {
                Ok(hex) => {
                    self.entries.insert(name.to_os_string(), hex);
                    self.dirty = true;
                }
                Err(e) => debug!("{} digest refresh failed: {}", spath.display(), e),
            }
            return Identity::Unknown;
        };

        let src_hex = match self.entries.get(name) {
            Some(hex) => hex.clone(),
            None => match compute_digest(src, spath) {
                Ok(hex) => {
                    self.entries.insert(name.to_os_string(), hex.clone());
                    self.dirty = true;
                    hex
                }
                Err(_) => return Identity::Unknown,
            },
        };
        match compute_digest(dst, dpath) {
            Ok(dst_hex) if dst_hex == src_hex => Identity::Equal,
            Ok(_) => Identity::Different,
            Err(_) => Identity::Unknown,
        }
    }

    fn load_for(&mut self, host: &dyn Host, dir: &Path) {
        if self.dir.as_deref() == Some(dir) {
            return;
        }
        self.flush(host);
        self.entries.clear();
        self.dir = Some(dir.to_path_buf());

        let cache_path = dir.join(&self.file_name);
        let Ok(mut reader) = host.open(&cache_path) else {
            return;
        };
        let mut body = Vec::new();
        if reader.read_to_end(&mut body).is_err() {
            return;
        }
        for line in body.split(|&b| b == b'\n') {
            // "<32 hex> <name>"
            if line.len() < 34 || line[32] != b' ' {
                continue;
            }
            let Ok(hex) = std::str::from_utf8(&line[..32]) else {
                continue;
            };
            let name = OsStr::from_bytes(&line[33..]);
            self.entries.insert(name.to_os_string(), hex.to_string());
        }
    }

    /// Write the cache back if it changed since it was loaded.
    pub fn flush(&mut self, host: &dyn Host) {
        if !self.dirty {
            return;
        }
        let Some(dir) = self.dir.clone() else {
            return;
        };
        let cache_path = dir.join(&self.file_name);
        let mut lines: Vec<(&OsString, &String)> = self.entries.iter().collect();
        lines.sort_by(|a, b| a.0.cmp(b.0));

        let mut body = Vec::new();
        for (name, hex) in lines {
            body.extend_from_slice(hex.as_bytes());
            body.push(b' ');
            body.extend_from_slice(name.as_bytes());
            body.push(b'\n');
        }
        match host
            .create(&cache_path, 0o644)
            .and_then(|mut w| w.write_all(&body).and_then(|()| w.flush()))
        {
            Ok(()) => self.dirty = false,
            Err(e) => warn!("{} digest cache not written: {}", cache_path.display(), e),
        }
    }
}

/// Per-directory filesystem-content-id cache keyed by file name
///
/// Records, on the destination side, the source content id observed at the
/// last successful sync. A later run whose source id still matches may
/// skip the object (for directories: the whole subtree) without reading
/// anything.
#[derive(Debug)]
pub struct FscidCache {
    file_name: OsString,
    dir: Option<PathBuf>,
    entries: HashMap<OsString, u64>,
    dirty: bool,
}

impl FscidCache {
    #[must_use]
    pub fn new(file_name: OsString) -> Self {
        Self {
            file_name,
            dir: None,
            entries: HashMap::new(),
            dirty: false,
        }
    }

    /// Compare the source's content id against the recorded one for
    /// `dpath`.
    pub fn check(&mut self, dst: &dyn Host, src_fsmid: Option<u64>, dpath: &Path) -> Identity {
        let Some(id) = src_fsmid else {
            return Identity::Unknown;
        };
        let (Some(dir), Some(name)) = (dpath.parent(), dpath.file_name()) else {
            return Identity::Unknown;
        };
        self.load_for(dst, dir);
        match self.entries.get(name) {
            Some(&recorded) if recorded == id => Identity::Equal,
            Some(_) => Identity::Different,
            None => Identity::Unknown,
        }
    }

    /// Record the source content id after a successful sync of `dpath`.
    pub fn record(&mut self, dst: &dyn Host, src_fsmid: Option<u64>, dpath: &Path) {
        let Some(id) = src_fsmid else { return };
        let (Some(dir), Some(name)) = (dpath.parent(), dpath.file_name()) else {
            return;
        };
        self.load_for(dst, dir);
        self.entries.insert(name.to_os_string(), id);
        self.dirty = true;
    }

    fn load_for(&mut self, host: &dyn Host, dir: &Path) {
        if self.dir.as_deref() == Some(dir) {
            return;
        }
        self.flush(host);
        self.entries.clear();
        self.dir = Some(dir.to_path_buf());

        let cache_path = dir.join(&self.file_name);
        let Ok(mut reader) = host.open(&cache_path) else {
            return;
        };
        let mut body = Vec::new();
        if reader.read_to_end(&mut body).is_err() {
            return;
        }
        for line in body.split(|&b| b == b'\n') {
            // "<16 hex> <name>"
            if line.len() < 18 || line[16] != b' ' {
                continue;
            }
            let Ok(hex) = std::str::from_utf8(&line[..16]) else {
                continue;
            };
            let Ok(id) = u64::from_str_radix(hex, 16) else {
                continue;
            };
            self.entries
                .insert(OsStr::from_bytes(&line[17..]).to_os_string(), id);
        }
    }

    /// Write the cache back if it changed since it was loaded.
    pub fn flush(&mut self, host: &dyn Host) {
        if !self.dirty {
            return;
        }
        let Some(dir) = self.dir.clone() else {
            return;
        };
        let cache_path = dir.join(&self.file_name);
        let mut lines: Vec<(&OsString, &u64)> = self.entries.iter().collect();
        lines.sort_by(|a, b| a.0.cmp(b.0));

        let mut body = Vec::new();
        for (name, id) in lines {
            body.extend_from_slice(format!("{id:016x} ").as_bytes());
            body.extend_from_slice(name.as_bytes());
            body.push(b'\n');
        }
        match host
            .create(&cache_path, 0o644)
            .and_then(|mut w| w.write_all(&body).and_then(|()| w.flush()))
        {
            Ok(()) => self.dirty = false,
            Err(e) => warn!("{} fscid cache not written: {}", cache_path.display(), e),
        }
    }
}
