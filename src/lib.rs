//! mirsync: incremental filesystem mirroring
//!
//! This library makes a destination tree bit-for-bit equivalent to a
//! source tree, preserving content, metadata (uid, gid, mode, mtime,
//! flags), hard and symbolic links, and device nodes. Updates are
//! incremental and atomic: unchanged objects are skipped from their
//! metadata, changed files are written to a temp name and renamed into
//! place, and destination entries absent at the source are pruned.
//!
//! ## Key Features
//!
//! - **Hardlink preservation**: one table spans the whole run, so a
//!   source inode with many names becomes exactly one destination inode
//!   with the same names, even across directories.
//! - **Local/remote uniformity**: both sides are a [`host::Host`];
//!   a remote side is a `mirsync --slave` peer driven over stdio, and the
//!   engine never branches on which kind it has.
//! - **Content identity channels**: optional digest cache and optional
//!   filesystem-content-id cache decide "same/different/unknown" when
//!   metadata alone is not trusted.
//! - **Incremental backups**: with a prior-snapshot root configured,
//!   unchanged files are hard-linked from the previous snapshot instead
//!   of copied.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use mirsync::host::LocalHost;
//! use mirsync::replicate::{Options, Replicator};
//! use std::path::Path;
//!
//! let opts = Options::default();
//! let local = LocalHost::new();
//! let mut rep = Replicator::new(&opts, &local, &local);
//! let failures = rep.run(Path::new("/source"), Some(Path::new("/mirror")));
//! assert_eq!(failures, 0);
//! ```

pub mod cli;
pub mod counters;
pub mod error;
pub mod hardlinks;
pub mod host;
pub mod identity;
pub mod ignore;
pub mod prune;
pub mod remote;
pub mod replace;
pub mod replicate;

// Re-export commonly used types
pub use counters::Counters;
pub use error::{Result, SyncError};
pub use host::{FileKind, FileStat, Host, LocalHost};
pub use replicate::{Options, Replicator};
