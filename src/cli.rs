//! Command-line interface definitions
//!
//! Arguments are grouped by the component that consumes them: paths for
//! the top-level driver, behavior flags for the replication engine,
//! identity options for the content-identity channels, and output options
//! for logging setup.

use crate::replicate::Options;
use anyhow::Result;
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// One side of the transfer: a local path or `[user@]host:path`
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Remote spec handed to the remote shell, `None` for local
    pub host: Option<String>,
    pub path: PathBuf,
}

impl Endpoint {
    /// Parse scp-style endpoint syntax. A colon before the first slash
    /// marks the remote form; prefix a local path with `./` to use a
    /// literal colon in it.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if let Some((head, rest)) = raw.split_once(':') {
            if !head.is_empty() && !head.contains('/') {
                if rest.is_empty() {
                    return Err(format!("empty path in remote endpoint '{raw}'"));
                }
                return Ok(Self {
                    host: Some(head.to_string()),
                    path: PathBuf::from(rest),
                });
            }
        }
        if raw.is_empty() {
            return Err("empty path".to_string());
        }
        Ok(Self {
            host: None,
            path: PathBuf::from(raw),
        })
    }
}

/// Incremental filesystem mirroring utility
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Source and destination endpoints
    #[command(flatten)]
    pub paths: PathConfig,

    /// Replication behavior flags
    #[command(flatten)]
    pub behavior: BehaviorConfig,

    /// Content-identity configuration
    #[command(flatten)]
    pub identity: IdentityConfig,

    /// Output and logging configuration
    #[command(flatten)]
    pub output: OutputConfig,

    /// Serve the remote protocol on standard streams and do no copying
    #[arg(long)]
    pub slave: bool,
}

/// Paths configuration
#[derive(clap::Args, Debug, Clone)]
pub struct PathConfig {
    /// Source tree ([user@host:]path)
    #[arg(value_name = "SOURCE", value_parser = Endpoint::parse, required_unless_present = "slave")]
    pub source: Option<Endpoint>,

    /// Destination tree ([user@host:]path); may be omitted for a digest
    /// refresh run
    #[arg(value_name = "DESTINATION", value_parser = Endpoint::parse)]
    pub destination: Option<Endpoint>,
}

/// Replication behavior flags
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Replication Behavior")]
#[allow(clippy::struct_excessive_bools)]
pub struct BehaviorConfig {
    /// Confirm content even when metadata agrees
    #[arg(short, long)]
    pub force: bool,

    /// Allow a source non-directory to replace a destination directory
    #[arg(long)]
    pub no_safety: bool,

    /// Prompt before each destination removal
    #[arg(short = 'i', long)]
    pub interactive: bool,

    /// Never delete anything at the destination
    #[arg(long)]
    pub no_remove: bool,

    /// Per-directory exclusion file name
    #[arg(
        short = 'x',
        long,
        value_name = "NAME",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = ".mirignore"
    )]
    pub ignore_file: Option<String>,
}

/// Content-identity configuration
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Content Identity")]
pub struct IdentityConfig {
    /// Enable digest checks backed by a per-directory cache file
    #[arg(
        short = 'm',
        long,
        value_name = "NAME",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = ".MD5.CHECKSUMS"
    )]
    pub digest: Option<String>,

    /// Enable filesystem-content-id checks backed by a per-directory
    /// cache file
    #[arg(
        long,
        value_name = "NAME",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = ".FSMID.CHECK"
    )]
    pub fscid: Option<String>,

    /// Prior-snapshot root; unchanged files are hard-linked from here
    /// instead of copied
    #[arg(short = 'H', long, value_name = "PATH")]
    pub hardlink_base: Option<PathBuf>,
}

/// Output and logging configuration
#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Output Options")]
pub struct OutputConfig {
    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Validate argument combinations clap cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Neither a destination nor a digest refresh was specified
    /// - A hardlink base was given without a destination
    /// - Both --quiet and --verbose options are used
    pub fn validate(&self) -> Result<()> {
        if self.slave {
            return Ok(());
        }
        if self.paths.destination.is_none() && self.identity.digest.is_none() {
            anyhow::bail!("neither a destination nor a digest refresh (--digest) was specified");
        }
        if self.identity.hardlink_base.is_some() && self.paths.destination.is_none() {
            anyhow::bail!("--hardlink-base requires a destination");
        }
        if self.output.quiet && self.output.verbose > 0 {
            anyhow::bail!("Cannot use both --quiet and --verbose options");
        }
        Ok(())
    }

    /// Build the engine options from the parsed flags.
    #[must_use]
    pub fn to_options(&self) -> Options {
        Options {
            force: self.behavior.force,
            safety: !self.behavior.no_safety,
            interactive: self.behavior.interactive,
            no_remove: self.behavior.no_remove,
            ignore_file: self.behavior.ignore_file.clone().map(OsString::from),
            digest_cache: self.identity.digest.clone().map(OsString::from),
            fscid_cache: self.identity.fscid.clone().map(OsString::from),
            hardlink_base: self.identity.hardlink_base.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn endpoint_parses_local_and_remote_forms() {
        let local = Endpoint::parse("/some/dir").unwrap();
        assert!(local.host.is_none());
        assert_eq!(local.path, PathBuf::from("/some/dir"));

        let remote = Endpoint::parse("backup@vault:/srv/mirror").unwrap();
        assert_eq!(remote.host.as_deref(), Some("backup@vault"));
        assert_eq!(remote.path, PathBuf::from("/srv/mirror"));

        // A colon after a slash stays local.
        let odd = Endpoint::parse("./weird:name").unwrap();
        assert!(odd.host.is_none());

        assert!(Endpoint::parse("vault:").is_err());
        assert!(Endpoint::parse("").is_err());
    }

    #[test]
    fn plain_source_destination_parses() {
        let args = Args::try_parse_from(["mirsync", "/src", "/dst"]).unwrap();
        assert!(args.validate().is_ok());
        let opts = args.to_options();
        assert!(opts.safety);
        assert!(!opts.force);
        assert!(opts.ignore_file.is_none());
    }

    #[test]
    fn bare_flags_pick_default_cache_names() {
        let args = Args::try_parse_from(["mirsync", "-m", "-x", "/src", "/dst"]).unwrap();
        let opts = args.to_options();
        assert_eq!(
            opts.digest_cache.as_deref(),
            Some(".MD5.CHECKSUMS".as_ref())
        );
        assert_eq!(opts.ignore_file.as_deref(), Some(".mirignore".as_ref()));

        let named = Args::try_parse_from(["mirsync", "--digest=SUMS", "/src", "/dst"]).unwrap();
        assert_eq!(
            named.to_options().digest_cache.as_deref(),
            Some("SUMS".as_ref())
        );
    }

    #[test]
    fn destination_required_unless_digest_or_slave() {
        let args = Args::try_parse_from(["mirsync", "/src"]).unwrap();
        assert!(args.validate().is_err());

        let refresh = Args::try_parse_from(["mirsync", "-m", "/src"]).unwrap();
        assert!(refresh.validate().is_ok());

        let slave = Args::try_parse_from(["mirsync", "--slave"]).unwrap();
        assert!(slave.validate().is_ok());
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let args = Args::try_parse_from(["mirsync", "-q", "-v", "/src", "/dst"]).unwrap();
        assert!(args.validate().is_err());
    }
}
