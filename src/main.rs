//! mirsync: incremental filesystem mirroring utility
//!
//! Parses the command line, wires up the local or remote endpoints, runs
//! the replication engine once, and reports the totals. The process exits
//! 0 only when the run finished with zero per-entry failures.

use anyhow::{Context, Result};
use clap::Parser;
use mirsync::cli::{Args, Endpoint};
use mirsync::host::{Host, LocalHost};
use mirsync::remote::{server, RemoteHost};
use mirsync::replicate::Replicator;
use tracing::{error, info, Level};

fn init_logging(args: &Args) -> Result<()> {
    // Everything, including the summary, goes to stderr: in slave mode
    // stdout carries the wire protocol.
    let max_level = if args.output.quiet {
        Level::ERROR
    } else {
        match args.output.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn make_host(endpoint: &Endpoint) -> Result<Box<dyn Host>> {
    match &endpoint.host {
        Some(spec) => {
            let remote = RemoteHost::connect(spec)
                .with_context(|| format!("cannot reach remote endpoint {spec}"))?;
            Ok(Box::new(remote))
        }
        None => Ok(Box::new(LocalHost::new())),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    if args.slave {
        return server::serve_stdio().context("slave channel failed");
    }

    args.validate().context("Invalid arguments")?;

    let source = args
        .paths
        .source
        .as_ref()
        .context("missing source endpoint")?;
    let src_host = make_host(source)?;
    // Entries that vanish mid-run are skipped silently, but an
    // unreachable source root is fatal.
    src_host
        .lstat(&source.path)
        .with_context(|| format!("cannot reach source root {}", source.path.display()))?;
    let dst_host = match args.paths.destination.as_ref() {
        Some(destination) => make_host(destination)?,
        None => Box::new(LocalHost::new()) as Box<dyn Host>,
    };

    let opts = args.to_options();
    let mut replicator = Replicator::new(&opts, src_host.as_ref(), dst_host.as_ref());
    let dst_path = args.paths.destination.as_ref().map(|e| e.path.clone());
    let failures = replicator.run(&source.path, dst_path.as_deref());

    let totals = *replicator.counters();
    if !args.output.quiet {
        info!(
            "{} source items ({} bytes), {} copied, {} removed",
            totals.source_items, totals.source_bytes, totals.copied_items, totals.removed_items
        );
        info!(
            "{} bytes read, {} bytes written",
            totals.read_bytes, totals.written_bytes
        );
    }

    if failures > 0 {
        error!("{failures} failures");
        std::process::exit(1);
    }
    Ok(())
}
