//! Child-process transport for the remote channel
//!
//! The channel is a pair of byte streams, normally the stdio of an
//! `ssh user@host mirsync --slave` child. SIGPIPE is suppressed the
//! moment a transport comes into existence so that a dying peer surfaces
//! as an ordinary write error instead of killing the run; the suppression
//! lives here, not at process scope.

use super::wire;
use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use tracing::debug;

/// Environment variable overriding the remote shell command
const RSH_ENV: &str = "MIRSYNC_RSH";

fn suppress_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

/// One connected request/response channel
pub struct Transport {
    reader: Box<dyn Read>,
    writer: Option<Box<dyn Write>>,
    child: Option<Child>,
}

impl Transport {
    /// Spawn the remote slave through the configured remote shell
    /// (`ssh` unless `MIRSYNC_RSH` says otherwise) and connect to its
    /// stdio.
    ///
    /// # Errors
    ///
    /// Returns an error when the shell cannot be spawned or its stdio
    /// pipes cannot be taken.
    pub fn spawn_remote(host_spec: &str) -> io::Result<Self> {
        suppress_sigpipe();

        let rsh = std::env::var(RSH_ENV).unwrap_or_else(|_| "ssh".to_string());
        let mut words = rsh.split_whitespace();
        let program = words.next().unwrap_or("ssh");
        let mut cmd = Command::new(program);
        cmd.args(words);
        cmd.arg(host_spec);
        cmd.arg("mirsync");
        cmd.arg("--slave");
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());
        debug!("spawning remote slave on {}", host_spec);

        let mut child = cmd.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("no stdin pipe on remote shell"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("no stdout pipe on remote shell"))?;
        Ok(Self {
            reader: Box::new(stdout),
            writer: Some(Box::new(stdin)),
            child: Some(child),
        })
    }

    /// Connect over a pre-established stream pair (used by tests and by
    /// callers that manage their own channel).
    pub fn from_streams(reader: Box<dyn Read>, writer: Box<dyn Write>) -> Self {
        suppress_sigpipe();
        Self {
            reader,
            writer: Some(writer),
            child: None,
        }
    }

    /// Send one request frame.
    pub fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe))?;
        wire::write_frame(writer.as_mut(), payload)
    }

    /// Receive one response frame.
    pub fn recv(&mut self) -> io::Result<Vec<u8>> {
        wire::read_frame(self.reader.as_mut())
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        // Closing the peer's stdin ends its serve loop; reap the child so
        // it does not linger.
        self.writer = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
        }
    }
}
