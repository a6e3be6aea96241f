//! Slave-mode server
//!
//! Services the wire protocol against the local filesystem. One request
//! frame in, one response frame out, until the peer closes the channel or
//! sends an explicit shutdown. Open file handles are tracked by a small
//! descriptor table whose ids are only meaningful on this channel.

use super::wire::{self, MsgBuf, MsgParser, Op, PROTOCOL_VERSION};
use crate::error::{Result, SyncError};
use crate::host::{Host, LocalHost, ReadHandle, WriteHandle};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use tracing::debug;

enum Handle {
    Reader(ReadHandle),
    Writer(WriteHandle),
}

struct Server {
    host: LocalHost,
    handles: HashMap<u32, Handle>,
    next_fd: u32,
}

impl Server {
    fn new() -> Self {
        Self {
            host: LocalHost::new(),
            handles: HashMap::new(),
            next_fd: 1,
        }
    }

    fn register(&mut self, handle: Handle) -> u32 {
        let fd = self.next_fd;
        self.next_fd = self.next_fd.wrapping_add(1).max(1);
        self.handles.insert(fd, handle);
        fd
    }

    #[allow(clippy::too_many_lines)]
    fn handle(&mut self, op: Op, parser: &mut MsgParser<'_>) -> io::Result<MsgBuf> {
        let mut reply = MsgBuf::new();
        match op {
            Op::Hello => {
                let peer = parser.take_u32()?;
                if peer != PROTOCOL_VERSION {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("unsupported protocol revision {peer}"),
                    ));
                }
                reply.put_u32(PROTOCOL_VERSION);
            }
            Op::Stat => reply.put_stat(&self.host.stat(&parser.take_path()?)?),
            Op::Lstat => reply.put_stat(&self.host.lstat(&parser.take_path()?)?),
            Op::Open => {
                let handle = self.host.open(&parser.take_path()?)?;
                reply.put_u32(self.register(Handle::Reader(handle)));
            }
            Op::Create => {
                let path = parser.take_path()?;
                let mode = parser.take_u32()?;
                let handle = self.host.create(&path, mode)?;
                reply.put_u32(self.register(Handle::Writer(handle)));
            }
            Op::Read => {
                let fd = parser.take_u32()?;
                let want = (parser.take_u32()? as usize).min(wire::MAX_FRAME / 2);
                let Some(Handle::Reader(reader)) = self.handles.get_mut(&fd) else {
                    return Err(io::Error::from_raw_os_error(libc::EBADF));
                };
                let mut buf = vec![0u8; want];
                let n = reader.read(&mut buf)?;
                reply.put_bytes(&buf[..n]);
            }
            Op::Write => {
                let fd = parser.take_u32()?;
                let data = parser.take_bytes()?;
                let Some(Handle::Writer(writer)) = self.handles.get_mut(&fd) else {
                    return Err(io::Error::from_raw_os_error(libc::EBADF));
                };
                writer.write_all(data)?;
            }
            Op::Close => {
                let fd = parser.take_u32()?;
                if let Some(Handle::Writer(mut writer)) = self.handles.remove(&fd) {
                    writer.flush()?;
                }
            }
            Op::ReadDir => {
                let names = self.host.read_dir(&parser.take_path()?)?;
                reply.put_u32(names.len() as u32);
                for name in names {
                    reply.put_bytes(name.as_bytes());
                }
            }
            Op::Mkdir => {
                let path = parser.take_path()?;
                let mode = parser.take_u32()?;
                self.host.mkdir(&path, mode)?;
            }
            Op::Rmdir => self.host.rmdir(&parser.take_path()?)?,
            Op::Remove => self.host.remove(&parser.take_path()?)?,
            Op::Rename => {
                let from = parser.take_path()?;
                let to = parser.take_path()?;
                self.host.rename(&from, &to)?;
            }
            Op::Link => {
                let from = parser.take_path()?;
                let to = parser.take_path()?;
                self.host.link(&from, &to)?;
            }
            Op::Symlink => {
                let target = parser.take_path()?;
                let path = parser.take_path()?;
                self.host.symlink(&target, &path)?;
            }
            Op::Readlink => {
                let target = self.host.readlink(&parser.take_path()?)?;
                reply.put_bytes(target.as_os_str().as_bytes());
            }
            Op::Chmod => {
                let path = parser.take_path()?;
                let mode = parser.take_u32()?;
                self.host.chmod(&path, mode)?;
            }
            Op::Chown => {
                let path = parser.take_path()?;
                let uid = parser.take_u32()?;
                let gid = parser.take_u32()?;
                self.host.chown(&path, uid, gid)?;
            }
            Op::Lchown => {
                let path = parser.take_path()?;
                let uid = parser.take_u32()?;
                let gid = parser.take_u32()?;
                self.host.lchown(&path, uid, gid)?;
            }
            Op::Chflags => {
                let path = parser.take_path()?;
                let flags = parser.take_u32()?;
                self.host.chflags(&path, flags)?;
            }
            Op::Utimes => {
                let path = parser.take_path()?;
                let atime = parser.take_i64()?;
                let mtime = parser.take_i64()?;
                self.host.utimes(&path, atime, mtime)?;
            }
            Op::Mknod => {
                let path = parser.take_path()?;
                let mode = parser.take_u32()?;
                let rdev = parser.take_u64()?;
                self.host.mknod(&path, mode, rdev)?;
            }
            Op::Umask => {
                let old = self.host.set_umask(parser.take_u32()?)?;
                reply.put_u32(old);
            }
            Op::Shutdown => {}
        }
        Ok(reply)
    }
}

/// Serve the protocol over an arbitrary stream pair until EOF or
/// shutdown.
///
/// # Errors
///
/// Returns an error only when the channel itself breaks; per-operation
/// failures travel back to the peer as error responses.
pub fn serve(mut reader: impl Read, mut writer: impl Write) -> Result<()> {
    let mut server = Server::new();
    loop {
        let frame = match wire::read_frame(&mut reader) {
            Ok(frame) => frame,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("channel closed, slave exiting");
                return Ok(());
            }
            Err(e) => return Err(SyncError::Io(e)),
        };
        let mut parser = MsgParser::new(&frame);
        let op = Op::from_u8(parser.take_u8().map_err(SyncError::Io)?)
            .ok_or_else(|| SyncError::Protocol("unknown opcode".to_string()))?;

        let response = match server.handle(op, &mut parser) {
            Ok(reply) => {
                let mut bytes = Vec::with_capacity(reply.as_slice().len() + 1);
                bytes.push(0);
                bytes.extend_from_slice(reply.as_slice());
                bytes
            }
            Err(e) => wire::encode_error(&e),
        };
        wire::write_frame(&mut writer, &response).map_err(SyncError::Io)?;
        if op == Op::Shutdown {
            debug!("shutdown requested, slave exiting");
            return Ok(());
        }
    }
}

/// Serve the protocol on this process's standard streams (slave mode).
///
/// # Errors
///
/// See [`serve`].
pub fn serve_stdio() -> Result<()> {
    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    serve(stdin, stdout)
}
