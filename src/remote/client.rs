//! Client side of the remote channel
//!
//! [`RemoteHost`] implements [`Host`] by forwarding every operation as one
//! request/response exchange. File handles returned by `open`/`create`
//! are thin wrappers holding the peer's descriptor id; dropping a handle
//! closes the remote descriptor best-effort.

use super::transport::Transport;
use super::wire::{self, MsgBuf, MsgParser, Op, PROTOCOL_VERSION};
use crate::error::{Result, SyncError};
use crate::host::{FileStat, Host, ReadHandle, WriteHandle};
use std::cell::RefCell;
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Largest content chunk moved per Read/Write exchange
const CHUNK: usize = 256 * 1024;

type Conn = Rc<RefCell<Transport>>;

fn call(conn: &Conn, op: Op, build: impl FnOnce(&mut MsgBuf)) -> io::Result<Vec<u8>> {
    let mut msg = MsgBuf::new();
    msg.put_u8(op as u8);
    build(&mut msg);
    let mut transport = conn.borrow_mut();
    transport.send(msg.as_slice())?;
    let response = transport.recv()?;
    wire::decode_response(&response)
}

fn call_unit(conn: &Conn, op: Op, build: impl FnOnce(&mut MsgBuf)) -> io::Result<()> {
    call(conn, op, build).map(|_| ())
}

/// A remote endpoint reached through a connected [`Transport`]
pub struct RemoteHost {
    conn: Conn,
}

impl RemoteHost {
    /// Spawn the slave on `host_spec` (e.g. `user@backup-box`) and
    /// handshake.
    ///
    /// # Errors
    ///
    /// Fails when the remote shell cannot be spawned or the peer speaks a
    /// different protocol revision.
    pub fn connect(host_spec: &str) -> Result<Self> {
        Self::from_transport(Transport::spawn_remote(host_spec).map_err(SyncError::Io)?)
    }

    /// Handshake over an already-connected transport.
    ///
    /// # Errors
    ///
    /// Fails when the hello exchange fails or the versions disagree.
    pub fn from_transport(transport: Transport) -> Result<Self> {
        let conn = Rc::new(RefCell::new(transport));
        let reply = call(&conn, Op::Hello, |msg| msg.put_u32(PROTOCOL_VERSION))
            .map_err(|e| SyncError::Protocol(format!("hello failed: {e}")))?;
        let peer = MsgParser::new(&reply)
            .take_u32()
            .map_err(|e| SyncError::Protocol(format!("bad hello reply: {e}")))?;
        if peer != PROTOCOL_VERSION {
            return Err(SyncError::Protocol(format!(
                "peer speaks protocol {peer}, expected {PROTOCOL_VERSION}"
            )));
        }
        Ok(Self { conn })
    }

    fn stat_call(&self, op: Op, path: &Path) -> io::Result<FileStat> {
        let reply = call(&self.conn, op, |msg| msg.put_path(path))?;
        MsgParser::new(&reply).take_stat()
    }
}

struct RemoteReader {
    conn: Conn,
    fd: u32,
}

impl Read for RemoteReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = buf.len().min(CHUNK) as u32;
        let fd = self.fd;
        let reply = call(&self.conn, Op::Read, |msg| {
            msg.put_u32(fd);
            msg.put_u32(want);
        })?;
        let mut parser = MsgParser::new(&reply);
        let data = parser.take_bytes()?;
        // Never trust the peer to honor the requested length.
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}

impl Drop for RemoteReader {
    fn drop(&mut self) {
        let fd = self.fd;
        let _ = call_unit(&self.conn, Op::Close, |msg| msg.put_u32(fd));
    }
}

struct RemoteWriter {
    conn: Conn,
    fd: u32,
}

impl Write for RemoteWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let chunk = &buf[..buf.len().min(CHUNK)];
        let fd = self.fd;
        call_unit(&self.conn, Op::Write, |msg| {
            msg.put_u32(fd);
            msg.put_bytes(chunk);
        })?;
        Ok(chunk.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for RemoteWriter {
    fn drop(&mut self) {
        let fd = self.fd;
        let _ = call_unit(&self.conn, Op::Close, |msg| msg.put_u32(fd));
    }
}

impl Host for RemoteHost {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        self.stat_call(Op::Stat, path)
    }

    fn lstat(&self, path: &Path) -> io::Result<FileStat> {
        self.stat_call(Op::Lstat, path)
    }

    fn open(&self, path: &Path) -> io::Result<ReadHandle> {
        let reply = call(&self.conn, Op::Open, |msg| msg.put_path(path))?;
        let fd = MsgParser::new(&reply).take_u32()?;
        Ok(Box::new(RemoteReader {
            conn: Rc::clone(&self.conn),
            fd,
        }))
    }

    fn create(&self, path: &Path, mode: u32) -> io::Result<WriteHandle> {
        let reply = call(&self.conn, Op::Create, |msg| {
            msg.put_path(path);
            msg.put_u32(mode);
        })?;
        let fd = MsgParser::new(&reply).take_u32()?;
        Ok(Box::new(RemoteWriter {
            conn: Rc::clone(&self.conn),
            fd,
        }))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>> {
        let reply = call(&self.conn, Op::ReadDir, |msg| msg.put_path(path))?;
        let mut parser = MsgParser::new(&reply);
        let count = parser.take_u32()?;
        let mut names = Vec::with_capacity(count as usize);
        for _ in 0..count {
            names.push(OsString::from_vec(parser.take_bytes()?.to_vec()));
        }
        Ok(names)
    }

    fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()> {
        call_unit(&self.conn, Op::Mkdir, |msg| {
            msg.put_path(path);
            msg.put_u32(mode);
        })
    }

    fn rmdir(&self, path: &Path) -> io::Result<()> {
        call_unit(&self.conn, Op::Rmdir, |msg| msg.put_path(path))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        call_unit(&self.conn, Op::Remove, |msg| msg.put_path(path))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        call_unit(&self.conn, Op::Rename, |msg| {
            msg.put_path(from);
            msg.put_path(to);
        })
    }

    fn link(&self, from: &Path, to: &Path) -> io::Result<()> {
        call_unit(&self.conn, Op::Link, |msg| {
            msg.put_path(from);
            msg.put_path(to);
        })
    }

    fn symlink(&self, target: &Path, path: &Path) -> io::Result<()> {
        call_unit(&self.conn, Op::Symlink, |msg| {
            msg.put_path(target);
            msg.put_path(path);
        })
    }

    fn readlink(&self, path: &Path) -> io::Result<PathBuf> {
        let reply = call(&self.conn, Op::Readlink, |msg| msg.put_path(path))?;
        let mut parser = MsgParser::new(&reply);
        Ok(PathBuf::from(OsString::from_vec(
            parser.take_bytes()?.to_vec(),
        )))
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        call_unit(&self.conn, Op::Chmod, |msg| {
            msg.put_path(path);
            msg.put_u32(mode);
        })
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        call_unit(&self.conn, Op::Chown, |msg| {
            msg.put_path(path);
            msg.put_u32(uid);
            msg.put_u32(gid);
        })
    }

    fn lchown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        call_unit(&self.conn, Op::Lchown, |msg| {
            msg.put_path(path);
            msg.put_u32(uid);
            msg.put_u32(gid);
        })
    }

    fn chflags(&self, path: &Path, flags: u32) -> io::Result<()> {
        call_unit(&self.conn, Op::Chflags, |msg| {
            msg.put_path(path);
            msg.put_u32(flags);
        })
    }

    fn utimes(&self, path: &Path, atime: i64, mtime: i64) -> io::Result<()> {
        call_unit(&self.conn, Op::Utimes, |msg| {
            msg.put_path(path);
            msg.put_i64(atime);
            msg.put_i64(mtime);
        })
    }

    fn mknod(&self, path: &Path, mode: u32, rdev: u64) -> io::Result<()> {
        call_unit(&self.conn, Op::Mknod, |msg| {
            msg.put_path(path);
            msg.put_u32(mode);
            msg.put_u64(rdev);
        })
    }

    fn set_umask(&self, mask: u32) -> io::Result<u32> {
        let reply = call(&self.conn, Op::Umask, |msg| msg.put_u32(mask))?;
        MsgParser::new(&reply).take_u32()
    }
}
