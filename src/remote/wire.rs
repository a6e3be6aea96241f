//! Wire format for the remote-call channel
//!
//! Every exchange is one request frame followed by one response frame; the
//! channel carries no pipelining. A frame is a little-endian `u32` payload
//! length followed by the payload. Requests start with an opcode byte;
//! responses start with a status byte (`0` ok, `1` error). Error bodies
//! carry the raw errno (when there is one) plus a message, so the client
//! can rebuild an `io::Error` whose `raw_os_error()` matches what the
//! slave observed.

use crate::host::FileStat;
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::PathBuf;

/// Highest frame size either side will accept. Content moves in 64 KiB
/// blocks, so this leaves generous headroom for headers and listings.
pub const MAX_FRAME: usize = 1 << 20;

/// Protocol revision; both ends must agree at hello time.
pub const PROTOCOL_VERSION: u32 = 1;

/// Request opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    Hello = 0,
    Stat = 1,
    Lstat = 2,
    Open = 3,
    Create = 4,
    Read = 5,
    Write = 6,
    Close = 7,
    ReadDir = 8,
    Mkdir = 9,
    Rmdir = 10,
    Remove = 11,
    Rename = 12,
    Link = 13,
    Symlink = 14,
    Readlink = 15,
    Chmod = 16,
    Chown = 17,
    Lchown = 18,
    Chflags = 19,
    Utimes = 20,
    Mknod = 21,
    Umask = 22,
    Shutdown = 23,
}

impl Op {
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Hello,
            1 => Self::Stat,
            2 => Self::Lstat,
            3 => Self::Open,
            4 => Self::Create,
            5 => Self::Read,
            6 => Self::Write,
            7 => Self::Close,
            8 => Self::ReadDir,
            9 => Self::Mkdir,
            10 => Self::Rmdir,
            11 => Self::Remove,
            12 => Self::Rename,
            13 => Self::Link,
            14 => Self::Symlink,
            15 => Self::Readlink,
            16 => Self::Chmod,
            17 => Self::Chown,
            18 => Self::Lchown,
            19 => Self::Chflags,
            20 => Self::Utimes,
            21 => Self::Mknod,
            22 => Self::Umask,
            23 => Self::Shutdown,
            _ => return None,
        })
    }
}

pub fn write_frame(writer: &mut dyn Write, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

pub fn read_frame(reader: &mut dyn Read) -> io::Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "oversized frame",
        ));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Payload builder
#[derive(Debug, Default)]
pub struct MsgBuf {
    buf: Vec<u8>,
}

impl MsgBuf {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, value: &[u8]) {
        self.put_u32(value.len() as u32);
        self.buf.extend_from_slice(value);
    }

    pub fn put_path(&mut self, path: &std::path::Path) {
        self.put_bytes(path.as_os_str().as_bytes());
    }

    pub fn put_stat(&mut self, st: &FileStat) {
        self.put_u32(st.mode);
        self.put_u32(st.uid);
        self.put_u32(st.gid);
        self.put_u64(st.size);
        self.put_u64(st.blocks);
        self.put_i64(st.mtime);
        self.put_u64(st.nlink);
        self.put_u64(st.ino);
        self.put_u64(st.rdev);
        self.put_u64(st.dev);
        match st.flags {
            Some(flags) => {
                self.put_u8(1);
                self.put_u32(flags);
            }
            None => self.put_u8(0),
        }
        match st.fsmid {
            Some(id) => {
                self.put_u8(1);
                self.put_u64(id);
            }
            None => self.put_u8(0),
        }
    }
}

fn short() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "short message")
}

/// Payload reader
#[derive(Debug)]
pub struct MsgParser<'a> {
    data: &'a [u8],
}

impl<'a> MsgParser<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn take(&mut self, n: usize) -> io::Result<&'a [u8]> {
        if self.data.len() < n {
            return Err(short());
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    pub fn take_u8(&mut self) -> io::Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn take_u32(&mut self) -> io::Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().map_err(|_| short())?))
    }

    pub fn take_u64(&mut self) -> io::Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().map_err(|_| short())?))
    }

    pub fn take_i64(&mut self) -> io::Result<i64> {
        let bytes = self.take(8)?;
        Ok(i64::from_le_bytes(bytes.try_into().map_err(|_| short())?))
    }

    pub fn take_i32(&mut self) -> io::Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes(bytes.try_into().map_err(|_| short())?))
    }

    pub fn take_bytes(&mut self) -> io::Result<&'a [u8]> {
        let len = self.take_u32()? as usize;
        self.take(len)
    }

    pub fn take_path(&mut self) -> io::Result<PathBuf> {
        Ok(PathBuf::from(OsString::from_vec(
            self.take_bytes()?.to_vec(),
        )))
    }

    pub fn take_stat(&mut self) -> io::Result<FileStat> {
        let mode = self.take_u32()?;
        let uid = self.take_u32()?;
        let gid = self.take_u32()?;
        let size = self.take_u64()?;
        let blocks = self.take_u64()?;
        let mtime = self.take_i64()?;
        let nlink = self.take_u64()?;
        let ino = self.take_u64()?;
        let rdev = self.take_u64()?;
        let dev = self.take_u64()?;
        let flags = if self.take_u8()? != 0 {
            Some(self.take_u32()?)
        } else {
            None
        };
        let fsmid = if self.take_u8()? != 0 {
            Some(self.take_u64()?)
        } else {
            None
        };
        Ok(FileStat {
            mode,
            uid,
            gid,
            size,
            blocks,
            mtime,
            nlink,
            ino,
            rdev,
            dev,
            flags,
            fsmid,
        })
    }
}

/// Encode an error response body (status byte included).
#[must_use]
pub fn encode_error(error: &io::Error) -> Vec<u8> {
    let mut msg = MsgBuf::new();
    msg.put_u8(1);
    msg.put_i32(error.raw_os_error().unwrap_or(0));
    msg.put_bytes(error.to_string().as_bytes());
    msg.buf
}

/// Decode a response: strips the status byte, rebuilding the remote error
/// when the status says so.
pub fn decode_response(payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut parser = MsgParser::new(payload);
    match parser.take_u8()? {
        0 => Ok(parser.data.to_vec()),
        1 => {
            let errno = parser.take_i32()?;
            let msg = String::from_utf8_lossy(parser.take_bytes()?).into_owned();
            if errno != 0 {
                Err(io::Error::from_raw_os_error(errno))
            } else {
                Err(io::Error::other(msg))
            }
        }
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "bad response status",
        )),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn frames_round_trip() {
        let mut channel = Vec::new();
        write_frame(&mut channel, b"payload").unwrap();
        let mut cursor = io::Cursor::new(channel);
        assert_eq!(read_frame(&mut cursor).unwrap(), b"payload");
    }

    #[test]
    fn stat_round_trips() {
        let st = FileStat {
            mode: 0o100_644,
            uid: 1000,
            gid: 1000,
            size: 12345,
            blocks: 24,
            mtime: 1_700_000_000,
            nlink: 3,
            ino: 99,
            rdev: 0,
            dev: 7,
            flags: Some(4),
            fsmid: None,
        };
        let mut msg = MsgBuf::new();
        msg.put_stat(&st);
        let mut parser = MsgParser::new(msg.as_slice());
        assert_eq!(parser.take_stat().unwrap(), st);
        assert!(parser.is_empty());
    }

    #[test]
    fn errors_carry_errno_across() {
        let encoded = encode_error(&io::Error::from_raw_os_error(libc::ENOENT));
        let err = decode_response(&encoded).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn op_bytes_round_trip() {
        for op in [Op::Hello, Op::Read, Op::Mknod, Op::Shutdown] {
            assert_eq!(Op::from_u8(op as u8), Some(op));
        }
        assert_eq!(Op::from_u8(200), None);
    }
}
