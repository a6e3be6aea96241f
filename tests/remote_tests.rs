//! Remote channel tests over a socketpair
//!
//! The slave loop runs on a helper thread serving one end of a Unix
//! socket pair; the client half drives it through the `Host` trait like
//! the engine would.

mod common;

use common::{inode, write_file};
use mirsync::host::{FileKind, Host, LocalHost};
use mirsync::remote::{server, RemoteHost, Transport};
use mirsync::replicate::{Options, Replicator};
use std::fs;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread;
use tempfile::TempDir;

fn connect() -> (RemoteHost, thread::JoinHandle<()>) {
    let (client_sock, server_sock) = UnixStream::pair().unwrap();
    let handle = thread::spawn(move || {
        let reader = server_sock.try_clone().unwrap();
        server::serve(reader, server_sock).unwrap();
    });
    let transport = Transport::from_streams(
        Box::new(client_sock.try_clone().unwrap()),
        Box::new(client_sock),
    );
    (RemoteHost::from_transport(transport).unwrap(), handle)
}

#[test]
fn remote_host_round_trips_basic_operations() {
    let tmp = TempDir::new().unwrap();
    let (host, server_thread) = connect();

    // mkdir / create / write / open / read
    let dir = tmp.path().join("d");
    host.mkdir(&dir, 0o755).unwrap();
    let mut writer = host.create(&dir.join("f"), 0o600).unwrap();
    writer.write_all(b"remote payload").unwrap();
    writer.flush().unwrap();
    drop(writer);

    let mut body = Vec::new();
    host.open(&dir.join("f"))
        .unwrap()
        .read_to_end(&mut body)
        .unwrap();
    assert_eq!(body, b"remote payload");

    // stat / lstat / readdir
    let st = host.lstat(&dir.join("f")).unwrap();
    assert_eq!(st.kind(), FileKind::Regular);
    assert_eq!(st.size, 14);
    let names = host.read_dir(&dir).unwrap();
    assert_eq!(names, vec![std::ffi::OsString::from("f")]);

    // symlink / readlink / rename / remove
    host.symlink(Path::new("f"), &dir.join("l")).unwrap();
    assert_eq!(host.readlink(&dir.join("l")).unwrap(), Path::new("f"));
    host.rename(&dir.join("l"), &dir.join("l2")).unwrap();
    host.remove(&dir.join("l2")).unwrap();

    // link shares the inode
    host.link(&dir.join("f"), &dir.join("g")).unwrap();
    assert_eq!(inode(&dir.join("f")), inode(&dir.join("g")));

    // chmod / utimes are visible through stat
    host.chmod(&dir.join("f"), 0o640).unwrap();
    host.utimes(&dir.join("f"), 1_700_000_000, 1_700_000_000)
        .unwrap();
    let st = host.lstat(&dir.join("f")).unwrap();
    assert_eq!(st.mode & 0o7777, 0o640);
    assert_eq!(st.mtime, 1_700_000_000);

    drop(host);
    server_thread.join().unwrap();
}

#[test]
fn remote_errors_carry_errno() {
    let tmp = TempDir::new().unwrap();
    let (host, server_thread) = connect();

    let err = match host.open(&tmp.path().join("missing")) {
        Ok(_) => panic!("expected error"),
        Err(e) => e,
    };
    assert_eq!(err.raw_os_error(), Some(libc::ENOENT));

    let err = host.rmdir(&tmp.path().join("missing")).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::ENOENT));

    drop(host);
    server_thread.join().unwrap();
}

/// The engine drives a remote destination exactly like a local one.
#[test]
fn replication_into_remote_destination() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    fs::create_dir(&src).unwrap();
    fs::create_dir(&dst).unwrap();

    write_file(&src.join("a"), b"hello", 0o644);
    fs::hard_link(src.join("a"), src.join("b")).unwrap();
    std::os::unix::fs::symlink("a", src.join("c")).unwrap();
    fs::create_dir(src.join("d")).unwrap();
    write_file(&src.join("d/e"), b"inner", 0o600);
    write_file(&dst.join("stale"), b"gone", 0o644);

    let (remote, server_thread) = connect();
    let local = LocalHost::new();
    let opts = Options::default();
    let mut rep = Replicator::new(&opts, &local, &remote);
    let failures = rep.run(&src, Some(&dst));

    assert_eq!(failures, 0);
    assert_eq!(fs::read(dst.join("a")).unwrap(), b"hello");
    assert_eq!(inode(&dst.join("a")), inode(&dst.join("b")));
    assert_eq!(
        fs::read_link(dst.join("c")).unwrap(),
        Path::new("a").to_path_buf()
    );
    assert_eq!(fs::read(dst.join("d/e")).unwrap(), b"inner");
    assert!(!dst.join("stale").exists());
    assert_eq!(rep.counters().copied_items, 4);
    assert_eq!(rep.counters().removed_items, 1);

    drop(rep);
    drop(remote);
    server_thread.join().unwrap();
}
