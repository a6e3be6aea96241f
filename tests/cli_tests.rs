//! Binary-level tests: exit codes, fatal configuration errors, and the
//! remote slave round trip through a fake remote shell.

mod common;

use assert_cmd::Command;
use common::write_file;
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

#[test]
fn copy_run_exits_zero() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    fs::create_dir(&src).unwrap();
    write_file(&src.join("f"), b"payload", 0o644);

    Command::cargo_bin("mirsync")
        .unwrap()
        .arg(&src)
        .arg(&dst)
        .assert()
        .success();
    assert_eq!(fs::read(dst.join("f")).unwrap(), b"payload");
}

#[test]
fn missing_destination_is_fatal() {
    Command::cargo_bin("mirsync")
        .unwrap()
        .arg("/nonexistent-source")
        .assert()
        .failure()
        .stderr(predicate::str::contains("neither a destination"));
}

#[test]
fn safety_refusal_sets_exit_code() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    fs::create_dir(&src).unwrap();
    fs::create_dir_all(dst.join("target")).unwrap();
    write_file(&src.join("target"), b"file now", 0o644);

    Command::cargo_bin("mirsync")
        .unwrap()
        .arg(&src)
        .arg(&dst)
        .assert()
        .failure();
    assert!(dst.join("target").is_dir());

    Command::cargo_bin("mirsync")
        .unwrap()
        .arg("--no-safety")
        .arg(&src)
        .arg(&dst)
        .assert()
        .success();
    assert!(dst.join("target").is_file());
}

#[test]
fn quiet_run_prints_nothing_on_success() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    fs::create_dir(&src).unwrap();
    write_file(&src.join("f"), b"x", 0o644);

    Command::cargo_bin("mirsync")
        .unwrap()
        .arg("--quiet")
        .arg(&src)
        .arg(&dst)
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::is_empty());
}

/// Full remote round trip: the destination endpoint is served by a slave
/// spawned through a stand-in remote shell that ignores its host argument
/// and execs the remaining command locally.
#[test]
fn remote_destination_through_fake_shell() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    let dst = tmp.path().join("dst");
    fs::create_dir(&src).unwrap();
    fs::create_dir(&dst).unwrap();
    write_file(&src.join("f"), b"over the wire", 0o644);
    fs::create_dir(src.join("sub")).unwrap();
    write_file(&src.join("sub/g"), b"nested", 0o600);

    // "remote shell" that drops the host argument and runs the slave
    // with this test's own binary.
    let slave_bin = assert_cmd::cargo::cargo_bin("mirsync");
    let rsh = tmp.path().join("fake-rsh");
    fs::write(
        &rsh,
        format!("#!/bin/sh\nshift 2\nexec \"{}\" \"$@\"\n", slave_bin.display()),
    )
    .unwrap();
    fs::set_permissions(&rsh, fs::Permissions::from_mode(0o755)).unwrap();

    Command::cargo_bin("mirsync")
        .unwrap()
        .env("MIRSYNC_RSH", &rsh)
        .arg(&src)
        .arg(format!("fakehost:{}", dst.display()))
        .assert()
        .success();

    assert_eq!(fs::read(dst.join("f")).unwrap(), b"over the wire");
    assert_eq!(fs::read(dst.join("sub/g")).unwrap(), b"nested");
}
