//! Handle Lifecycle Tests
//!
//! Leaks fail the directory close, handles reject use after close, and the
//! directory itself closes exactly once.

use crate::common::*;
use std::error::Error as _;
use std::sync::Arc;
use std::thread;

#[test]
fn leaked_input_names_the_file() {
    let (_ram, dir) = quiet_dir(1);
    write_file(&dir, "_0.leak", b"x");
    let input = dir.open_input("_0.leak", IoContext::Default).unwrap();

    let err = dir.close().unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("_0.leak"));
    let cause = err.source().expect("opener context attached");
    assert!(cause.to_string().contains("unclosed Input: _0.leak"));
    drop(input);
}

#[test]
fn leaked_output_is_reported() {
    let (_ram, dir) = quiet_dir(1);
    let _out = dir.create_output("_0.out", IoContext::Default).unwrap();
    match dir.close().unwrap_err() {
        Error::LeakedHandles { files, .. } => assert!(files.contains_key("_0.out")),
        other => panic!("expected leaked handles, got {:?}", other),
    }
}

#[test]
fn leaked_slicer_is_reported() {
    let (_ram, dir) = quiet_dir(1);
    write_file(&dir, "cfs", b"0123456789");
    let _slicer = dir.create_slicer("cfs", IoContext::Default).unwrap();
    assert!(matches!(
        dir.close().unwrap_err(),
        Error::LeakedHandles { .. }
    ));
}

#[test]
fn dispose_twice_never_fails() {
    let (ram, dir) = quiet_dir(1);
    write_file(&dir, "a", b"x");
    dir.close().unwrap();
    dir.close().unwrap();
    assert!(!dir.is_open());
    assert!(matches!(ram.list_all(), Err(Error::AlreadyClosed)));
}

#[test]
fn dispose_after_failed_dispose_is_silent() {
    let (_ram, dir) = quiet_dir(1);
    write_file(&dir, "a", b"x");
    let _input = dir.open_input("a", IoContext::Default).unwrap();
    assert!(dir.close().is_err());
    assert!(dir.close().is_ok());
}

#[test]
fn concurrent_dispose_tears_down_once() {
    let (_ram, dir) = quiet_dir(1);
    let dir = Arc::new(dir);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let dir = Arc::clone(&dir);
            thread::spawn(move || dir.close())
        })
        .collect();
    for h in handles {
        h.join().unwrap().unwrap();
    }
    assert!(!dir.is_open());
}

#[test]
fn handles_reject_use_after_close() {
    let (_ram, dir) = quiet_dir(1);
    write_file(&dir, "a", &[0u8; 32]);

    let mut input = dir.open_input("a", IoContext::Default).unwrap();
    input.close().unwrap();
    let err = input.read_byte().unwrap_err();
    assert!(matches!(err, Error::UseAfterClose { .. }));
    assert!(input.clone_input().is_err());
    input.close().unwrap();

    let mut out = dir.create_output("b", IoContext::Default).unwrap();
    out.close().unwrap();
    assert!(matches!(
        out.write_byte(0).unwrap_err(),
        Error::UseAfterClose { .. }
    ));
    dir.close().unwrap();
}

#[test]
fn seek_to_eof_is_legal() {
    let (_ram, dir) = quiet_dir(1);
    write_file(&dir, "a", &[0u8; 1024]);

    let mut input = dir.open_input("a", IoContext::Default).unwrap();
    input.seek(100).unwrap();
    assert_eq!(input.position().unwrap(), 100);
    input.seek(1024).unwrap();
    assert_eq!(input.position().unwrap(), 1024);
    assert!(matches!(input.read_byte().unwrap_err(), Error::Eof { .. }));
    input.close().unwrap();
    dir.close().unwrap();
}

#[test]
fn clones_do_not_need_closing() {
    let (_ram, dir) = quiet_dir(1);
    write_file(&dir, "a", b"abcdef");
    let mut input = dir.open_input("a", IoContext::Default).unwrap();
    let mut clones: Vec<_> = (0..5).map(|_| input.clone_input().unwrap()).collect();
    assert_eq!(dir.input_clone_count(), 5);
    assert_eq!(dir.open_file_count("a"), 1);
    input.close().unwrap();
    assert_eq!(clones[0].read_byte().unwrap(), b'a');
    clones.clear();
    dir.close().unwrap();
}

#[test]
fn operations_fail_after_close() {
    let (_ram, dir) = quiet_dir(1);
    dir.close().unwrap();
    assert!(matches!(
        dir.open_input("a", IoContext::Default),
        Err(Error::AlreadyClosed)
    ));
    assert!(matches!(dir.sync(&names(&["a"])), Err(Error::AlreadyClosed)));
    assert!(matches!(dir.delete_file("a"), Err(Error::AlreadyClosed)));
}
