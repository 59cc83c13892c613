//! Write-Once Tests
//!
//! A name may be created once unless it is deleted first; the generation
//! marker is exempt.

use crate::common::*;

#[test]
fn second_create_fails() {
    let (_ram, dir) = quiet_dir(1);
    write_file(&dir, "_0.cfs", b"one");
    let err = dir.create_output("_0.cfs", IoContext::Default).unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { .. }));
    assert!(err.to_string().contains("_0.cfs"));
    dir.close().unwrap();
}

#[test]
fn recreate_after_delete_succeeds() {
    let (ram, dir) = quiet_dir(1);
    write_file(&dir, "_0.cfs", b"one");
    dir.delete_file("_0.cfs").unwrap();
    write_file(&dir, "_0.cfs", b"two");
    assert_eq!(ram.read_file("_0.cfs").unwrap(), b"two");
    dir.close().unwrap();
}

#[test]
fn generation_marker_may_be_rewritten() {
    let (ram, dir) = quiet_dir(1);
    dir.set_check_index_on_close(false);
    for generation in 1..=3u8 {
        write_file(&dir, faultline::GENERATION_MARKER, &[generation]);
    }
    assert_eq!(ram.read_file(faultline::GENERATION_MARKER).unwrap(), vec![3]);
    dir.close().unwrap();
}

#[test]
fn failed_create_does_not_reserve_name() {
    let (_ram, dir) = quiet_dir(1);
    dir.set_random_io_exception_rate_on_open(1.0).unwrap();
    dir.set_allow_random_file_not_found(false);
    assert!(dir.create_output("a", IoContext::Default).is_err());
    dir.set_random_io_exception_rate_on_open(0.0).unwrap();
    write_file(&dir, "a", b"ok");
    dir.close().unwrap();
}

#[test]
fn double_write_allowed_when_policy_off() {
    let (ram, dir) = quiet_dir(1);
    dir.set_prevent_double_write(false);
    write_file(&dir, "a", b"one");
    write_file(&dir, "a", b"two");
    assert_eq!(ram.read_file("a").unwrap(), b"two");
    dir.close().unwrap();
}
