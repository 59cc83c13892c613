//! Fault Injection Tests
//!
//! Random faults follow their configured probability exactly at the
//! extremes, and deterministic hooks fire where they are told to.

use crate::common::*;
use faultline::FailureHook;
use std::sync::Arc;

#[test]
fn zero_rates_never_fail_over_many_cycles() {
    let config = HarnessConfig::default().with_throttling(Throttling::Never);
    let (_ram, dir) = dir_with(2024, config);
    for i in 0..10_000 {
        let name = format!("_{}.tmp", i);
        let mut out = dir.create_output(&name, IoContext::Default).unwrap();
        out.write_bytes(&[i as u8; 17]).unwrap();
        out.write_byte(1).unwrap();
        out.close().unwrap();

        let mut input = dir.open_input(&name, IoContext::Default).unwrap();
        let mut buf = [0u8; 18];
        input.read_bytes(&mut buf).unwrap();
        assert_eq!(buf[..17], [i as u8; 17]);
        assert_eq!(buf[17], 1);
        input.close().unwrap();
    }
    assert_eq!(dir.list_all().unwrap().len(), 10_000);
    dir.close().unwrap();
}

#[test]
fn full_rate_fails_first_write_only() {
    let (_ram, dir) = dir_with(
        5,
        HarnessConfig::deterministic().with_random_io_exception_rate(1.0),
    );
    for i in 0..50 {
        let mut out = dir
            .create_output(&format!("f{}", i), IoContext::Default)
            .unwrap();
        let err = out.write_bytes(b"first").unwrap_err();
        assert!(err.is_injected());
        for _ in 0..10 {
            out.write_bytes(b"more").unwrap();
        }
        out.close().unwrap();
    }
    dir.close().unwrap();
}

#[test]
fn full_rate_on_open_fails_every_open() {
    let (_ram, dir) = quiet_dir(6);
    write_file(&dir, "a", b"data");
    dir.set_random_io_exception_rate_on_open(1.0).unwrap();

    let mut saw_not_found = false;
    let mut saw_injected = false;
    for _ in 0..64 {
        let err = dir.open_input("a", IoContext::Default).unwrap_err();
        saw_not_found |= err.is_not_found();
        saw_injected |= err.is_injected();
    }
    assert!(saw_not_found && saw_injected);

    dir.set_allow_random_file_not_found(false);
    for _ in 0..64 {
        assert!(dir
            .open_input("a", IoContext::Default)
            .unwrap_err()
            .is_injected());
        assert!(dir
            .create_output("b", IoContext::Default)
            .unwrap_err()
            .is_injected());
    }
    dir.set_random_io_exception_rate_on_open(0.0).unwrap();
    assert_eq!(dir.open_file_count("a"), 0);
    dir.close().unwrap();
}

#[test]
fn same_seed_same_faults() {
    let run = |seed: u64| {
        let config = HarnessConfig::deterministic()
            .with_random_io_exception_rate(0.3)
            .with_random_io_exception_rate_on_open(0.2);
        let (_ram, dir) = dir_with(seed, config);
        let mut outcomes = Vec::new();
        for i in 0..200 {
            let outcome = match dir.create_output(&format!("f{}", i), IoContext::Default) {
                Ok(mut out) => {
                    let wrote = out.write_byte(1).is_ok();
                    out.close().unwrap();
                    if wrote { 0 } else { 1 }
                }
                Err(e) if e.is_not_found() => 2,
                Err(_) => 3,
            };
            outcomes.push(outcome);
        }
        outcomes
    };
    let a = run(77);
    assert_eq!(a, run(77));
    assert!(a.contains(&0) && a.contains(&1));
}

#[test]
fn hook_fails_sync_once() {
    let (_ram, dir) = quiet_dir(1);
    write_file(&dir, "a", b"x");
    let hook = Arc::new(OperationFailure::on(Operation::Sync).once());
    dir.fail_on(hook.clone());

    assert!(dir.sync(&names(&["a"])).unwrap_err().is_injected());
    assert!(dir.unsynced_files().contains("a"));
    dir.sync(&names(&["a"])).unwrap();
    assert!(dir.unsynced_files().is_empty());
    assert_eq!(hook.hits(), 1);

    dir.reset_failures();
    assert!(dir.sync(&names(&["a"])).is_err());
    dir.close().unwrap();
}

#[test]
fn hook_fails_writes_to_prefix() {
    let (_ram, dir) = quiet_dir(1);
    let hook = Arc::new(OperationFailure::on(Operation::Write).for_prefix("_5"));
    dir.fail_on(hook.clone());

    write_file(&dir, "_4.dat", b"fine");
    let mut out = dir.create_output("_5.dat", IoContext::Default).unwrap();
    assert!(out.write_bytes(b"doomed").unwrap_err().is_injected());
    hook.clear_do_fail();
    out.write_bytes(b"ok now").unwrap();
    out.close().unwrap();
    dir.close().unwrap();
}

#[test]
fn hook_fails_delete_before_touching_file() {
    let (ram, dir) = quiet_dir(1);
    write_file(&dir, "a", b"x");
    dir.fail_on(Arc::new(OperationFailure::on(Operation::DeleteFile)));
    assert!(dir.delete_file("a").is_err());
    assert!(ram.file_exists("a").unwrap());
    dir.clear_failures();
    dir.delete_file("a").unwrap();
    dir.close().unwrap();
}
