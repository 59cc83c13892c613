//! Concurrency Tests
//!
//! Many threads may drive one directory at once; bookkeeping stays
//! consistent and a crash in the middle never hangs a writer.

use crate::common::*;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn parallel_writers_and_readers() {
    let config = HarnessConfig::default().with_throttling(Throttling::Never);
    let (_ram, dir) = dir_with(31, config);
    let dir = Arc::new(dir);
    let threads = 8;
    let per_thread = 50;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let dir = Arc::clone(&dir);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..per_thread {
                    let name = format!("_{}_{}.dat", t, i);
                    let bytes = content_for(&name, 64 + i);
                    write_file(dir.as_ref(), &name, &bytes);
                    assert_eq!(read_file(dir.as_ref(), &name), bytes);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert!(dir.open_files().is_empty());
    assert_eq!(dir.list_all().unwrap().len(), threads * per_thread);
    assert_eq!(dir.unsynced_files().len(), threads * per_thread);
    dir.close().unwrap();
}

#[test]
fn crash_during_writes_fails_fast() {
    let (_ram, dir) = quiet_dir(17);
    let dir = Arc::new(dir);
    let threads = 4;
    let started = Arc::new(Barrier::new(threads + 1));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let dir = Arc::clone(&dir);
            let started = Arc::clone(&started);
            thread::spawn(move || {
                let mut out = dir
                    .create_output(&format!("w{}", t), IoContext::Default)
                    .unwrap();
                started.wait();
                let mut failure = None;
                for _ in 0..100_000 {
                    if let Err(e) = out.write_bytes(&[1u8; 16]) {
                        failure = Some(e);
                        break;
                    }
                }
                out.close().unwrap();
                failure
            })
        })
        .collect();

    started.wait();
    dir.crash().unwrap();

    for h in handles {
        if let Some(err) = h.join().unwrap() {
            assert!(
                matches!(err, Error::Crashed { .. } | Error::UseAfterClose { .. }),
                "unexpected error {:?}",
                err
            );
        }
    }
    assert!(dir.open_files().is_empty());
    dir.clear_crash();
    dir.close().unwrap();
}

#[test]
fn concurrent_syncs_and_deletes() {
    let (_ram, dir) = quiet_dir(23);
    for i in 0..40 {
        write_file(&dir, &format!("f{}", i), &[i as u8; 32]);
    }
    let dir = Arc::new(dir);
    let syncer = {
        let dir = Arc::clone(&dir);
        thread::spawn(move || {
            for i in (0..40).step_by(2) {
                dir.sync(&[format!("f{}", i)]).unwrap();
            }
        })
    };
    let deleter = {
        let dir = Arc::clone(&dir);
        thread::spawn(move || {
            for i in (1..40).step_by(2) {
                dir.delete_file(&format!("f{}", i)).unwrap();
            }
        })
    };
    syncer.join().unwrap();
    deleter.join().unwrap();

    assert!(dir.unsynced_files().is_empty());
    assert_eq!(dir.list_all().unwrap().len(), 20);
    dir.close().unwrap();
}
