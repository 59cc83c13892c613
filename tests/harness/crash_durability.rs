//! Crash Durability Tests
//!
//! A crash may only damage files written since their last sync, and only
//! in one of the five documented ways.

use crate::common::*;
use faultline::FsDirectory;
use proptest::prelude::*;
use std::sync::Arc;

#[test]
fn synced_file_survives_crash() {
    let (ram, dir) = quiet_dir(11);
    let bytes = content_for("_0.dat", 4096);
    write_file(&dir, "_0.dat", &bytes);
    dir.sync(&names(&["_0.dat"])).unwrap();

    let report = dir.crash().unwrap();
    assert!(report.action_for("_0.dat").is_none());
    assert_eq!(ram.read_file("_0.dat").unwrap(), bytes);
}

#[test]
fn unsynced_foo_lands_in_corruption_set() {
    for seed in 0..25 {
        let (ram, dir) = quiet_dir(seed);
        let before = content_for("foo", 1000);
        write_file(&dir, "foo", &before);
        let report = dir.crash().unwrap();
        assert!(report.action_for("foo").is_some());

        let after = ram.read_file("foo").ok();
        assert_crash_outcome(&before, after.as_deref());
    }
}

#[test]
fn crash_outcome_matches_report() {
    for seed in 0..25 {
        let (ram, dir) = quiet_dir(seed);
        let before = content_for("foo", 512);
        write_file(&dir, "foo", &before);
        let report = dir.crash().unwrap();
        let after = ram.read_file("foo").ok();
        match report.action_for("foo").unwrap() {
            CorruptionAction::Deleted => assert!(after.is_none()),
            CorruptionAction::Zeroed => assert_eq!(after.unwrap(), vec![0u8; 512]),
            CorruptionAction::PartiallyTruncated => assert_eq!(after.unwrap(), &before[..256]),
            CorruptionAction::Unchanged => assert_eq!(after.unwrap(), before),
            CorruptionAction::FullyTruncated => assert!(after.unwrap().is_empty()),
        }
    }
}

#[test]
fn crash_never_mixes_file_contents() {
    let (ram, dir) = quiet_dir(99);
    let files = ["_0.a", "_0.b", "_0.c", "_0.d", "_0.e", "_0.f"];
    for name in files {
        write_file(&dir, name, &content_for(name, 300));
    }
    dir.crash().unwrap();
    for name in files {
        let after = ram.read_file(name).ok();
        assert_crash_outcome(&content_for(name, 300), after.as_deref());
    }
    // temp files from partial truncation never leak into the listing
    for name in ram.list_all().unwrap() {
        assert!(files.contains(&name.as_str()), "stray file {}", name);
    }
}

#[test]
fn crash_then_reboot_keeps_synced_set() {
    let (ram, dir) = quiet_dir(3);
    write_file(&dir, "segments_1", b"commit-1");
    write_file(&dir, "_1.dat", b"segment data");
    dir.sync(&names(&["segments_1", "_1.dat"])).unwrap();
    write_file(&dir, "segments_2", b"commit-2");

    dir.crash().unwrap();
    dir.clear_crash();
    assert!(dir.unsynced_files().is_empty());
    assert_eq!(ram.read_file("segments_1").unwrap(), b"commit-1");
    assert_eq!(ram.read_file("_1.dat").unwrap(), b"segment data");

    // the rebooted directory is usable again
    write_file(&dir, "segments_3", b"commit-3");
    dir.sync(&names(&["segments_3"])).unwrap();
    dir.set_check_index_on_close(false);
    dir.close().unwrap();
}

#[test]
fn crash_closes_open_handles() {
    let (_ram, dir) = quiet_dir(8);
    write_file(&dir, "r", b"readable");
    dir.sync(&names(&["r"])).unwrap();
    let mut input = dir.open_input("r", IoContext::Default).unwrap();
    let mut out = dir.create_output("w", IoContext::Default).unwrap();
    out.write_bytes(b"pending").unwrap();

    let report = dir.crash().unwrap();
    assert_eq!(report.close_failures, 0);
    assert!(dir.open_files().is_empty());

    assert!(matches!(
        input.read_byte().unwrap_err(),
        Error::UseAfterClose { .. }
    ));
    assert!(matches!(out.write_byte(1).unwrap_err(), Error::Crashed { .. }));
    // closing force-closed handles is harmless
    input.close().unwrap();
    out.close().unwrap();
    dir.clear_crash();
    dir.close().unwrap();
}

#[test]
fn crash_on_filesystem_backend() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let fs = Arc::new(FsDirectory::open(tmp.path()).unwrap());
    let dir = MockDirectory::with_config(fs, 5, HarnessConfig::deterministic()).unwrap();

    let kept = content_for("_0.si", 2048);
    let risky = content_for("_1.si", 2048);
    write_file(&dir, "_0.si", &kept);
    dir.sync(&names(&["_0.si"])).unwrap();
    write_file(&dir, "_1.si", &risky);

    dir.crash().unwrap();
    dir.clear_crash();

    let reopened = FsDirectory::open(tmp.path()).unwrap();
    assert_eq!(read_file(&reopened, "_0.si"), kept);
    let after = if reopened.file_exists("_1.si").unwrap() {
        Some(read_file(&reopened, "_1.si"))
    } else {
        None
    };
    assert_crash_outcome(&risky, after.as_deref());
    for name in reopened.list_all().unwrap() {
        assert!(!name.contains(".crash"), "stray temp file {}", name);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_synced_bytes_survive_crash(
        seed in any::<u64>(),
        files in prop::collection::vec((1usize..2048, any::<bool>()), 1..8),
    ) {
        let (ram, dir) = quiet_dir(seed);
        let mut expected = Vec::new();
        for (i, (len, synced)) in files.iter().enumerate() {
            let name = format!("_{}.seg", i);
            let bytes = content_for(&name, *len);
            write_file(&dir, &name, &bytes);
            if *synced {
                dir.sync(&[name.clone()]).unwrap();
            }
            expected.push((name, bytes, *synced));
        }

        let report = dir.crash().unwrap();
        for (name, bytes, synced) in &expected {
            if *synced {
                prop_assert!(report.action_for(name).is_none());
                prop_assert_eq!(&ram.read_file(name).unwrap(), bytes);
            } else {
                prop_assert!(report.action_for(name).is_some());
                let after = ram.read_file(name).ok();
                assert_crash_outcome(bytes, after.as_deref());
            }
        }
    }
}
