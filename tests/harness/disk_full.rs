//! Disk Quota Tests
//!
//! Under `max_size_in_bytes = N`, writes fill the disk exactly to N and the
//! first byte past it fails with a disk-full error.

use crate::common::*;
use proptest::prelude::*;

fn quota_dir(max: u64) -> (std::sync::Arc<RamDirectory>, MockDirectory) {
    dir_with(1, HarnessConfig::deterministic().with_max_size_in_bytes(max))
}

#[test]
fn exactly_n_bytes_fit() {
    let (_ram, dir) = quota_dir(1000);
    write_file(&dir, "a", &[1u8; 1000]);
    assert_eq!(dir.recomputed_actual_size_in_bytes().unwrap(), 1000);
    dir.close().unwrap();
}

#[test]
fn n_plus_one_fails_at_n() {
    let (_ram, dir) = quota_dir(1000);
    let mut out = dir.create_output("a", IoContext::Default).unwrap();
    let err = out.write_bytes(&[1u8; 1001]).unwrap_err();
    match &err {
        Error::DiskFull { usage, written, .. } => {
            assert_eq!(*usage, 1000);
            assert_eq!(*written, 1000);
        }
        other => panic!("expected disk full, got {:?}", other),
    }
    assert!(err.to_string().contains("fake disk full at 1000 bytes"));
    out.close().unwrap();
    assert_eq!(dir.recomputed_actual_size_in_bytes().unwrap(), 1000);
    assert_eq!(dir.max_used_size_in_bytes(), 1000);
    dir.close().unwrap();
}

#[test]
fn quota_counts_all_files() {
    let (_ram, dir) = quota_dir(100);
    write_file(&dir, "a", &[0u8; 60]);
    let mut out = dir.create_output("b", IoContext::Default).unwrap();
    out.write_bytes(&[0u8; 40]).unwrap();
    assert!(out.write_byte(0).unwrap_err().is_disk_full());
    out.close().unwrap();

    // freeing space lets writes continue
    dir.delete_file("a").unwrap();
    write_file(&dir, "c", &[0u8; 60]);
    dir.close().unwrap();
}

#[test]
fn quota_set_after_create_sees_buffered_bytes() {
    let mut config = HarnessConfig::deterministic();
    config.buffered_output_one_in = 1;
    config.max_buffer_size = 4096;
    let (ram, dir) = dir_with(9, config);
    let mut out = dir.create_output("a", IoContext::Default).unwrap();
    out.write_bytes(&[3u8; 50]).unwrap();

    dir.set_max_size_in_bytes(60);
    let err = out.write_bytes(&[4u8; 20]).unwrap_err();
    match &err {
        Error::DiskFull {
            usage,
            written,
            requested,
            ..
        } => {
            assert_eq!(*usage, 60);
            assert_eq!(*written, 10);
            assert_eq!(*requested, 20);
        }
        other => panic!("expected disk full, got {:?}", other),
    }
    out.close().unwrap();
    assert_eq!(ram.read_file("a").unwrap().len(), 60);
    assert_eq!(dir.recomputed_actual_size_in_bytes().unwrap(), 60);
    dir.close().unwrap();
}

#[test]
fn raising_the_quota_unblocks_writes() {
    let (_ram, dir) = quota_dir(10);
    let mut out = dir.create_output("a", IoContext::Default).unwrap();
    out.write_bytes(&[0u8; 10]).unwrap();
    assert!(out.write_byte(0).is_err());
    dir.set_max_size_in_bytes(0);
    out.write_bytes(&[0u8; 1000]).unwrap();
    out.close().unwrap();
    assert_eq!(dir.file_length("a").unwrap(), 1010);
    dir.close().unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_usage_never_exceeds_quota(
        max in 1u64..4096,
        writes in prop::collection::vec(1usize..512, 1..32),
    ) {
        let (_ram, dir) = quota_dir(max);
        let mut out = dir.create_output("f", IoContext::Default).unwrap();
        let mut total = 0u64;
        for len in writes {
            match out.write_bytes(&vec![7u8; len]) {
                Ok(()) => total += len as u64,
                Err(e) => {
                    prop_assert!(e.is_disk_full());
                    prop_assert!(total + len as u64 > max);
                    break;
                }
            }
        }
        out.close().unwrap();
        let used = dir.recomputed_actual_size_in_bytes().unwrap();
        prop_assert!(used <= max);
        prop_assert!(used >= total);
        dir.close().unwrap();
    }
}
