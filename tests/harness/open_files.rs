//! Open File Protection Tests
//!
//! Files that are open cannot be deleted or overwritten, and files still
//! open for write cannot be read, unless the policy allows it.

use crate::common::*;

#[test]
fn delete_open_file_refused_with_io_error() {
    let (ram, dir) = quiet_dir(1);
    write_file(&dir, "a", b"x");
    let mut input = dir.open_input("a", IoContext::Default).unwrap();

    let err = dir.delete_file("a").unwrap_err();
    assert!(matches!(
        err,
        Error::FileInUse {
            action: FileAction::Delete,
            ..
        }
    ));
    assert!(!err.is_fatal());
    assert!(ram.file_exists("a").unwrap());
    assert!(dir.open_deleted_files().contains("a"));

    input.close().unwrap();
    dir.delete_file("a").unwrap();
    assert!(dir.open_deleted_files().is_empty());
    dir.close().unwrap();
}

#[test]
fn delete_open_file_under_assert_policy() {
    let (ram, dir) = quiet_dir(1);
    dir.set_assert_no_delete_open_file(true);
    write_file(&dir, "a", b"x");
    let mut input = dir.open_input("a", IoContext::Default).unwrap();

    let err = dir.delete_file("a").unwrap_err();
    assert!(matches!(err, Error::InvariantViolation { .. }));
    assert!(err.is_fatal());
    assert!(ram.file_exists("a").unwrap());
    input.close().unwrap();
    dir.close().unwrap();
}

#[test]
fn delete_allowed_when_policy_off() {
    let (ram, dir) = quiet_dir(1);
    dir.set_no_delete_open_file(false);
    write_file(&dir, "a", b"x");
    let mut input = dir.open_input("a", IoContext::Default).unwrap();
    dir.delete_file("a").unwrap();
    assert!(!ram.file_exists("a").unwrap());
    // the open handle still reads the old bytes
    assert_eq!(input.read_byte().unwrap(), b'x');
    input.close().unwrap();
    dir.close().unwrap();
}

#[test]
fn overwrite_open_file_refused() {
    let (_ram, dir) = quiet_dir(1);
    dir.set_prevent_double_write(false);
    let mut out = dir.create_output("a", IoContext::Default).unwrap();
    let err = dir.create_output("a", IoContext::Default).unwrap_err();
    assert!(matches!(
        err,
        Error::FileInUse {
            action: FileAction::Overwrite,
            ..
        }
    ));
    out.close().unwrap();
    dir.close().unwrap();
}

#[test]
fn read_while_writing_refused() {
    let (_ram, dir) = quiet_dir(1);
    let mut out = dir.create_output("a", IoContext::Default).unwrap();
    out.write_bytes(b"partial").unwrap();
    assert!(matches!(
        dir.open_input("a", IoContext::Default).unwrap_err(),
        Error::FileInUse {
            action: FileAction::Read,
            ..
        }
    ));
    out.close().unwrap();
    assert_eq!(read_file(&dir, "a"), b"partial");
    dir.close().unwrap();
}

#[test]
fn segments_files_readable_while_writing() {
    let (_ram, dir) = quiet_dir(1);
    dir.set_check_index_on_close(false);
    let mut out = dir.create_output("segments_5", IoContext::Default).unwrap();
    out.write_bytes(b"gen").unwrap();
    let mut input = dir.open_input("segments_5", IoContext::Default).unwrap();
    input.close().unwrap();
    out.close().unwrap();
    dir.close().unwrap();
}

#[test]
fn blocked_delete_tolerated_by_unreferenced_check() {
    #[derive(Debug)]
    struct DeleteEverythingButCommits;

    impl faultline::IndexVerifier for DeleteEverythingButCommits {
        fn check_index(&self, _dir: &dyn Directory) -> faultline::Result<()> {
            Ok(())
        }

        fn delete_unreferenced_files(&self, dir: &dyn Directory) -> faultline::Result<()> {
            for name in dir.list_all()? {
                if !name.starts_with("segments") {
                    dir.delete_file(&name)?;
                }
            }
            Ok(())
        }
    }

    let (_ram, dir) = quiet_dir(1);
    dir.set_verifier(std::sync::Arc::new(DeleteEverythingButCommits));
    write_file(&dir, "segments_1", b"commit");
    write_file(&dir, "_0.old", b"stale");
    dir.sync(&names(&["segments_1", "_0.old"])).unwrap();

    // the engine tried to delete _0.old while a reader still had it open
    let mut input = dir.open_input("_0.old", IoContext::Default).unwrap();
    assert!(dir.delete_file("_0.old").is_err());
    input.close().unwrap();

    // _0.old is discounted because its deletion was already attempted
    dir.close().unwrap();
}
