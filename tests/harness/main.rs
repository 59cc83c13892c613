//! Integration tests for the fault-injecting directory.
//!
//! These tests drive `MockDirectory` only through the public `Directory`
//! contract, the way storage code under test would, and check the
//! guarantees the harness makes: crash damage limited to unsynced data,
//! open-file protection, write-once names, leak detection, fault injection
//! rates, the disk quota and behavior under concurrent callers.

#[path = "../common/mod.rs"]
mod common;

mod concurrency;
mod crash_durability;
mod disk_full;
mod injection;
mod lifecycle;
mod open_files;
mod throttling;
mod write_once;
