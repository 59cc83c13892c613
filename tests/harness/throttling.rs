//! Throttling Tests
//!
//! Outputs are slowed according to the throttling mode, and `Sometimes`
//! never stacks on a backend that already limits its own throughput.

use crate::common::*;
use faultline::{LockFactory, ThrottlePolicy};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DELAY_MS: u64 = 200;

fn throttle_config(mode: Throttling) -> HarnessConfig {
    let mut config = HarnessConfig::deterministic().with_throttling(mode);
    config.throttle = ThrottlePolicy {
        sometimes_one_in: 1,
        min_mbits_per_sec: 1000,
        max_mbits_per_sec: 1000,
        min_delay_ms: DELAY_MS,
        max_delay_ms: DELAY_MS,
        min_bytes_written: 1024,
    };
    config
}

fn timed_write(dir: &dyn Directory, name: &str) -> Duration {
    let start = Instant::now();
    write_file(dir, name, b"x");
    start.elapsed()
}

/// RAM directory that reports its outputs as already rate limited
#[derive(Debug, Default)]
struct PreThrottled(RamDirectory);

impl Directory for PreThrottled {
    fn list_all(&self) -> faultline::Result<Vec<String>> {
        self.0.list_all()
    }

    fn file_exists(&self, name: &str) -> faultline::Result<bool> {
        self.0.file_exists(name)
    }

    fn file_length(&self, name: &str) -> faultline::Result<u64> {
        self.0.file_length(name)
    }

    fn delete_file(&self, name: &str) -> faultline::Result<()> {
        self.0.delete_file(name)
    }

    fn create_output(
        &self,
        name: &str,
        context: IoContext,
    ) -> faultline::Result<Box<dyn IndexOutput>> {
        self.0.create_output(name, context)
    }

    fn open_input(&self, name: &str, context: IoContext) -> faultline::Result<Box<dyn IndexInput>> {
        self.0.open_input(name, context)
    }

    fn sync(&self, names: &[String]) -> faultline::Result<()> {
        self.0.sync(names)
    }

    fn lock_factory(&self) -> Arc<dyn LockFactory> {
        self.0.lock_factory()
    }

    fn set_lock_factory(&self, factory: Arc<dyn LockFactory>) -> faultline::Result<()> {
        self.0.set_lock_factory(factory)
    }

    fn is_throttled(&self) -> bool {
        true
    }

    fn close(&self) -> faultline::Result<()> {
        self.0.close()
    }
}

#[test]
fn always_throttles() {
    let (_ram, dir) = dir_with(1, throttle_config(Throttling::Always));
    assert_eq!(dir.throttle().delay(), Duration::from_millis(DELAY_MS));
    assert!(timed_write(&dir, "a") >= Duration::from_millis(DELAY_MS));
    dir.close().unwrap();
}

#[test]
fn never_throttles() {
    let (_ram, dir) = dir_with(1, throttle_config(Throttling::Never));
    assert!(timed_write(&dir, "a") < Duration::from_millis(DELAY_MS));
    dir.close().unwrap();
}

#[test]
fn sometimes_throttles_plain_backend() {
    let (_ram, dir) = dir_with(1, throttle_config(Throttling::Sometimes));
    assert!(timed_write(&dir, "a") >= Duration::from_millis(DELAY_MS));
    dir.close().unwrap();
}

#[test]
fn sometimes_skips_throttled_backend() {
    let inner = Arc::new(PreThrottled::default());
    let dir = MockDirectory::with_config(inner, 1, throttle_config(Throttling::Sometimes)).unwrap();
    assert!(dir.is_throttled());
    assert!(timed_write(&dir, "a") < Duration::from_millis(DELAY_MS));
    dir.close().unwrap();
}

#[test]
fn throttled_output_keeps_contents() {
    let (ram, dir) = dir_with(1, throttle_config(Throttling::Always));
    let mut out = dir.create_output("a", IoContext::Default).unwrap();
    out.write_bytes(&content_for("a", 5000)).unwrap();
    assert_eq!(out.position().unwrap(), 5000);
    out.close().unwrap();
    assert_eq!(ram.read_file("a").unwrap(), content_for("a", 5000));
    assert_eq!(dir.open_file_count("a"), 0);
    dir.close().unwrap();
}
