//! Output throttling
//!
//! A [`ThrottledOutput`] sleeps so that the observed write rate does not
//! exceed a simulated bandwidth, and adds a fixed delay to flush, seek and
//! close. [`ThrottleController`] owns the rate and delay drawn for one
//! directory and decides which outputs get wrapped.

use std::thread;
use std::time::{Duration, Instant};

use faultline_core::{IndexInput, IndexOutput, Result};
use rand::Rng;
use tracing::debug;

use crate::config::{ThrottlePolicy, Throttling};

const BYTES_PER_MBIT: u64 = 125_000;

/// Per-directory throttle parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleController {
    bytes_per_second: u64,
    delay: Duration,
    min_bytes_written: u64,
}

impl ThrottleController {
    /// Draw rate and delay from `policy`
    pub fn from_policy<R: Rng>(policy: &ThrottlePolicy, rng: &mut R) -> Self {
        let mbits = rng.gen_range(policy.min_mbits_per_sec..=policy.max_mbits_per_sec);
        let delay_ms = rng.gen_range(policy.min_delay_ms..=policy.max_delay_ms);
        ThrottleController {
            bytes_per_second: u64::from(mbits.max(1)) * BYTES_PER_MBIT,
            delay: Duration::from_millis(delay_ms),
            min_bytes_written: policy.min_bytes_written,
        }
    }

    /// Simulated bandwidth
    pub fn bytes_per_second(&self) -> u64 {
        self.bytes_per_second
    }

    /// Fixed flush/seek/close delay
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether a new output should be throttled
    ///
    /// `Sometimes` always consumes one draw so the random sequence does not
    /// depend on the backend, and never stacks on an already throttled one.
    pub fn should_throttle<R: Rng>(
        mode: Throttling,
        sometimes_one_in: u32,
        rng: &mut R,
        inner_throttled: bool,
    ) -> bool {
        match mode {
            Throttling::Always => true,
            Throttling::Never => false,
            Throttling::Sometimes => {
                let hit = sometimes_one_in > 0 && rng.gen_range(0..sometimes_one_in) == 0;
                hit && !inner_throttled
            }
        }
    }

    /// Wrap `delegate`
    pub fn wrap(&self, delegate: Box<dyn IndexOutput>) -> ThrottledOutput {
        ThrottledOutput {
            delegate,
            bytes_per_second: self.bytes_per_second,
            delay: self.delay,
            min_bytes_written: self.min_bytes_written,
            pending_bytes: 0,
            time_elapsed: Duration::ZERO,
            closed: false,
        }
    }
}

/// Output wrapper that simulates a bandwidth-limited device
#[derive(Debug)]
pub struct ThrottledOutput {
    delegate: Box<dyn IndexOutput>,
    bytes_per_second: u64,
    delay: Duration,
    min_bytes_written: u64,
    pending_bytes: u64,
    time_elapsed: Duration,
    closed: bool,
}

impl ThrottledOutput {
    /// Delay owed for the bytes written since the last sleep
    fn pending_delay(&mut self, closing: bool) -> Duration {
        if self.pending_bytes == 0 || (!closing && self.pending_bytes <= self.min_bytes_written) {
            return Duration::ZERO;
        }
        let elapsed_ns = (self.time_elapsed.as_nanos() as u64).max(1);
        let actual_bps = self.pending_bytes.saturating_mul(1_000_000_000) / elapsed_ns;
        if actual_bps <= self.bytes_per_second {
            return Duration::ZERO;
        }
        let expected = Duration::from_millis(self.pending_bytes * 1000 / self.bytes_per_second);
        let owed = expected.saturating_sub(self.time_elapsed);
        self.pending_bytes = 0;
        self.time_elapsed = Duration::ZERO;
        owed
    }

    fn sleep(duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

impl IndexOutput for ThrottledOutput {
    fn write_byte(&mut self, b: u8) -> Result<()> {
        self.write_bytes(&[b])
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        let before = Instant::now();
        self.delegate.write_bytes(buf)?;
        self.time_elapsed += before.elapsed();
        self.pending_bytes += buf.len() as u64;
        let owed = self.pending_delay(false);
        Self::sleep(owed);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Self::sleep(self.delay);
        self.delegate.flush()
    }

    fn position(&self) -> Result<u64> {
        self.delegate.position()
    }

    fn length(&self) -> Result<u64> {
        self.delegate.length()
    }

    fn set_length(&mut self, len: u64) -> Result<()> {
        self.delegate.set_length(len)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        Self::sleep(self.delay);
        self.delegate.seek(pos)
    }

    fn checksum(&mut self) -> Result<u32> {
        self.delegate.checksum()
    }

    fn copy_bytes(&mut self, input: &mut dyn IndexInput, num_bytes: u64) -> Result<()> {
        let before = Instant::now();
        self.delegate.copy_bytes(input, num_bytes)?;
        self.time_elapsed += before.elapsed();
        self.pending_bytes += num_bytes;
        let owed = self.pending_delay(false);
        Self::sleep(owed);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            let owed = self.delay + self.pending_delay(true);
            debug!(target: "faultline::throttle", delay_ms = owed.as_millis() as u64, "Throttled close");
            Self::sleep(owed);
        }
        self.delegate.close()
    }
}
