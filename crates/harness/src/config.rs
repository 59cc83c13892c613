//! Harness configuration
//!
//! Every knob the fault-injecting directory reads lives in [`HarnessConfig`].
//! The struct is plain data: tests usually start from `Default` (or
//! [`HarnessConfig::deterministic`]) and adjust a few fields, while a test
//! driver can load the whole thing from TOML.
//!
//! # Example
//!
//! ```toml
//! max_size_in_bytes = 1048576
//! random_io_exception_rate = 0.05
//! throttling = "never"
//! prevent_double_write = false
//!
//! [throttle]
//! sometimes_one_in = 100
//! ```

use std::path::Path;

use faultline_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// When outputs get wrapped in a throughput limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Throttling {
    /// Every output is throttled
    Always,
    /// One output in `ThrottlePolicy::sometimes_one_in` is throttled
    #[default]
    Sometimes,
    /// No output is throttled
    Never,
}

/// Throughput limiter parameters
///
/// The rate and delay are drawn once per directory from the given ranges so
/// a single seed reproduces them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottlePolicy {
    /// "1 in N" chance for `Throttling::Sometimes`
    pub sometimes_one_in: u32,
    /// Lower bound of the simulated bandwidth, megabits per second
    pub min_mbits_per_sec: u32,
    /// Upper bound of the simulated bandwidth, megabits per second
    pub max_mbits_per_sec: u32,
    /// Lower bound of the flush/close/seek delay
    pub min_delay_ms: u64,
    /// Upper bound of the flush/close/seek delay
    pub max_delay_ms: u64,
    /// Pending bytes below which writes are not delayed (until close)
    pub min_bytes_written: u64,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        ThrottlePolicy {
            sometimes_one_in: 50,
            min_mbits_per_sec: 40,
            max_mbits_per_sec: 49,
            min_delay_ms: 5,
            max_delay_ms: 9,
            min_bytes_written: 1024,
        }
    }
}

/// Fault-injection configuration
///
/// Read by every operation; may be changed by the test between operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Simulated disk quota in bytes (0 = unlimited)
    pub max_size_in_bytes: u64,
    /// Probability of an injected error on the first write to a new file
    pub random_io_exception_rate: f64,
    /// Probability of an injected error on every create/open
    pub random_io_exception_rate_on_open: f64,
    /// Output throttling mode
    pub throttling: Throttling,
    /// Throttle parameters
    pub throttle: ThrottlePolicy,
    /// Refuse to delete or overwrite files that are still open
    pub no_delete_open_file: bool,
    /// Like `no_delete_open_file`, but fail with an invariant violation
    pub assert_no_delete_open_file: bool,
    /// Refuse to create a file name twice (except the generation marker)
    pub prevent_double_write: bool,
    /// Let open-time injection produce not-found errors as well
    pub allow_random_file_not_found: bool,
    /// Allow opening a file for read while an output on it is still open
    pub allow_reading_files_still_open_for_write: bool,
    /// Recompute disk usage on every output close
    pub track_disk_usage: bool,
    /// Wrap the lock factory to track held locks
    pub wrap_lock_factory: bool,
    /// Evaluate failure hooks a second time on `create_output`
    pub fail_on_create_output: bool,
    /// Evaluate failure hooks a second time on `open_input`
    pub fail_on_open_input: bool,
    /// On close, verify that replaying the directory deletes nothing unexpected
    pub assert_no_unreferenced_files_on_close: bool,
    /// On close, crash the directory and run the structural verifier
    pub check_index_on_close: bool,
    /// Chance that a `sync` really syncs when the backend does not require it
    pub sync_probability: f64,
    /// "1 in N" chance of the random-size buffering shim (0 = never)
    pub buffered_output_one_in: u32,
    /// Upper bound of the buffering shim's capacity
    pub max_buffer_size: usize,
    /// Draw range for slow inputs: 0 = slow close, 1 = slow open (0 = never)
    pub slow_input_one_in: u32,
    /// Delay of slow-open / slow-close inputs
    pub slow_handle_delay_ms: u64,
    /// "1 in N" chance a write is split around a yield (0 = never)
    pub split_write_one_in: u32,
    /// Randomly yield the thread before operations
    pub maybe_yield: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            max_size_in_bytes: 0,
            random_io_exception_rate: 0.0,
            random_io_exception_rate_on_open: 0.0,
            throttling: Throttling::Sometimes,
            throttle: ThrottlePolicy::default(),
            no_delete_open_file: true,
            assert_no_delete_open_file: false,
            prevent_double_write: true,
            allow_random_file_not_found: true,
            allow_reading_files_still_open_for_write: false,
            track_disk_usage: false,
            wrap_lock_factory: true,
            fail_on_create_output: true,
            fail_on_open_input: true,
            assert_no_unreferenced_files_on_close: true,
            check_index_on_close: true,
            sync_probability: 0.1,
            buffered_output_one_in: 10,
            max_buffer_size: 16 * 1024,
            slow_input_one_in: 500,
            slow_handle_delay_ms: 50,
            split_write_one_in: 200,
            maybe_yield: true,
        }
    }
}

impl HarnessConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration without timing perturbations
    ///
    /// No throttling, buffering shim, slow handles, split writes or yields,
    /// and syncs are never real unless the backend requires them. Fault
    /// policies keep their defaults.
    pub fn deterministic() -> Self {
        HarnessConfig {
            throttling: Throttling::Never,
            sync_probability: 0.0,
            buffered_output_one_in: 0,
            slow_input_one_in: 0,
            split_write_one_in: 0,
            maybe_yield: false,
            ..Default::default()
        }
    }

    /// Set the disk quota (builder pattern)
    pub fn with_max_size_in_bytes(mut self, bytes: u64) -> Self {
        self.max_size_in_bytes = bytes;
        self
    }

    /// Set the first-write injection rate (builder pattern)
    pub fn with_random_io_exception_rate(mut self, rate: f64) -> Self {
        self.random_io_exception_rate = rate;
        self
    }

    /// Set the open-time injection rate (builder pattern)
    pub fn with_random_io_exception_rate_on_open(mut self, rate: f64) -> Self {
        self.random_io_exception_rate_on_open = rate;
        self
    }

    /// Set the throttling mode (builder pattern)
    pub fn with_throttling(mut self, throttling: Throttling) -> Self {
        self.throttling = throttling;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (field, rate) in [
            ("random_io_exception_rate", self.random_io_exception_rate),
            (
                "random_io_exception_rate_on_open",
                self.random_io_exception_rate_on_open,
            ),
            ("sync_probability", self.sync_probability),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be within [0, 1], got {}",
                    field, rate
                )));
            }
        }
        if self.throttle.min_mbits_per_sec == 0
            || self.throttle.min_mbits_per_sec > self.throttle.max_mbits_per_sec
        {
            return Err(Error::InvalidConfig(
                "throttle bandwidth range must be non-empty and above zero".to_string(),
            ));
        }
        if self.throttle.min_delay_ms > self.throttle.max_delay_ms {
            return Err(Error::InvalidConfig(
                "throttle delay range is empty".to_string(),
            ));
        }
        if self.max_buffer_size == 0 {
            return Err(Error::InvalidConfig(
                "max_buffer_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: HarnessConfig = toml::from_str(content)
            .map_err(|e| Error::InvalidConfig(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::InvalidConfig(msg) => {
                Error::InvalidConfig(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfig(format!("failed to serialize config: {}", e)))
    }
}
