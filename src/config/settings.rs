//! Configuration sections
//!
//! Each section maps to a TOML table of the config file. Every field has a
//! default, so a partial file (or an empty one) is valid.

use crate::backend::{
    ControllerFamily, DiscoveryOptions, PollerConfig, DEFAULT_MAX_CONSECUTIVE_FAILURES,
};
use crate::buffer::CapacityPolicy;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default controller address
pub const DEFAULT_HOST: &str = "192.168.1.10";

/// Default transport timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Point limit offered as the "bounded" capacity preset
pub const DEFAULT_MAX_POINTS: usize = 100_000;

/// Capacity presets, smallest last
pub const CAPACITY_PRESETS: [CapacityPolicy; 4] = [
    CapacityPolicy::Unlimited,
    CapacityPolicy::MaxPoints(DEFAULT_MAX_POINTS),
    CapacityPolicy::MaxPoints(50_000),
    CapacityPolicy::MaxPoints(10_000),
];

/// Poll interval presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRate {
    Ms100,
    Ms250,
    Ms500,
    S1,
    S2,
    S5,
    S10,
    S30,
    S60,
}

impl SampleRate {
    pub const ALL: [SampleRate; 9] = [
        SampleRate::Ms100,
        SampleRate::Ms250,
        SampleRate::Ms500,
        SampleRate::S1,
        SampleRate::S2,
        SampleRate::S5,
        SampleRate::S10,
        SampleRate::S30,
        SampleRate::S60,
    ];

    /// Interval in milliseconds
    pub fn as_millis(&self) -> u64 {
        match self {
            SampleRate::Ms100 => 100,
            SampleRate::Ms250 => 250,
            SampleRate::Ms500 => 500,
            SampleRate::S1 => 1_000,
            SampleRate::S2 => 2_000,
            SampleRate::S5 => 5_000,
            SampleRate::S10 => 10_000,
            SampleRate::S30 => 30_000,
            SampleRate::S60 => 60_000,
        }
    }

    /// Find the preset for an interval
    pub fn from_millis(ms: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_millis() == ms)
    }

    /// Label for pickers
    pub fn label(&self) -> &'static str {
        match self {
            SampleRate::Ms100 => "100 ms",
            SampleRate::Ms250 => "250 ms",
            SampleRate::Ms500 => "500 ms",
            SampleRate::S1 => "1 s",
            SampleRate::S2 => "2 s",
            SampleRate::S5 => "5 s",
            SampleRate::S10 => "10 s",
            SampleRate::S30 => "30 s",
            SampleRate::S60 => "60 s",
        }
    }
}

impl std::fmt::Display for SampleRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Where and how to reach the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_host")]
    pub host: String,
    /// Backplane slot of the CPU
    #[serde(default)]
    pub slot: u8,
    #[serde(default)]
    pub family: ControllerFamily,
    /// Transport timeout, enforced by the device client
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            slot: 0,
            family: ControllerFamily::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl ConnectionSettings {
    /// Transport timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Poller and buffer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    /// Poll interval (100 ms - 60 s)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub capacity: CapacityPolicy,
    /// Failed cycles in a row before the trend stops itself (0 = never)
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,
}

fn default_interval_ms() -> u64 {
    SampleRate::S1.as_millis()
}

fn default_max_failures() -> u32 {
    DEFAULT_MAX_CONSECUTIVE_FAILURES
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            capacity: CapacityPolicy::default(),
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

impl AcquisitionSettings {
    /// Build the poller configuration, validating the interval
    pub fn poller_config(&self) -> Result<PollerConfig> {
        Ok(PollerConfig::with_interval_ms(self.interval_ms)?
            .with_max_consecutive_failures(self.max_consecutive_failures))
    }

    /// Matching interval preset, if any
    pub fn sample_rate(&self) -> Option<SampleRate> {
        SampleRate::from_millis(self.interval_ms)
    }
}

/// File discovery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Highest file number probed
    #[serde(default = "default_max_file_number")]
    pub max_file_number: u8,
    /// Probe element counts of found files
    #[serde(default = "default_true")]
    pub probe_element_counts: bool,
}

fn default_max_file_number() -> u8 {
    u8::MAX
}

fn default_true() -> bool {
    true
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            max_file_number: u8::MAX,
            probe_element_counts: true,
        }
    }
}

impl DiscoverySettings {
    pub fn options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            max_file_number: self.max_file_number,
            probe_element_counts: self.probe_element_counts,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Directory for daily log files (console only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Filter directive overriding the default (`RUST_LOG` still wins)
    #[serde(default)]
    pub filter: Option<String>,
}
