//! DeviceClient trait for a unified controller interface
//!
//! The acquisition engine never speaks the wire protocol itself. It consumes
//! a [`DeviceClient`], which covers both tag-addressed controllers (Logix,
//! Micro800) and file/register-addressed controllers (SLC 500, PLC-5,
//! MicroLogix). Implementations are shared between the session controller
//! and the poller thread as a [`SharedDevice`], so every method takes `&self`
//! and implementations serialize access internally.

use crate::backend::address::FileAddress;
use crate::error::TrendError;
use crate::types::Quality;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

/// Size of the rolling window for recent cycle times
const RECENT_WINDOW_SIZE: usize = 100;

/// Failure of a single device operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The address or tag does not exist on the device
    #[error("not found: {0}")]
    NotFound(String),
    /// The transport failed (timeout, connection lost)
    #[error("unreachable: {0}")]
    Unreachable(String),
    /// The device answered but refused the request
    #[error("rejected: {0}")]
    Rejected(String),
}

impl DeviceError {
    /// Whether this failure concerns the transport rather than one address
    pub fn is_unreachable(&self) -> bool {
        matches!(self, DeviceError::Unreachable(_))
    }
}

impl From<DeviceError> for TrendError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::NotFound(what) => TrendError::AddressNotFound(what),
            DeviceError::Unreachable(msg) => TrendError::Connectivity(msg),
            DeviceError::Rejected(msg) => {
                TrendError::Connectivity(format!("request rejected: {}", msg))
            }
        }
    }
}

/// Result of a device operation
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// A value returned by the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Raw value widened to f64
    pub value: f64,
    /// Quality reported by the device
    pub quality: Quality,
}

impl Reading {
    /// A fresh value
    pub fn good(value: f64) -> Self {
        Self {
            value,
            quality: Quality::Good,
        }
    }

    /// A value the device flagged as not current
    pub fn stale(value: f64) -> Self {
        Self {
            value,
            quality: Quality::Stale,
        }
    }
}

/// Identity reported by a connected controller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Product name
    #[serde(default)]
    pub name: String,
    /// Firmware revision
    #[serde(default)]
    pub firmware_rev: String,
    /// Serial number
    #[serde(default)]
    pub serial: String,
    /// Network host the device was reached on
    #[serde(default)]
    pub host: String,
}

/// How a controller family addresses its data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    /// Symbolic tag names, with a tag list on the device
    Named,
    /// Numbered data files, no directory service
    FileRegister,
}

/// Supported controller families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ControllerFamily {
    /// ControlLogix / CompactLogix
    #[default]
    Logix,
    /// Micro800
    Micro800,
    /// SLC 500
    Slc500,
    /// PLC-5
    Plc5,
    /// MicroLogix
    MicroLogix,
}

impl ControllerFamily {
    /// All families, in menu order
    pub const ALL: [ControllerFamily; 5] = [
        ControllerFamily::Logix,
        ControllerFamily::Micro800,
        ControllerFamily::Slc500,
        ControllerFamily::Plc5,
        ControllerFamily::MicroLogix,
    ];

    /// Addressing mode of this family
    pub fn addressing(&self) -> AddressingMode {
        match self {
            ControllerFamily::Logix | ControllerFamily::Micro800 => AddressingMode::Named,
            ControllerFamily::Slc500 | ControllerFamily::Plc5 | ControllerFamily::MicroLogix => {
                AddressingMode::FileRegister
            }
        }
    }

    /// Whether tags have to be discovered by probing data files
    pub fn is_file_addressed(&self) -> bool {
        self.addressing() == AddressingMode::FileRegister
    }
}

impl std::fmt::Display for ControllerFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ControllerFamily::Logix => "ControlLogix",
            ControllerFamily::Micro800 => "Micro800",
            ControllerFamily::Slc500 => "SLC500",
            ControllerFamily::Plc5 => "PLC5",
            ControllerFamily::MicroLogix => "MicroLogix",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for ControllerFamily {
    type Err = TrendError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "logix" | "controllogix" | "compactlogix" => Ok(ControllerFamily::Logix),
            "micro800" => Ok(ControllerFamily::Micro800),
            "slc500" | "slc" => Ok(ControllerFamily::Slc500),
            "plc5" => Ok(ControllerFamily::Plc5),
            "micrologix" => Ok(ControllerFamily::MicroLogix),
            _ => Err(TrendError::InvalidConfiguration(format!(
                "unknown controller family '{}'",
                s
            ))),
        }
    }
}

/// Entry of a tag-addressed controller's tag list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    /// Full tag name, including any `Program:` scope
    pub name: String,
    /// Device type name (`DINT`, `REAL`, a UDT name, ...)
    pub type_name: String,
}

impl TagInfo {
    /// Create a tag list entry
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A single device read target
///
/// Bit tags never appear here: they are served from their word's read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReadAddress {
    /// Symbolic tag
    Named(String),
    /// Data file element or sub-element
    Element(FileAddress),
}

impl std::fmt::Display for ReadAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadAddress::Named(name) => write!(f, "{}", name),
            ReadAddress::Element(addr) => write!(f, "{}", addr),
        }
    }
}

/// Unified interface for controller connections
///
/// Implementations must be `Send + Sync`; reads may block up to the
/// connection timeout.
///
/// # Example
///
/// ```ignore
/// fn read_all(device: &dyn DeviceClient, addrs: &[ReadAddress]) -> Vec<DeviceResult<Reading>> {
///     device.read_batch(addrs)
/// }
/// ```
pub trait DeviceClient: Send + Sync {
    /// Controller family this client talks to
    fn family(&self) -> ControllerFamily;

    /// Read the device identity
    ///
    /// Fails with [`DeviceError::Unreachable`] when the device cannot be reached.
    fn identify(&self) -> DeviceResult<DeviceIdentity>;

    /// Read a symbolic tag
    fn read_tag(&self, name: &str) -> DeviceResult<Reading>;

    /// Read one data file element or sub-element
    fn read_element(&self, address: &FileAddress) -> DeviceResult<Reading>;

    /// Tag list of a tag-addressed controller
    fn list_tags(&self) -> DeviceResult<Vec<TagInfo>> {
        Err(DeviceError::Rejected(format!(
            "{} controllers have no tag list",
            self.family()
        )))
    }

    /// Read any read target
    fn read(&self, address: &ReadAddress) -> DeviceResult<Reading> {
        match address {
            ReadAddress::Named(name) => self.read_tag(name),
            ReadAddress::Element(addr) => self.read_element(addr),
        }
    }

    /// Read several targets
    ///
    /// The default implementation reads one by one and stops after the
    /// first `Unreachable`; the remaining entries report the same failure
    /// without touching the transport again.
    fn read_batch(&self, addresses: &[ReadAddress]) -> Vec<DeviceResult<Reading>> {
        let mut results = Vec::with_capacity(addresses.len());
        for address in addresses {
            let result = self.read(address);
            let lost = match &result {
                Err(DeviceError::Unreachable(msg)) => Some(msg.clone()),
                _ => None,
            };
            results.push(result);
            if let Some(msg) = lost {
                results.resize(addresses.len(), Err(DeviceError::Unreachable(msg)));
                break;
            }
        }
        results
    }

    /// Release the connection
    fn close(&self) {}
}

/// Device handle shared between the controller and the poller thread
pub type SharedDevice = Arc<dyn DeviceClient>;

/// Statistics of the poll cycles run against a device
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Cycles completed
    pub cycles: u64,
    /// Cycles in which the transport failed
    pub failed_cycles: u64,
    /// Individual device reads issued
    pub device_reads: u64,
    /// Reads saved by sharing one word read between bit tags
    pub reads_saved: u64,
    /// Individual reads that failed without a transport failure
    pub tag_errors: u64,
    /// Duration of the last cycle in microseconds
    pub last_cycle_us: u64,
    /// Minimum cycle duration (microseconds)
    pub min_cycle_us: u64,
    /// Maximum cycle duration (microseconds)
    pub max_cycle_us: u64,
    /// Ticks skipped because a cycle overran
    pub missed_ticks: u64,
    /// Rolling window of recent cycle durations
    pub recent_cycle_us: VecDeque<u64>,
}

impl Default for CycleStats {
    fn default() -> Self {
        Self {
            cycles: 0,
            failed_cycles: 0,
            device_reads: 0,
            reads_saved: 0,
            tag_errors: 0,
            last_cycle_us: 0,
            min_cycle_us: u64::MAX,
            max_cycle_us: 0,
            missed_ticks: 0,
            recent_cycle_us: VecDeque::with_capacity(RECENT_WINDOW_SIZE),
        }
    }
}

impl CycleStats {
    /// Record a finished cycle
    pub fn record_cycle(&mut self, duration_us: u64, failed: bool) {
        self.cycles += 1;
        if failed {
            self.failed_cycles += 1;
        }
        self.last_cycle_us = duration_us;
        self.min_cycle_us = self.min_cycle_us.min(duration_us);
        self.max_cycle_us = self.max_cycle_us.max(duration_us);

        self.recent_cycle_us.push_back(duration_us);
        if self.recent_cycle_us.len() > RECENT_WINDOW_SIZE {
            self.recent_cycle_us.pop_front();
        }
    }

    /// Average of the recent cycle durations in microseconds
    pub fn avg_cycle_us(&self) -> f64 {
        if self.recent_cycle_us.is_empty() {
            return 0.0;
        }
        self.recent_cycle_us.iter().sum::<u64>() as f64 / self.recent_cycle_us.len() as f64
    }

    /// Share of cycles that reached the device, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.cycles == 0 {
            100.0
        } else {
            ((self.cycles - self.failed_cycles) as f64 / self.cycles as f64) * 100.0
        }
    }

    /// Reset all statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
