//! Simulated controller for testing and demos
//!
//! This module provides a [`SimulatedDevice`] that implements
//! [`DeviceClient`] without any network transport. It behaves like either
//! controller family:
//!
//! - **Tag-addressed**: serves a configured tag list and answers reads of
//!   those tags
//! - **File-addressed**: serves configured data files and answers typed
//!   element reads the way a real controller does, including answering
//!   Output/Input reads for *any* file number
//!
//! # Signal Patterns
//!
//! - [`SignalPattern::Constant`] - Fixed value
//! - [`SignalPattern::Sine`] - Sinusoidal wave
//! - [`SignalPattern::Counter`] - Incrementing counter with wrap-around
//! - [`SignalPattern::Square`] - Square wave alternating between two values
//! - [`SignalPattern::Sawtooth`] - Linear ramp that resets periodically
//!
//! # Failure Injection
//!
//! Reads of one address can be made to fail always or on a given read
//! number, and the whole device can be made unreachable at runtime.
//!
//! # Example
//!
//! ```ignore
//! use plctrend_rs::backend::{SimulatedDevice, ControllerFamily, FileType};
//!
//! let device = SimulatedDevice::new(ControllerFamily::Slc500)
//!     .with_data_file(7, FileType::Integer, 10)
//!     .with_data_file(40, FileType::Float, 4);
//! device.fail_on_read("N7:1", 3);
//! ```

use super::address::{FileAddress, FileType};
use super::device::{
    ControllerFamily, DeviceClient, DeviceError, DeviceIdentity, DeviceResult, Reading, TagInfo,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Pattern for generating simulated values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignalPattern {
    /// Constant value
    Constant(f64),
    /// Sine wave with frequency (Hz) and amplitude
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Counter that increments once per read
    Counter { step: f64, min: f64, max: f64 },
    /// Square wave
    Square { period: f64, amplitude: f64 },
    /// Sawtooth wave
    Sawtooth { period: f64, amplitude: f64 },
}

impl Default for SignalPattern {
    fn default() -> Self {
        SignalPattern::Sine {
            frequency: 0.1,
            amplitude: 100.0,
            offset: 0.0,
        }
    }
}

/// Signal attached to one address
#[derive(Debug, Clone)]
struct Signal {
    pattern: SignalPattern,
    counter_value: f64,
}

impl Signal {
    fn new(pattern: SignalPattern) -> Self {
        let counter_value = match pattern {
            SignalPattern::Counter { min, step, .. } => min - step,
            _ => 0.0,
        };
        Self {
            pattern,
            counter_value,
        }
    }

    fn generate_value(&mut self, elapsed_secs: f64) -> f64 {
        match self.pattern {
            SignalPattern::Constant(v) => v,
            SignalPattern::Sine {
                frequency,
                amplitude,
                offset,
            } => offset + amplitude * (2.0 * std::f64::consts::PI * frequency * elapsed_secs).sin(),
            SignalPattern::Counter { step, min, max } => {
                self.counter_value += step;
                if self.counter_value > max {
                    self.counter_value = min;
                } else if self.counter_value < min {
                    self.counter_value = max;
                }
                self.counter_value
            }
            SignalPattern::Square { period, amplitude } => {
                if elapsed_secs % period < period / 2.0 {
                    amplitude
                } else {
                    -amplitude
                }
            }
            SignalPattern::Sawtooth { period, amplitude } => {
                amplitude * ((elapsed_secs % period) / period)
            }
        }
    }
}

/// Injected failure for one address
#[derive(Debug, Clone, PartialEq, Eq)]
enum Failure {
    /// Every read fails
    Always,
    /// Only the given (1-based) reads fail
    OnReads(HashSet<u64>),
}

/// A data file present on the simulated controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedFile {
    /// Type of the file
    pub file_type: FileType,
    /// Number of elements
    pub elements: u16,
}

#[derive(Debug, Default)]
struct SimState {
    signals: HashMap<String, Signal>,
    values: HashMap<String, f64>,
    failures: HashMap<String, Failure>,
    read_counts: HashMap<String, u64>,
}

/// Simulated controller for tests and the command line demo
#[derive(Debug)]
pub struct SimulatedDevice {
    family: ControllerFamily,
    identity: DeviceIdentity,
    files: BTreeMap<u8, SimulatedFile>,
    tags: Vec<TagInfo>,
    default_pattern: SignalPattern,
    read_delay: Duration,
    start_time: Instant,
    unreachable: AtomicBool,
    total_reads: AtomicU64,
    state: Mutex<SimState>,
}

impl SimulatedDevice {
    /// Create a simulated controller of the given family
    pub fn new(family: ControllerFamily) -> Self {
        Self {
            family,
            identity: DeviceIdentity {
                name: format!("Simulated {}", family),
                firmware_rev: "1.0".to_string(),
                serial: "SIM00001".to_string(),
                host: "127.0.0.1".to_string(),
            },
            files: BTreeMap::new(),
            tags: Vec::new(),
            default_pattern: SignalPattern::default(),
            read_delay: Duration::ZERO,
            start_time: Instant::now(),
            unreachable: AtomicBool::new(false),
            total_reads: AtomicU64::new(0),
            state: Mutex::new(SimState::default()),
        }
    }

    /// File-addressed controller with the usual default files
    ///
    /// O0, I1, S2, B3, T4, C5, R6, N7 and F8, each with a few elements.
    pub fn slc_with_default_files() -> Self {
        Self::with_default_files(ControllerFamily::Slc500)
    }

    /// File-addressed controller of any family with the usual default files
    pub fn with_default_files(family: ControllerFamily) -> Self {
        let mut device = Self::new(family);
        for file_number in 0..=8 {
            if let Some(file_type) = FileType::default_for_file(file_number) {
                let elements = match file_type {
                    FileType::Output | FileType::Input => 2,
                    FileType::Status => 16,
                    _ => 10,
                };
                device = device.with_data_file(file_number, file_type, elements);
            }
        }
        device
    }

    /// Set the reported identity
    pub fn with_identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Set the reported serial number
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.identity.serial = serial.into();
        self
    }

    /// Add a data file
    pub fn with_data_file(mut self, file_number: u8, file_type: FileType, elements: u16) -> Self {
        self.files.insert(
            file_number,
            SimulatedFile {
                file_type,
                elements,
            },
        );
        self
    }

    /// Add a tag to the tag list
    pub fn with_tag(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.tags.push(TagInfo::new(name, type_name));
        self
    }

    /// Attach a signal pattern to an address or tag name
    pub fn with_pattern(self, address: impl Into<String>, pattern: SignalPattern) -> Self {
        self.set_pattern(address, pattern);
        self
    }

    /// Set the pattern for addresses without their own signal
    pub fn with_default_pattern(mut self, pattern: SignalPattern) -> Self {
        self.default_pattern = pattern;
        self
    }

    /// Set the simulated read latency
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Attach a signal pattern at runtime
    pub fn set_pattern(&self, address: impl Into<String>, pattern: SignalPattern) {
        self.state
            .lock()
            .signals
            .insert(address.into(), Signal::new(pattern));
    }

    /// Set a fixed value for an address or tag name
    pub fn set_value(&self, address: impl Into<String>, value: f64) {
        let address = address.into();
        let mut state = self.state.lock();
        state.signals.remove(&address);
        state.values.insert(address, value);
    }

    /// Make every read of an address fail
    pub fn fail_always(&self, address: impl Into<String>) {
        self.state.lock().failures.insert(address.into(), Failure::Always);
    }

    /// Make the n-th read (1-based) of an address fail
    pub fn fail_on_read(&self, address: impl Into<String>, read_number: u64) {
        let mut state = self.state.lock();
        let entry = state
            .failures
            .entry(address.into())
            .or_insert_with(|| Failure::OnReads(HashSet::new()));
        if let Failure::OnReads(reads) = entry {
            reads.insert(read_number);
        }
    }

    /// Remove injected failures for an address
    pub fn clear_failures(&self, address: &str) {
        self.state.lock().failures.remove(address);
    }

    /// Simulate losing (or regaining) the network connection
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
        tracing::debug!("Simulated device unreachable={}", unreachable);
    }

    /// Number of reads issued for one address or tag name
    pub fn read_count(&self, address: &str) -> u64 {
        self.state.lock().read_counts.get(address).copied().unwrap_or(0)
    }

    /// Number of reads issued in total, including failed ones
    pub fn total_reads(&self) -> u64 {
        self.total_reads.load(Ordering::SeqCst)
    }

    /// Configured data files
    pub fn data_files(&self) -> &BTreeMap<u8, SimulatedFile> {
        &self.files
    }

    fn check_reachable(&self) -> DeviceResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(DeviceError::Unreachable(format!(
                "no response from {}",
                self.identity.host
            )))
        } else {
            Ok(())
        }
    }

    /// Count the read, apply injected failures and produce a raw value
    fn serve(&self, key: &str, seed: f64) -> DeviceResult<f64> {
        let mut state = self.state.lock();
        let count = state.read_counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        let read_number = *count;

        match state.failures.get(key) {
            Some(Failure::Always) => {
                return Err(DeviceError::Rejected(format!("read of {} failed", key)))
            }
            Some(Failure::OnReads(reads)) if reads.contains(&read_number) => {
                return Err(DeviceError::Rejected(format!(
                    "read {} of {} failed",
                    read_number, key
                )))
            }
            _ => {}
        }

        if let Some(value) = state.values.get(key) {
            return Ok(*value);
        }
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if let Some(signal) = state.signals.get_mut(key) {
            return Ok(signal.generate_value(elapsed));
        }

        // Offset the default pattern per address so traces differ
        let mut signal = Signal::new(self.default_pattern);
        Ok(signal.generate_value(elapsed + seed) + seed)
    }

    fn begin_read(&self) -> DeviceResult<()> {
        self.total_reads.fetch_add(1, Ordering::SeqCst);
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        self.check_reachable()
    }
}

fn seed_for(file_number: u8, element: u16) -> f64 {
    f64::from(file_number) + f64::from(element) * 0.1
}

impl DeviceClient for SimulatedDevice {
    fn family(&self) -> ControllerFamily {
        self.family
    }

    fn identify(&self) -> DeviceResult<DeviceIdentity> {
        self.check_reachable()?;
        Ok(self.identity.clone())
    }

    fn read_tag(&self, name: &str) -> DeviceResult<Reading> {
        self.begin_read()?;
        if self.family.is_file_addressed() {
            return Err(DeviceError::Rejected(format!(
                "{} controllers do not accept symbolic reads",
                self.family
            )));
        }
        let index = self
            .tags
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| DeviceError::NotFound(name.to_string()))?;
        let value = self.serve(name, index as f64)?;
        match self.tags[index].type_name.as_str() {
            "REAL" | "LREAL" => Ok(Reading::good(value)),
            "BOOL" => Ok(Reading::good(if value > 0.0 { 1.0 } else { 0.0 })),
            _ => Ok(Reading::good(value.round())),
        }
    }

    fn read_element(&self, address: &FileAddress) -> DeviceResult<Reading> {
        self.begin_read()?;
        if !self.family.is_file_addressed() {
            return Err(DeviceError::Rejected(format!(
                "{} controllers do not accept data file reads",
                self.family
            )));
        }

        let key = address.to_string();
        let not_found = || DeviceError::NotFound(key.clone());

        // Image spaces answer for any file number
        let io_space = matches!(address.file_type, FileType::Output | FileType::Input);
        let file = self.files.get(&address.file_number).copied();
        match file {
            Some(file) if file.file_type == address.file_type => {
                if address.element >= file.elements {
                    return Err(not_found());
                }
            }
            _ if io_space => {
                if address.element > 0 {
                    return Err(not_found());
                }
            }
            _ => return Err(not_found()),
        }

        if let Some(sub) = address.sub {
            if !address.file_type.sub_elements().contains(&sub) {
                return Err(DeviceError::Rejected(format!("{} has no such member", key)));
            }
        }

        let value = self.serve(&key, seed_for(address.file_number, address.element))?;
        let value = match (address.file_type, address.sub) {
            (_, Some(sub)) if sub.is_bit() => {
                if value > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            (FileType::Float, None) => value as f32 as f64,
            (FileType::String | FileType::Ascii, None) => 0.0,
            (FileType::Long, _) => value.round().clamp(i32::MIN as f64, i32::MAX as f64),
            _ => value.round().clamp(i16::MIN as f64, i16::MAX as f64),
        };
        Ok(Reading::good(value))
    }

    fn list_tags(&self) -> DeviceResult<Vec<TagInfo>> {
        self.check_reachable()?;
        if self.family.is_file_addressed() {
            return Err(DeviceError::Rejected(format!(
                "{} controllers have no tag list",
                self.family
            )));
        }
        Ok(self.tags.clone())
    }

    fn close(&self) {
        tracing::info!("Simulated device {} closed", self.identity.host);
    }
}
