//! Data file discovery for file/register-addressed controllers
//!
//! SLC 500, PLC-5 and MicroLogix controllers have no directory service. The
//! only way to find out which data files exist is to attempt typed reads and
//! interpret the answers:
//!
//! 1. Files 0-8 first try their well-known default type (O0, I1, S2, B3, T4,
//!    C5, R6, N7, F8), then the probe ordering
//! 2. Files 9-255 only try the probe ordering. Output/Input/Status are never
//!    tried there because those address spaces answer for any file number
//! 3. The first type whose element 0 reads without a "does not exist" answer
//!    determines the file type; if every type fails the file is skipped
//!
//! A transport failure at any point aborts discovery with a connectivity
//! error, as does a controller on which none of the default files answer.
//!
//! Results are cached per device identity (host + serial).

use super::address::{FileAddress, FileType, LAST_DEFAULT_FILE, PROBE_ORDER};
use super::device::{DeviceClient, DeviceError};
use crate::error::{Result, TrendError};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Upper bound of the element count probe
pub const MAX_PROBED_ELEMENTS: u16 = 256;

/// One inferred memory region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
    /// File number 0-255
    pub file_number: u8,
    /// Inferred type
    pub file_type: FileType,
    /// Best-effort element count, `None` when the probe could not conclude
    #[serde(default)]
    pub element_count: Option<u16>,
    /// Whether the file answered
    pub exists: bool,
}

impl DataFile {
    /// Address prefix of this file (`N7`, `ST10`, ...)
    pub fn label(&self) -> String {
        format!("{}{}", self.file_type.prefix(), self.file_number)
    }
}

impl std::fmt::Display for DataFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.element_count {
            Some(n) => write!(f, "{} ({}, {} elements)", self.label(), self.file_type, n),
            None => write!(f, "{} ({}, unknown size)", self.label(), self.file_type),
        }
    }
}

/// Discovery settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Highest file number to probe
    pub max_file_number: u8,
    /// Whether to probe element counts
    pub probe_element_counts: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            max_file_number: u8::MAX,
            probe_element_counts: true,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedDiscovery {
    host: String,
    serial: String,
    files: Vec<DataFile>,
}

/// Probes a controller's data files and caches the result per identity
#[derive(Debug, Default)]
pub struct DiscoveryEngine {
    options: DiscoveryOptions,
    cache: Option<CachedDiscovery>,
}

impl DiscoveryEngine {
    /// Create an engine with the given options
    pub fn new(options: DiscoveryOptions) -> Self {
        Self {
            options,
            cache: None,
        }
    }

    /// Active options
    pub fn options(&self) -> DiscoveryOptions {
        self.options
    }

    /// Discover the data files of a device
    ///
    /// Returns the cached result when the device reports the same host and
    /// serial as the last discovery; a different identity re-probes.
    pub fn discover(&mut self, device: &dyn DeviceClient) -> Result<Vec<DataFile>> {
        let identity = device
            .identify()
            .map_err(|e| TrendError::Connectivity(format!("identify failed: {}", e)))?;

        if let Some(cached) = &self.cache {
            if cached.host == identity.host && cached.serial == identity.serial {
                tracing::debug!(
                    "Using cached discovery for {} ({})",
                    identity.host,
                    identity.serial
                );
                return Ok(cached.files.clone());
            }
            tracing::info!("Device identity changed; discarding cached data files");
            self.cache = None;
        }

        let files = self.probe_files(device)?;
        self.cache = Some(CachedDiscovery {
            host: identity.host,
            serial: identity.serial,
            files: files.clone(),
        });
        Ok(files)
    }

    /// Probe every file number without consulting the cache
    pub fn probe_files(&self, device: &dyn DeviceClient) -> Result<Vec<DataFile>> {
        let started = Instant::now();
        let mut files = Vec::new();

        for file_number in 0..=self.options.max_file_number {
            if let Some(file_type) = self.probe_file(device, file_number)? {
                let element_count = if self.options.probe_element_counts {
                    self.count_elements(device, file_type, file_number)?
                } else {
                    None
                };
                tracing::debug!(
                    "Found {}{} ({:?} elements)",
                    file_type.prefix(),
                    file_number,
                    element_count
                );
                files.push(DataFile {
                    file_number,
                    file_type,
                    element_count,
                    exists: true,
                });
            }

            if file_number == LAST_DEFAULT_FILE && files.is_empty() {
                return Err(TrendError::Connectivity(
                    "none of the default data files answered; check the controller family"
                        .to_string(),
                ));
            }
        }

        if files.is_empty() {
            return Err(TrendError::Connectivity(
                "none of the default data files answered; check the controller family".to_string(),
            ));
        }

        tracing::info!(
            "Discovered {} data files in {:?}",
            files.len(),
            started.elapsed()
        );
        Ok(files)
    }

    /// Determine the type of one file, `None` if it does not exist
    fn probe_file(&self, device: &dyn DeviceClient, file_number: u8) -> Result<Option<FileType>> {
        let default = FileType::default_for_file(file_number);
        let candidates = default
            .into_iter()
            .chain(PROBE_ORDER.into_iter().filter(move |t| Some(*t) != default));

        for file_type in candidates {
            let address = FileAddress::new(file_type, file_number, 0);
            match device.read_element(&address) {
                Ok(_) => return Ok(Some(file_type)),
                Err(DeviceError::NotFound(_)) => {}
                Err(DeviceError::Rejected(msg)) => {
                    tracing::debug!("Probe of {} rejected: {}", address, msg);
                }
                Err(DeviceError::Unreachable(msg)) => {
                    return Err(TrendError::Connectivity(format!(
                        "lost connection while probing {}: {}",
                        address, msg
                    )))
                }
            }
        }
        Ok(None)
    }

    /// Exponential then binary search for the number of elements
    ///
    /// Element 0 is known to exist. Gives up (returns `None`) when the
    /// device answers with anything other than a value or "does not exist".
    fn count_elements(
        &self,
        device: &dyn DeviceClient,
        file_type: FileType,
        file_number: u8,
    ) -> Result<Option<u16>> {
        let exists = |element: u16| -> Result<Option<bool>> {
            let address = FileAddress::new(file_type, file_number, element);
            match device.read_element(&address) {
                Ok(_) => Ok(Some(true)),
                Err(DeviceError::NotFound(_)) => Ok(Some(false)),
                Err(DeviceError::Rejected(_)) => Ok(None),
                Err(DeviceError::Unreachable(msg)) => Err(TrendError::Connectivity(format!(
                    "lost connection while sizing {}: {}",
                    address, msg
                ))),
            }
        };

        let last = MAX_PROBED_ELEMENTS - 1;
        let mut found = 0u16;
        let mut missing = None;
        let mut probe = 1u16;
        while probe < last {
            match exists(probe)? {
                Some(true) => {
                    found = probe;
                    probe *= 2;
                }
                Some(false) => {
                    missing = Some(probe);
                    break;
                }
                None => return Ok(None),
            }
        }

        let mut missing = match missing {
            Some(m) => m,
            None => match exists(last)? {
                Some(true) => return Ok(Some(MAX_PROBED_ELEMENTS)),
                Some(false) => last,
                None => return Ok(None),
            },
        };

        while missing - found > 1 {
            let mid = found + (missing - found) / 2;
            match exists(mid)? {
                Some(true) => found = mid,
                Some(false) => missing = mid,
                None => return Ok(None),
            }
        }
        Ok(Some(found + 1))
    }

    /// Cached data files, if a discovery has completed
    pub fn cached(&self) -> Option<&[DataFile]> {
        self.cache.as_ref().map(|c| c.files.as_slice())
    }

    /// Drop the cached result
    pub fn invalidate(&mut self) {
        if self.cache.take().is_some() {
            tracing::debug!("Discovery cache cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::device::{ControllerFamily, DeviceIdentity, DeviceResult, Reading};
    use crate::backend::mock_device::SimulatedDevice;

    fn engine() -> DiscoveryEngine {
        DiscoveryEngine::new(DiscoveryOptions::default())
    }

    #[test]
    fn test_discovers_configured_files() {
        let device = SimulatedDevice::new(ControllerFamily::Slc500)
            .with_data_file(0, FileType::Output, 2)
            .with_data_file(1, FileType::Input, 2)
            .with_data_file(7, FileType::Integer, 10)
            .with_data_file(40, FileType::Float, 5);

        let files = engine().discover(&device).unwrap();
        let found: Vec<_> = files.iter().map(|f| (f.file_number, f.file_type)).collect();
        assert_eq!(
            found,
            vec![
                (0, FileType::Output),
                (1, FileType::Input),
                (7, FileType::Integer),
                (40, FileType::Float),
            ]
        );
        assert_eq!(files[2].element_count, Some(10));
        assert_eq!(files[3].element_count, Some(5));
    }

    #[test]
    fn test_non_default_type_in_default_slot() {
        let device = SimulatedDevice::new(ControllerFamily::MicroLogix)
            .with_data_file(7, FileType::Integer, 1)
            .with_data_file(8, FileType::Long, 3);
        let files = engine().discover(&device).unwrap();
        let f8 = files.iter().find(|f| f.file_number == 8).unwrap();
        assert_eq!(f8.file_type, FileType::Long);
        assert_eq!(f8.element_count, Some(3));
    }

    #[test]
    fn test_element_count_boundaries() {
        for count in [1u16, 2, 3, 64, 65, 200, 255, 256, 300] {
            let device = SimulatedDevice::new(ControllerFamily::Slc500)
                .with_data_file(7, FileType::Integer, count);
            let options = DiscoveryOptions {
                max_file_number: 8,
                probe_element_counts: true,
            };
            let files = DiscoveryEngine::new(options).discover(&device).unwrap();
            let expected = count.min(MAX_PROBED_ELEMENTS);
            let n7 = files.iter().find(|f| f.file_number == 7).unwrap();
            assert_eq!(n7.element_count, Some(expected), "count {}", count);
        }
    }

    #[test]
    fn test_no_default_file_is_connectivity_error() {
        let device = SimulatedDevice::new(ControllerFamily::Slc500).with_data_file(
            20,
            FileType::Integer,
            1,
        );
        // I/O answers for any file number, so use a device that lacks them too
        let err = DiscoveryEngine::new(DiscoveryOptions {
            max_file_number: 30,
            probe_element_counts: false,
        })
        .probe_files(&NoImageDevice(device))
        .unwrap_err();
        assert!(err.is_connectivity());
    }

    #[test]
    fn test_unreachable_aborts() {
        let device = SimulatedDevice::slc_with_default_files();
        device.set_unreachable(true);
        assert!(engine().discover(&device).unwrap_err().is_connectivity());
    }

    #[test]
    fn test_cache_by_identity() {
        let device = SimulatedDevice::slc_with_default_files();
        let mut engine = DiscoveryEngine::new(DiscoveryOptions {
            max_file_number: 20,
            probe_element_counts: false,
        });

        let first = engine.discover(&device).unwrap();
        let reads = device.total_reads();
        let second = engine.discover(&device).unwrap();
        assert_eq!(first, second);
        assert_eq!(device.total_reads(), reads);

        let other = SimulatedDevice::slc_with_default_files()
            .with_serial("SIM00002")
            .with_data_file(12, FileType::Float, 1);
        let third = engine.discover(&other).unwrap();
        assert!(third.iter().any(|f| f.file_number == 12));
        assert!(other.total_reads() > 0);

        engine.invalidate();
        assert!(engine.cached().is_none());
    }

    /// Wraps a simulated device so image-space reads fail like a missing file
    struct NoImageDevice(SimulatedDevice);

    impl DeviceClient for NoImageDevice {
        fn family(&self) -> ControllerFamily {
            self.0.family()
        }

        fn identify(&self) -> DeviceResult<DeviceIdentity> {
            self.0.identify()
        }

        fn read_tag(&self, name: &str) -> DeviceResult<Reading> {
            self.0.read_tag(name)
        }

        fn read_element(&self, address: &FileAddress) -> DeviceResult<Reading> {
            if address.file_type.is_image_space() {
                return Err(DeviceError::NotFound(address.to_string()));
            }
            self.0.read_element(address)
        }
    }
}
