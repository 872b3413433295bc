//! Device access and acquisition
//!
//! Everything that talks to a controller lives here. The rest of the crate
//! only sees the [`DeviceClient`] trait and the samples the poller writes
//! into the buffer.
//!
//! # Components
//!
//! - [`DeviceClient`] - transport-agnostic controller interface
//! - [`SimulatedDevice`] - in-process controller for tests and demos
//! - [`address`] - data file addresses (`N7:0`, `B3:1/4`, `T4:0.ACC`)
//! - [`DiscoveryEngine`] - probes which data files a file-addressed controller has
//! - [`ReadPlan`] - collapses a selection into the fewest device reads
//! - [`Poller`] - background thread that samples the selection every interval
//!
//! # Example
//!
//! ```ignore
//! use plctrend_rs::backend::{Poller, PollerConfig, SimulatedDevice};
//! use plctrend_rs::buffer::SampleBuffer;
//! use plctrend_rs::stream::DisplayGate;
//!
//! let device = Arc::new(SimulatedDevice::slc_with_default_files());
//! let buffer = Arc::new(SampleBuffer::new());
//! let tags = vec![Tag::parse_file_tag("N7:0")?];
//!
//! let poller = Poller::start(device, buffer.clone(), Arc::new(DisplayGate::new()),
//!     tags, PollerConfig::with_interval_ms(500)?)?;
//! ```

pub mod address;
pub mod device;
pub mod discovery;
pub mod mock_device;
pub mod poller;
pub mod read_plan;

pub use address::{parse_tag_address, FileAddress, FileType, SubElement};
pub use device::{
    AddressingMode, ControllerFamily, CycleStats, DeviceClient, DeviceError, DeviceIdentity,
    DeviceResult, ReadAddress, Reading, SharedDevice, TagInfo,
};
pub use discovery::{DataFile, DiscoveryEngine, DiscoveryOptions, MAX_PROBED_ELEMENTS};
pub use mock_device::{SignalPattern, SimulatedDevice};
pub use poller::{
    next_tick, validate_interval, CycleOutcome, PollWorker, Poller, PollerCommand, PollerConfig,
    PollerEvent, DEFAULT_MAX_CONSECUTIVE_FAILURES, MAX_INTERVAL_MS, MIN_INTERVAL_MS,
};
pub use read_plan::{PlannedRead, ReadPlan};
