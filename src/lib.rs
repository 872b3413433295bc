//! # plctrend-rs: PLC Tag Trending Engine
//!
//! Samples tags and data file elements from programmable logic controllers
//! at a fixed interval, keeps them in a shared time-series buffer and saves
//! whole trends to disk.
//!
//! ## Architecture
//!
//! - **Backend**: [`DeviceClient`] implementations, data file discovery and
//!   the background [`Poller`](backend::Poller)
//! - **Buffer**: per-tag series with a capacity policy, written by the
//!   poller and read concurrently by the shell
//! - **Session**: [`SessionController`] state machine and the JSON/CSV
//!   serializers
//! - **Communication**: crossbeam channels between controller and poller
//!
//! ## Configuration
//!
//! Settings are read from `config.toml` in the platform config directory
//! under `dev.plctrend.plctrend-rs`; see [`config`].
//!
//! ## Example
//!
//! ```ignore
//! use plctrend_rs::{config::TrendConfig, SessionController, SimulatedDevice};
//!
//! let mut session = SessionController::new(TrendConfig::load_or_default(None));
//! session.connect(Arc::new(SimulatedDevice::slc_with_default_files()))?;
//! session.discover()?;
//! session.select_by_name(&["N7:0", "B3:0/1"])?;
//! session.start()?;
//!
//! let stream = session.stream();
//! let recent = stream.display_window("N7:0", chrono::Duration::seconds(30));
//! ```

pub mod backend;
pub mod buffer;
pub mod catalog;
pub mod config;
pub mod error;
pub mod session;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use backend::{ControllerFamily, DeviceClient, SimulatedDevice};
pub use buffer::{CapacityPolicy, SampleBuffer};
pub use catalog::TagCatalog;
pub use config::TrendConfig;
pub use error::{Result, TrendError};
pub use session::{SessionController, SessionMode, TrendDocument};
pub use stream::SampleStream;
pub use types::{Quality, Sample, Tag, TagAddress, TagDataType, Timestamp};
