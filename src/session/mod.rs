//! Trend sessions
//!
//! This module ties the backend together into one user-facing session and
//! handles persistence:
//!
//! - [`SessionController`] - lifecycle state machine over device, poller and buffer
//! - [`TrendDocument`] - JSON export/import, including the legacy `.pytrend` layout
//! - [`tabular`] - lossy CSV export

pub mod controller;
pub mod document;
pub mod tabular;
pub mod types;

pub use controller::{SessionController, SessionEvent};
pub use document::{DocumentMetadata, SeriesRecord, TrendDocument, DOCUMENT_VERSION};
pub use tabular::{save_csv, write_csv};
pub use types::{HistoricalSession, SessionMode};
