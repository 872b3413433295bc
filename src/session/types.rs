//! Session data types

use super::document::DocumentMetadata;
use std::path::PathBuf;

/// Mode of the acquisition session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// No device, no data
    #[default]
    Idle,
    /// Device connected, not trending
    Connected,
    /// Trending, display follows live data
    Live,
    /// Trending, display frozen
    Paused,
    /// Trend stopped, data kept
    Stopped,
    /// Read-only view of an imported document
    Historical,
}

impl SessionMode {
    /// Check if the poller is running
    pub fn is_acquiring(&self) -> bool {
        matches!(self, SessionMode::Live | SessionMode::Paused)
    }

    /// Check if a device connection is held
    pub fn has_device(&self) -> bool {
        matches!(
            self,
            SessionMode::Connected | SessionMode::Live | SessionMode::Paused | SessionMode::Stopped
        )
    }

    /// Check if the session shows imported data
    pub fn is_historical(&self) -> bool {
        matches!(self, SessionMode::Historical)
    }

    /// Check if a document may be imported
    pub fn can_import(&self) -> bool {
        matches!(
            self,
            SessionMode::Idle | SessionMode::Connected | SessionMode::Historical
        )
    }

    /// Display name for the mode
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionMode::Idle => "Idle",
            SessionMode::Connected => "Connected",
            SessionMode::Live => "Live",
            SessionMode::Paused => "Paused",
            SessionMode::Stopped => "Stopped",
            SessionMode::Historical => "Historical",
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// An imported, read-only session
#[derive(Debug, Clone)]
pub struct HistoricalSession {
    /// Metadata of the imported document
    pub metadata: DocumentMetadata,
    /// File the document was read from
    pub source: Option<PathBuf>,
}
