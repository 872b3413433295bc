//! Shell-facing read handle over the sample buffer
//!
//! The shell never talks to the device. It pulls snapshots from a
//! [`SampleStream`], which couples the shared [`SampleBuffer`] with the
//! [`DisplayGate`] that implements pause: acquisition keeps running while
//! paused, only the display freezes at the moment of the pause.

use crate::buffer::{SampleBuffer, StorageInfo};
use crate::types::{Sample, SeriesStats, Timestamp};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Pause flag at the shell boundary
#[derive(Debug, Default)]
pub struct DisplayGate {
    paused: AtomicBool,
    paused_at: Mutex<Option<Timestamp>>,
}

impl DisplayGate {
    /// Create an open gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze the display at the current time
    pub fn pause(&self) {
        let mut paused_at = self.paused_at.lock();
        if !self.paused.swap(true, Ordering::SeqCst) {
            *paused_at = Some(Utc::now());
        }
    }

    /// Follow live data again
    pub fn resume(&self) {
        let mut paused_at = self.paused_at.lock();
        self.paused.store(false, Ordering::SeqCst);
        *paused_at = None;
    }

    /// Whether the display is frozen
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// When the display was frozen
    pub fn paused_at(&self) -> Option<Timestamp> {
        *self.paused_at.lock()
    }
}

/// Pull-based access to acquired samples
#[derive(Debug, Clone)]
pub struct SampleStream {
    buffer: Arc<SampleBuffer>,
    gate: Arc<DisplayGate>,
}

impl SampleStream {
    /// Create a stream over a buffer
    pub fn new(buffer: Arc<SampleBuffer>, gate: Arc<DisplayGate>) -> Self {
        Self { buffer, gate }
    }

    /// Whether the display is frozen
    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    /// When the display was frozen
    pub fn paused_at(&self) -> Option<Timestamp> {
        self.gate.paused_at()
    }

    /// Most recent sample of a tag
    pub fn latest(&self, tag: &str) -> Option<Sample> {
        self.buffer.latest(tag)
    }

    /// Samples of a tag with `from <= timestamp <= to`
    pub fn window_since(&self, tag: &str, from: Timestamp, to: Timestamp) -> Vec<Sample> {
        self.buffer.window_since(tag, from, to)
    }

    /// The last `span` of a tag as the display should show it
    ///
    /// Ends at the pause instant while paused, otherwise at the newest sample.
    pub fn display_window(&self, tag: &str, span: chrono::Duration) -> Vec<Sample> {
        let end = match self.gate.paused_at() {
            Some(at) => at,
            None => match self.buffer.latest(tag) {
                Some(sample) => sample.timestamp,
                None => return Vec::new(),
            },
        };
        self.buffer.window_since(tag, end - span, end)
    }

    /// Number of samples held for a tag
    pub fn len(&self, tag: &str) -> usize {
        self.buffer.len(tag)
    }

    /// Running statistics of a tag
    pub fn stats(&self, tag: &str) -> Option<SeriesStats> {
        self.buffer.stats(tag)
    }

    /// Storage figures
    pub fn storage_info(&self) -> StorageInfo {
        self.buffer.storage_info()
    }
}
