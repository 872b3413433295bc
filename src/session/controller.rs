//! Session controller
//!
//! Owns the device connection, the tag selection, the sample buffer and the
//! poller thread, and enforces the session lifecycle:
//!
//! ```text
//! Idle -> Connected -> Live <-> Paused
//!                        \      /
//!                         Stopped -> Live (fresh run)
//! Idle | Connected | Historical -- import --> Historical
//! any -- reset --> Idle
//! ```
//!
//! Operations that are not valid in the current mode fail with
//! [`TrendError::InvalidTransition`] and leave the session untouched.

use super::document::{DocumentMetadata, TrendDocument};
use super::tabular;
use super::types::{HistoricalSession, SessionMode};
use crate::backend::{
    validate_interval, ControllerFamily, CycleStats, DeviceIdentity, DiscoveryEngine, Poller,
    PollerEvent, SharedDevice,
};
use crate::buffer::{CapacityPolicy, SampleBuffer, StorageInfo};
use crate::catalog::TagCatalog;
use crate::config::TrendConfig;
use crate::error::{Result, TrendError};
use crate::stream::{DisplayGate, SampleStream};
use crate::types::{validate_selection, Sample, Tag, Timestamp};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Events reported to the shell by [`SessionController::poll_events`]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Forwarded from the poller
    Poller(PollerEvent),
    /// The trend stopped itself after too many failed cycles
    AutoStopped { consecutive_failures: u32 },
    /// The last tag was removed, so the trend stopped
    SelectionEmptied,
}

/// Drives one acquisition session
pub struct SessionController {
    config: TrendConfig,
    mode: SessionMode,
    device: Option<SharedDevice>,
    identity: Option<DeviceIdentity>,
    discovery: DiscoveryEngine,
    catalog: TagCatalog,
    selection: Vec<Tag>,
    /// Every tag selected during the current run, in first-selected order
    recorded: Vec<Tag>,
    buffer: Arc<SampleBuffer>,
    gate: Arc<DisplayGate>,
    poller: Option<Poller>,
    run_started: Option<Timestamp>,
    run_ended: Option<Timestamp>,
    historical: Option<HistoricalSession>,
    last_stats: Option<CycleStats>,
    pending: Vec<SessionEvent>,
}

impl SessionController {
    /// Create an idle session
    pub fn new(config: TrendConfig) -> Self {
        let buffer = Arc::new(SampleBuffer::with_capacity(config.acquisition.capacity));
        Self {
            discovery: DiscoveryEngine::new(config.discovery.options()),
            config,
            mode: SessionMode::Idle,
            device: None,
            identity: None,
            catalog: TagCatalog::default(),
            selection: Vec::new(),
            recorded: Vec::new(),
            buffer,
            gate: Arc::new(DisplayGate::new()),
            poller: None,
            run_started: None,
            run_ended: None,
            historical: None,
            last_stats: None,
            pending: Vec::new(),
        }
    }

    fn invalid(&self, action: &'static str) -> TrendError {
        TrendError::InvalidTransition {
            action,
            mode: self.mode.display_name(),
        }
    }

    fn connected_device(&self, action: &'static str) -> Result<SharedDevice> {
        match &self.device {
            Some(device) if self.mode.has_device() => Ok(device.clone()),
            _ => Err(self.invalid(action)),
        }
    }

    // ==================== Accessors ====================

    /// Current mode
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Active configuration
    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    /// Identity of the connected device
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Family of the connected device, or of the imported document
    pub fn family(&self) -> Option<ControllerFamily> {
        match (&self.device, &self.historical) {
            (Some(device), _) => Some(device.family()),
            (None, Some(historical)) => Some(historical.metadata.family),
            (None, None) => None,
        }
    }

    /// Catalog from the last discovery
    pub fn catalog(&self) -> &TagCatalog {
        &self.catalog
    }

    /// Current selection
    pub fn selection(&self) -> &[Tag] {
        &self.selection
    }

    /// Imported session, while Historical
    pub fn historical(&self) -> Option<&HistoricalSession> {
        self.historical.as_ref()
    }

    /// Read handle for the shell
    ///
    /// The handle stays valid across runs, imports and resets.
    pub fn stream(&self) -> SampleStream {
        SampleStream::new(self.buffer.clone(), self.gate.clone())
    }

    /// Buffer occupancy
    pub fn storage_info(&self) -> StorageInfo {
        self.buffer.storage_info()
    }

    /// Whether the last cycle reached the device
    pub fn is_healthy(&self) -> bool {
        self.poller.as_ref().map_or(true, |p| p.is_healthy())
    }

    /// Cycle statistics of the running or last finished run
    pub fn cycle_stats(&self) -> Option<CycleStats> {
        self.poller
            .as_ref()
            .map(|p| p.stats())
            .or_else(|| self.last_stats.clone())
    }

    // ==================== Connection ====================

    /// Connect to a device (Idle or Historical -> Connected)
    pub fn connect(&mut self, device: SharedDevice) -> Result<DeviceIdentity> {
        if !matches!(self.mode, SessionMode::Idle | SessionMode::Historical) {
            return Err(self.invalid("connect"));
        }
        let identity = device.identify().map_err(TrendError::from)?;

        if self.historical.take().is_some() {
            self.buffer.clear();
            self.recorded.clear();
        }
        info!(
            "Connected to {} '{}' at {} (serial {})",
            device.family(),
            identity.name,
            identity.host,
            identity.serial
        );
        self.device = Some(device);
        self.identity = Some(identity.clone());
        self.mode = SessionMode::Connected;
        Ok(identity)
    }

    /// Build the tag catalog
    ///
    /// Tag-addressed devices are asked for their tag list; file-addressed
    /// devices go through discovery, which is cached per device identity.
    pub fn discover(&mut self) -> Result<&TagCatalog> {
        let device = self.connected_device("discover")?;
        let catalog = if device.family().is_file_addressed() {
            let files = self.discovery.discover(device.as_ref())?;
            TagCatalog::from_data_files(&files)
        } else {
            let tags = device
                .list_tags()
                .map_err(|e| TrendError::from(e).with_context("Failed to list tags"))?;
            TagCatalog::from_tag_list(tags)
        };
        info!(
            "Catalog ready: {} entries in {} groups",
            catalog.len(),
            catalog.groups().len()
        );
        self.catalog = catalog;
        Ok(&self.catalog)
    }

    /// Drop the discovery cache so the next `discover` probes again
    pub fn refresh_discovery(&mut self) {
        self.discovery.invalidate();
    }

    // ==================== Selection ====================

    /// Replace the selection
    ///
    /// While trending, the poller picks up the new selection at its next
    /// cycle; removing every tag stops the trend.
    pub fn select_tags(&mut self, tags: Vec<Tag>) -> Result<()> {
        self.connected_device("select tags")?;
        validate_selection(&tags)?;
        if let Some(tag) = tags.iter().find(|t| !t.data_type.is_trendable()) {
            return Err(TrendError::InvalidConfiguration(format!(
                "tag '{}' cannot be trended",
                tag.name
            )));
        }

        if self.mode.is_acquiring() {
            if tags.is_empty() {
                info!("All tags removed; stopping trend");
                self.stop_run();
                self.pending.push(SessionEvent::SelectionEmptied);
            } else if let Some(poller) = &self.poller {
                poller.update_tags(tags.clone())?;
                for tag in &tags {
                    if !self.recorded.iter().any(|t| t.name == tag.name) {
                        self.recorded.push(tag.clone());
                    }
                }
            }
        }
        self.selection = tags;
        Ok(())
    }

    /// Select catalog entries by name
    ///
    /// Tags already selected keep their color; new ones get the palette
    /// color of their position.
    pub fn select_by_name<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        let tags = self
            .catalog
            .resolve(names)?
            .into_iter()
            .enumerate()
            .map(|(i, tag)| match self.selection.iter().find(|t| t.name == tag.name) {
                Some(existing) => existing.clone(),
                None => tag.with_palette_color(i),
            })
            .collect();
        self.select_tags(tags)
    }

    // ==================== Trend lifecycle ====================

    /// Start trending
    ///
    /// From Connected or Stopped this begins a fresh run and clears the
    /// buffer; from Paused it resumes.
    pub fn start(&mut self) -> Result<()> {
        match self.mode {
            SessionMode::Paused => return self.resume(),
            SessionMode::Connected | SessionMode::Stopped => {}
            _ => return Err(self.invalid("start")),
        }
        let device = self.connected_device("start")?;
        if self.selection.is_empty() {
            return Err(TrendError::InvalidConfiguration(
                "no tags selected".to_string(),
            ));
        }
        validate_selection(&self.selection)?;
        let poller_config = self.config.acquisition.poller_config()?;

        self.buffer.clear();
        self.gate.resume();
        let poller = Poller::start(
            device,
            self.buffer.clone(),
            self.gate.clone(),
            self.selection.clone(),
            poller_config,
        )?;

        self.recorded = self.selection.clone();
        self.run_started = Some(Utc::now());
        self.run_ended = None;
        self.last_stats = None;
        self.poller = Some(poller);
        self.mode = SessionMode::Live;
        info!(
            "Trend started: {} tags every {} ms",
            self.selection.len(),
            self.config.acquisition.interval_ms
        );
        Ok(())
    }

    /// Freeze the display while acquisition continues (Live -> Paused)
    pub fn pause(&mut self) -> Result<()> {
        match (&self.poller, self.mode) {
            (Some(poller), SessionMode::Live) => {
                poller.pause();
                self.mode = SessionMode::Paused;
                info!("Display paused");
                Ok(())
            }
            _ => Err(self.invalid("pause")),
        }
    }

    /// Follow live data again (Paused -> Live)
    pub fn resume(&mut self) -> Result<()> {
        match (&self.poller, self.mode) {
            (Some(poller), SessionMode::Paused) => {
                poller.resume();
                self.mode = SessionMode::Live;
                info!("Display resumed");
                Ok(())
            }
            _ => Err(self.invalid("resume")),
        }
    }

    /// Stop trending and keep the data (Live/Paused -> Stopped)
    ///
    /// Waits for an in-flight cycle to finish.
    pub fn stop(&mut self) -> Result<()> {
        if !self.mode.is_acquiring() {
            return Err(self.invalid("stop"));
        }
        self.stop_run();
        Ok(())
    }

    fn stop_run(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
            self.last_stats = Some(poller.stats());
            self.pending
                .extend(poller.drain_events().into_iter().map(SessionEvent::Poller));
        }
        self.gate.resume();
        self.run_ended = Some(Utc::now());
        self.mode = SessionMode::Stopped;
        info!(
            "Trend stopped with {} points",
            self.buffer.storage_info().total_points
        );
    }

    /// Return to Idle from any mode
    ///
    /// Stops the poller, closes the device and discards the buffer, the
    /// selection, the catalog and the session's device identity. The
    /// discovery engine keeps its identity-keyed cache, so reconnecting to
    /// the same device (host and serial) skips probing.
    pub fn reset(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
        if let Some(device) = self.device.take() {
            device.close();
        }
        self.identity = None;
        self.catalog = TagCatalog::default();
        self.selection.clear();
        self.recorded.clear();
        self.buffer.clear();
        self.gate.resume();
        self.run_started = None;
        self.run_ended = None;
        self.historical = None;
        self.last_stats = None;
        self.pending.clear();
        if self.mode != SessionMode::Idle {
            info!("Session reset from {}", self.mode);
        }
        self.mode = SessionMode::Idle;
    }

    /// Same as [`reset`](Self::reset)
    pub fn disconnect(&mut self) {
        self.reset();
    }

    /// Discard collected samples without leaving the current mode
    pub fn clear_data(&mut self) -> Result<()> {
        if self.mode.is_historical() {
            return Err(self.invalid("clear data"));
        }
        self.buffer.clear();
        Ok(())
    }

    /// Change the poll interval, applied to a running trend at its next tick
    pub fn set_interval(&mut self, interval_ms: u64) -> Result<()> {
        validate_interval(interval_ms)?;
        if let Some(poller) = &self.poller {
            poller.set_interval(interval_ms)?;
        }
        self.config.acquisition.interval_ms = interval_ms;
        Ok(())
    }

    /// Change the buffer capacity, evicting the oldest samples if needed
    pub fn set_capacity(&mut self, policy: CapacityPolicy) -> Result<()> {
        if self.mode.is_historical() {
            return Err(self.invalid("change capacity"));
        }
        if policy.limit() == Some(0) {
            return Err(TrendError::InvalidConfiguration(
                "capacity must allow at least one point".to_string(),
            ));
        }
        self.buffer.set_capacity(policy);
        self.config.acquisition.capacity = policy;
        Ok(())
    }

    /// Collect poller events and apply their side effects
    ///
    /// A poller that halted after too many failed cycles moves the session
    /// to Stopped; collected data is kept.
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        let mut events = std::mem::take(&mut self.pending);
        let mut halted = None;

        if let Some(poller) = &self.poller {
            for event in poller.drain_events() {
                if let PollerEvent::Halted {
                    consecutive_failures,
                } = event
                {
                    halted = Some(consecutive_failures);
                }
                events.push(SessionEvent::Poller(event));
            }
            if halted.is_none() && !poller.is_running() {
                halted = Some(poller.consecutive_failures());
            }
        }

        if let Some(consecutive_failures) = halted {
            error!(
                "Trend stopped after {} consecutive failed cycles",
                consecutive_failures
            );
            self.stop_run();
            events.append(&mut self.pending);
            events.push(SessionEvent::AutoStopped {
                consecutive_failures,
            });
        }
        events
    }

    // ==================== Reads ====================

    /// Newest sample of a tag
    pub fn latest(&self, tag: &str) -> Option<Sample> {
        self.buffer.latest(tag)
    }

    /// Samples of a tag with `from <= timestamp <= to`
    pub fn window_since(&self, tag: &str, from: Timestamp, to: Timestamp) -> Vec<Sample> {
        self.buffer.window_since(tag, from, to)
    }

    /// Sample closest to `timestamp`
    ///
    /// Cursor inspection is not available while the display follows live
    /// data; pause first.
    pub fn nearest_to(&self, tag: &str, timestamp: Timestamp) -> Result<Option<Sample>> {
        if self.mode == SessionMode::Live {
            return Err(self.invalid("inspect samples"));
        }
        Ok(self.buffer.nearest_to(tag, timestamp))
    }

    // ==================== Persistence ====================

    /// Snapshot the session into a document
    pub fn export(&self) -> Result<TrendDocument> {
        let metadata = match self.mode {
            SessionMode::Idle => return Err(self.invalid("export")),
            SessionMode::Historical => match &self.historical {
                Some(historical) => historical.metadata.clone(),
                None => return Err(self.invalid("export")),
            },
            _ => {
                let tags = if self.recorded.is_empty() {
                    self.selection.clone()
                } else {
                    self.recorded.clone()
                };
                DocumentMetadata {
                    device: self.identity.clone().unwrap_or_default(),
                    family: self.family().unwrap_or_default(),
                    slot: self.config.connection.slot,
                    tags,
                    sample_interval_ms: self.config.acquisition.interval_ms,
                    start_time: self.run_started,
                    end_time: self
                        .run_ended
                        .or_else(|| self.mode.is_acquiring().then(Utc::now)),
                    ..DocumentMetadata::default()
                }
            }
        };
        Ok(TrendDocument::from_buffer(metadata, &self.buffer))
    }

    /// Export to a JSON document file
    pub fn export_to_file(&self, path: &Path) -> Result<()> {
        self.export()?.save_to_file(path)
    }

    /// Export to a CSV file, returning the number of rows
    pub fn export_csv(&self, path: &Path) -> Result<usize> {
        tabular::save_csv(&self.export()?, path)
    }

    /// Open a document as a read-only Historical session
    ///
    /// Only allowed from Idle, Connected or Historical. A connected device
    /// is closed.
    pub fn import(&mut self, document: TrendDocument, source: Option<PathBuf>) -> Result<()> {
        if !self.mode.can_import() {
            return Err(self.invalid("import"));
        }
        if let Some(device) = self.device.take() {
            device.close();
        }
        self.identity = None;
        self.catalog = TagCatalog::default();
        self.selection.clear();

        self.buffer.clear();
        for record in &document.series {
            self.buffer
                .insert_series(&record.tag, record.samples.iter().copied());
        }
        if document.series.iter().any(|s| s.samples.is_empty()) {
            warn!("Document contains empty series; they are not shown");
        }

        self.recorded = document.metadata.tags.clone();
        self.run_started = document.metadata.start_time;
        self.run_ended = document.metadata.end_time;
        info!(
            "Imported {} series ({} points)",
            document.series.len(),
            self.buffer.storage_info().total_points
        );
        self.historical = Some(HistoricalSession {
            metadata: document.metadata,
            source,
        });
        self.mode = SessionMode::Historical;
        Ok(())
    }

    /// Import a document file
    pub fn import_file(&mut self, path: &Path) -> Result<()> {
        if !self.mode.can_import() {
            return Err(self.invalid("import"));
        }
        let document = TrendDocument::load_from_file(path)?;
        self.import(document, Some(path.to_path_buf()))
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(TrendConfig::default())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
    }
}
