//! Background sampling loop
//!
//! The poller runs on its own thread and reads the selected tags from the
//! device at a fixed rate, pushing one timestamped sample per tag per cycle
//! into the shared [`SampleBuffer`]. It communicates with the session
//! controller through crossbeam channels.
//!
//! # Scheduling
//!
//! Ticks are fixed-rate: the next deadline is the previous deadline plus the
//! interval. A cycle that overruns delays the next one, and ticks that were
//! missed entirely are skipped. Cycles never overlap.
//!
//! # Failure handling
//!
//! - A single tag that fails to read gets an `Error` sample for that cycle
//! - A transport failure marks every tag `Error` for the cycle and flags the
//!   connection as unhealthy
//! - After `max_consecutive_failures` failed cycles in a row the poller halts
//!   itself and reports [`PollerEvent::Halted`]

use super::device::{CycleStats, DeviceError, SharedDevice};
use super::read_plan::{extract_value, ReadPlan};
use crate::buffer::SampleBuffer;
use crate::error::{Result, TrendError};
use crate::stream::DisplayGate;
use crate::types::{validate_selection, Sample, Tag, Timestamp};
use chrono::Utc;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Shortest accepted sample interval
pub const MIN_INTERVAL_MS: u64 = 100;

/// Longest accepted sample interval
pub const MAX_INTERVAL_MS: u64 = 60_000;

/// Failed cycles in a row before the poller halts
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Capacity of the event channel; events beyond it are dropped
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Check a sample interval and convert it to a duration
pub fn validate_interval(interval_ms: u64) -> Result<Duration> {
    if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&interval_ms) {
        return Err(TrendError::InvalidConfiguration(format!(
            "sample interval {} ms is outside {}-{} ms",
            interval_ms, MIN_INTERVAL_MS, MAX_INTERVAL_MS
        )));
    }
    Ok(Duration::from_millis(interval_ms))
}

/// Poller settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between cycle starts
    pub interval: Duration,
    /// Failed cycles in a row before halting (0 = never halt)
    pub max_consecutive_failures: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

impl PollerConfig {
    /// Settings for an interval in milliseconds
    pub fn with_interval_ms(interval_ms: u64) -> Result<Self> {
        Ok(Self {
            interval: validate_interval(interval_ms)?,
            ..Self::default()
        })
    }

    /// Set the failure limit
    pub fn with_max_consecutive_failures(mut self, limit: u32) -> Self {
        self.max_consecutive_failures = limit;
        self
    }
}

/// Commands sent from the controller to the poller thread
#[derive(Debug, Clone)]
pub enum PollerCommand {
    /// Replace the selection; takes effect on the next cycle
    UpdateTags(Arc<Vec<Tag>>),
    /// Change the interval; takes effect after the next cycle
    SetInterval(Duration),
    /// Finish and exit
    Stop,
}

/// Events reported by the poller thread
#[derive(Debug, Clone, PartialEq)]
pub enum PollerEvent {
    /// A cycle finished and its samples are in the buffer
    CycleCompleted {
        cycle: u64,
        timestamp: Timestamp,
        tag_errors: usize,
    },
    /// The transport failed; every tag got an error sample
    ConnectionLost { message: String },
    /// A cycle succeeded after transport failures
    ConnectionRestored,
    /// The poller stopped itself after too many failed cycles
    Halted { consecutive_failures: u32 },
}

/// Result of one poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The device answered; some individual tags may have failed
    Completed { tag_errors: usize },
    /// The transport failed for this cycle
    Unreachable,
    /// The transport failed and the failure limit was reached
    Halted,
    /// Nothing is selected
    Idle,
}

/// State shared between the poller thread and its handle
#[derive(Debug)]
pub struct PollerShared {
    running: AtomicBool,
    healthy: AtomicBool,
    consecutive_failures: AtomicU32,
    stats: Mutex<CycleStats>,
}

impl Default for PollerShared {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(true),
            healthy: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            stats: Mutex::new(CycleStats::default()),
        }
    }
}

/// Compute the deadline after `previous`, skipping ticks already missed
///
/// Returns the next deadline and the number of ticks skipped.
pub fn next_tick(previous: Instant, now: Instant, interval: Duration) -> (Instant, u64) {
    let next = previous + interval;
    if next >= now || interval.is_zero() {
        return (next, 0);
    }
    let behind = (now - next).as_nanos();
    let step = interval.as_nanos();
    let skipped = behind.div_ceil(step);
    let skipped_u32 = u32::try_from(skipped).unwrap_or(u32::MAX);
    (next + interval * skipped_u32, skipped as u64)
}

/// The polling loop
///
/// Owned by the poller thread; tests drive it directly through
/// [`PollWorker::run_cycle_at`].
pub struct PollWorker {
    device: SharedDevice,
    buffer: Arc<SampleBuffer>,
    selection: Arc<Vec<Tag>>,
    plan: ReadPlan,
    config: PollerConfig,
    shared: Arc<PollerShared>,
    command_rx: Receiver<PollerCommand>,
    event_tx: Sender<PollerEvent>,
    cycle: u64,
    /// Most recent per-tag read failure
    last_tag_error: Option<TrendError>,
}

impl PollWorker {
    fn new(
        device: SharedDevice,
        buffer: Arc<SampleBuffer>,
        tags: Arc<Vec<Tag>>,
        config: PollerConfig,
        shared: Arc<PollerShared>,
        command_rx: Receiver<PollerCommand>,
        event_tx: Sender<PollerEvent>,
    ) -> Self {
        let plan = ReadPlan::new(&tags);
        Self {
            device,
            buffer,
            selection: tags,
            plan,
            config,
            shared,
            command_rx,
            event_tx,
            cycle: 0,
            last_tag_error: None,
        }
    }

    /// Worker driven by the caller instead of a thread
    pub fn standalone(
        device: SharedDevice,
        buffer: Arc<SampleBuffer>,
        tags: Vec<Tag>,
        config: PollerConfig,
    ) -> (Self, Receiver<PollerEvent>) {
        let (_command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let worker = Self::new(
            device,
            buffer,
            Arc::new(tags),
            config,
            Arc::new(PollerShared::default()),
            command_rx,
            event_tx,
        );
        (worker, event_rx)
    }

    /// Run the main loop until stopped, halted or disconnected
    pub fn run(&mut self) {
        tracing::info!(
            "Poller started: {} tags every {:?}",
            self.selection.len(),
            self.config.interval
        );

        let mut deadline = Instant::now();
        while self.shared.running.load(Ordering::SeqCst) {
            match self.command_rx.recv_deadline(deadline) {
                Ok(cmd) => {
                    let previous = self.config.interval;
                    self.handle_command(cmd);
                    if self.config.interval != previous {
                        // Re-anchor the pending tick on the last cycle start
                        deadline = deadline
                            .checked_sub(previous)
                            .map_or(deadline, |last| last + self.config.interval);
                    }
                    continue;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if self.run_cycle() == CycleOutcome::Halted {
                break;
            }

            let (next, skipped) = next_tick(deadline, Instant::now(), self.config.interval);
            if skipped > 0 {
                tracing::debug!("Cycle overran; skipped {} ticks", skipped);
                self.shared.stats.lock().missed_ticks += skipped;
            }
            deadline = next;
        }

        self.shared.running.store(false, Ordering::SeqCst);
        tracing::info!("Poller stopped after {} cycles", self.cycle);
    }

    fn handle_command(&mut self, cmd: PollerCommand) {
        match cmd {
            PollerCommand::UpdateTags(tags) => self.set_selection(tags),
            PollerCommand::SetInterval(interval) => {
                tracing::info!("Poll interval changed to {:?}", interval);
                self.config.interval = interval;
            }
            PollerCommand::Stop => {
                self.shared.running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Replace the selection snapshot
    pub fn set_selection(&mut self, tags: Arc<Vec<Tag>>) {
        self.plan = ReadPlan::new(&tags);
        tracing::info!(
            "Selection updated: {} tags, {} device reads per cycle",
            tags.len(),
            self.plan.read_count()
        );
        self.selection = tags;
    }

    /// Current selection snapshot
    pub fn selection(&self) -> &Arc<Vec<Tag>> {
        &self.selection
    }

    /// Most recent per-tag read failure, kept for diagnostics
    pub fn last_tag_error(&self) -> Option<&TrendError> {
        self.last_tag_error.as_ref()
    }

    /// Run one cycle stamped with the current time
    pub fn run_cycle(&mut self) -> CycleOutcome {
        self.run_cycle_at(Utc::now())
    }

    /// Run one cycle with an explicit cycle timestamp
    pub fn run_cycle_at(&mut self, timestamp: Timestamp) -> CycleOutcome {
        if self.plan.is_empty() {
            return CycleOutcome::Idle;
        }
        let started = Instant::now();
        let tags = Arc::clone(&self.selection);

        let results = self.device.read_batch(&self.plan.addresses());
        let lost = results.iter().find_map(|r| match r {
            Err(DeviceError::Unreachable(msg)) => Some(msg.clone()),
            _ => None,
        });

        let mut samples: Vec<Option<Sample>> = vec![None; tags.len()];
        let mut tag_errors = 0;
        for (read, result) in self.plan.reads.iter().zip(results.iter()) {
            for &idx in &read.tag_indices {
                let tag = &tags[idx];
                let sample = match (result, &lost) {
                    (Ok(reading), None) => Sample::with_quality(
                        timestamp,
                        extract_value(&tag.address, reading.value),
                        reading.quality,
                    ),
                    (Err(e), None) => {
                        let failure = TrendError::Sample {
                            tag: tag.name.clone(),
                            timestamp,
                            message: e.to_string(),
                        };
                        tracing::debug!("{}", failure);
                        self.last_tag_error = Some(failure);
                        tag_errors += 1;
                        Sample::error(timestamp)
                    }
                    (_, Some(_)) => Sample::error(timestamp),
                };
                samples[idx] = Some(sample);
            }
        }
        for (tag, sample) in tags.iter().zip(samples) {
            if let Some(sample) = sample {
                self.buffer.append(&tag.name, sample);
            }
        }

        self.cycle += 1;
        let elapsed_us = started.elapsed().as_micros() as u64;
        {
            let mut stats = self.shared.stats.lock();
            stats.record_cycle(elapsed_us, lost.is_some());
            stats.device_reads += self.plan.read_count() as u64;
            stats.reads_saved += self.plan.reads_saved() as u64;
            stats.tag_errors += tag_errors as u64;
        }

        match lost {
            Some(message) => self.record_transport_failure(message),
            None => {
                self.record_success();
                self.emit(PollerEvent::CycleCompleted {
                    cycle: self.cycle,
                    timestamp,
                    tag_errors,
                });
                CycleOutcome::Completed { tag_errors }
            }
        }
    }

    fn record_transport_failure(&mut self, message: String) -> CycleOutcome {
        let failures = self.shared.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if self.shared.healthy.swap(false, Ordering::SeqCst) {
            tracing::warn!("Connection lost: {}", message);
            self.emit(PollerEvent::ConnectionLost { message });
        } else {
            tracing::debug!("Cycle {} failed ({} in a row)", self.cycle, failures);
        }

        let limit = self.config.max_consecutive_failures;
        if limit > 0 && failures >= limit {
            tracing::error!(
                "Stopping acquisition after {} consecutive failed cycles",
                failures
            );
            self.emit(PollerEvent::Halted {
                consecutive_failures: failures,
            });
            self.shared.running.store(false, Ordering::SeqCst);
            return CycleOutcome::Halted;
        }
        CycleOutcome::Unreachable
    }

    fn record_success(&mut self) {
        self.shared.consecutive_failures.store(0, Ordering::SeqCst);
        if !self.shared.healthy.swap(true, Ordering::SeqCst) {
            tracing::info!("Connection restored");
            self.emit(PollerEvent::ConnectionRestored);
        }
    }

    fn emit(&self, event: PollerEvent) {
        // Dropped when the channel is full
        let _ = self.event_tx.try_send(event);
    }

    /// Whether the last cycle reached the device
    pub fn is_healthy(&self) -> bool {
        self.shared.healthy.load(Ordering::SeqCst)
    }

    /// Failed cycles in a row
    pub fn consecutive_failures(&self) -> u32 {
        self.shared.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Cycle statistics
    pub fn stats(&self) -> CycleStats {
        self.shared.stats.lock().clone()
    }
}

/// Handle to a running poller thread
pub struct Poller {
    command_tx: Sender<PollerCommand>,
    event_rx: Receiver<PollerEvent>,
    shared: Arc<PollerShared>,
    gate: Arc<DisplayGate>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Spawn the poller thread
    ///
    /// Fails with `InvalidConfiguration` for an empty selection, duplicate
    /// tag names or an interval outside 100 ms - 60 s.
    pub fn start(
        device: SharedDevice,
        buffer: Arc<SampleBuffer>,
        gate: Arc<DisplayGate>,
        tags: Vec<Tag>,
        config: PollerConfig,
    ) -> Result<Self> {
        if tags.is_empty() {
            return Err(TrendError::InvalidConfiguration(
                "no tags selected".to_string(),
            ));
        }
        validate_selection(&tags)?;
        validate_interval(config.interval.as_millis() as u64)?;

        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(PollerShared::default());

        let mut worker = PollWorker::new(
            device,
            buffer,
            Arc::new(tags),
            config,
            shared.clone(),
            command_rx,
            event_tx,
        );
        let handle = std::thread::Builder::new()
            .name("plctrend-poller".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            command_tx,
            event_rx,
            shared,
            gate,
            handle: Some(handle),
        })
    }

    fn send(&self, cmd: PollerCommand, action: &'static str) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|_| TrendError::InvalidTransition {
                action,
                mode: "stopped",
            })
    }

    /// Swap the selection; new tags get their first sample on the next cycle
    pub fn update_tags(&self, tags: Vec<Tag>) -> Result<()> {
        validate_selection(&tags)?;
        self.send(PollerCommand::UpdateTags(Arc::new(tags)), "update tags")
    }

    /// Change the sample interval
    pub fn set_interval(&self, interval_ms: u64) -> Result<()> {
        let interval = validate_interval(interval_ms)?;
        self.send(PollerCommand::SetInterval(interval), "change interval")
    }

    /// Freeze the display; acquisition continues
    pub fn pause(&self) {
        self.gate.pause();
    }

    /// Follow live data again
    pub fn resume(&self) {
        self.gate.resume();
    }

    /// Stop the thread and wait for an in-flight cycle to finish
    ///
    /// After this returns the buffer is no longer written.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.command_tx.send(PollerCommand::Stop);
            if handle.join().is_err() {
                tracing::error!("Poller thread panicked");
            }
        }
    }

    /// Whether the thread is still acquiring
    pub fn is_running(&self) -> bool {
        self.handle.is_some() && self.shared.running.load(Ordering::SeqCst)
    }

    /// Whether the last cycle reached the device
    pub fn is_healthy(&self) -> bool {
        self.shared.healthy.load(Ordering::SeqCst)
    }

    /// Failed cycles in a row
    pub fn consecutive_failures(&self) -> u32 {
        self.shared.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Cycle statistics
    pub fn stats(&self) -> CycleStats {
        self.shared.stats.lock().clone()
    }

    /// Drain pending events
    pub fn drain_events(&self) -> Vec<PollerEvent> {
        self.event_rx.try_iter().collect()
    }

    /// Event receiver, for callers that want to block on events
    pub fn events(&self) -> &Receiver<PollerEvent> {
        &self.event_rx
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
