//! Rolling per-tag sample storage
//!
//! The [`SampleBuffer`] is written by the poller thread and read concurrently
//! by the shell. Every tag owns a [`Series`] stored as a queue of immutable,
//! reference-counted chunks plus one open chunk that receives appends:
//!
//! ```text
//!   sealed: [chunk 0 (head..)] [chunk 1] ... [chunk k]    open: [open_head..]
//! ```
//!
//! Readers take the series lock only long enough to clone the chunk handles
//! and copy the open chunk (at most [`CHUNK_LEN`] samples), then search and
//! copy outside the lock. Eviction under a capacity cap advances a head
//! offset and drops whole chunks, so it is O(1) amortized.
//!
//! Timestamps within a series never decrease: an append older than the last
//! recorded sample is clamped to the last timestamp.

use crate::types::{Sample, SeriesStats, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Number of samples in a sealed chunk
pub const CHUNK_LEN: usize = 256;

/// Per-tag point limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CapacityPolicy {
    /// Keep every sample
    #[default]
    Unlimited,
    /// Keep at most this many samples per tag, evicting the oldest
    MaxPoints(usize),
}

impl CapacityPolicy {
    /// Point limit, if any
    pub fn limit(&self) -> Option<usize> {
        match self {
            CapacityPolicy::Unlimited => None,
            CapacityPolicy::MaxPoints(n) => Some(*n),
        }
    }

    fn to_raw(self) -> usize {
        match self {
            CapacityPolicy::Unlimited => 0,
            CapacityPolicy::MaxPoints(n) => n.max(1),
        }
    }

    fn from_raw(raw: usize) -> Self {
        if raw == 0 {
            CapacityPolicy::Unlimited
        } else {
            CapacityPolicy::MaxPoints(raw)
        }
    }
}

impl std::fmt::Display for CapacityPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapacityPolicy::Unlimited => write!(f, "unlimited"),
            CapacityPolicy::MaxPoints(n) => write!(f, "{} points", n),
        }
    }
}

/// Storage figures for the storage panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageInfo {
    /// Samples held across all tags
    pub total_points: usize,
    /// Number of tags with a series
    pub tag_count: usize,
    /// Active capacity policy
    pub capacity: CapacityPolicy,
    /// Approximate memory used by samples
    pub estimated_bytes: usize,
}

/// Sliding-window min/max over the held values
///
/// Monotonic queues keyed by append sequence number; each value is pushed
/// and popped at most once, so eviction stays O(1) amortized.
#[derive(Debug, Default)]
struct Extremes {
    /// Sequence number of the next appended sample
    next_seq: u64,
    /// Sequence number of the oldest held sample
    front_seq: u64,
    min: VecDeque<(u64, f64)>,
    max: VecDeque<(u64, f64)>,
}

impl Extremes {
    fn push(&mut self, value: Option<f64>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let Some(value) = value else {
            return;
        };
        while self.min.back().is_some_and(|&(_, v)| v >= value) {
            self.min.pop_back();
        }
        self.min.push_back((seq, value));
        while self.max.back().is_some_and(|&(_, v)| v <= value) {
            self.max.pop_back();
        }
        self.max.push_back((seq, value));
    }

    fn pop(&mut self) {
        let seq = self.front_seq;
        self.front_seq += 1;
        if self.min.front().is_some_and(|&(s, _)| s == seq) {
            self.min.pop_front();
        }
        if self.max.front().is_some_and(|&(s, _)| s == seq) {
            self.max.pop_front();
        }
    }

    fn range(&self) -> Option<(f64, f64)> {
        Some((self.min.front()?.1, self.max.front()?.1))
    }
}

#[derive(Debug, Default)]
struct SeriesData {
    sealed: VecDeque<Arc<[Sample]>>,
    /// Evicted samples at the front of `sealed[0]`
    head: usize,
    open: Vec<Sample>,
    /// Evicted samples at the front of `open` (only while `sealed` is empty)
    open_head: usize,
    len: usize,
    last_timestamp: Option<Timestamp>,
    stats: SeriesStats,
    extremes: Extremes,
    clamped: u64,
}

impl SeriesData {
    fn push(&mut self, mut sample: Sample, limit: Option<usize>) {
        if let Some(last) = self.last_timestamp {
            if sample.timestamp < last {
                self.clamped += 1;
                sample = sample.at(last);
            }
        }

        if let Some(limit) = limit {
            while self.len >= limit && self.len > 0 {
                self.evict_oldest();
            }
        }

        self.open.push(sample);
        self.len += 1;
        self.stats.push(&sample);
        self.extremes.push(SeriesStats::tracked_value(&sample));
        self.last_timestamp = Some(sample.timestamp);

        if self.open.len() == CHUNK_LEN {
            let chunk: Arc<[Sample]> = Arc::from(std::mem::take(&mut self.open));
            if self.sealed.is_empty() {
                self.head = self.open_head;
            }
            self.open_head = 0;
            self.sealed.push_back(chunk);
        }
    }

    fn evict_oldest(&mut self) {
        let evicted = if let Some(front) = self.sealed.front() {
            let sample = front[self.head];
            self.head += 1;
            if self.head == front.len() {
                self.sealed.pop_front();
                self.head = 0;
            }
            sample
        } else {
            let sample = self.open[self.open_head];
            self.open_head += 1;
            if self.open_head == self.open.len() {
                self.open.clear();
                self.open_head = 0;
            }
            sample
        };
        self.len -= 1;
        self.stats.pop(&evicted);
        self.extremes.pop();
        self.stats.set_range(self.extremes.range());
    }

    fn trim_to(&mut self, limit: usize) {
        while self.len > limit {
            self.evict_oldest();
        }
    }

    fn latest(&self) -> Option<Sample> {
        if self.open.len() > self.open_head {
            return self.open.last().copied();
        }
        self.sealed
            .back()
            .and_then(|chunk| chunk.last().copied())
            .filter(|_| self.len > 0)
    }

    fn view(&self) -> SeriesView {
        SeriesView {
            chunks: self.sealed.iter().cloned().collect(),
            head: self.head,
            open: self.open[self.open_head..].to_vec(),
            len: self.len,
        }
    }
}

/// Consistent point-in-time view of one series
///
/// Holds shared handles to the sealed chunks, so it stays valid (and
/// unchanged) while the poller keeps appending.
#[derive(Debug, Clone, Default)]
pub struct SeriesView {
    chunks: Vec<Arc<[Sample]>>,
    head: usize,
    open: Vec<Sample>,
    len: usize,
}

impl SeriesView {
    /// Number of samples in the view
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the view holds no samples
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Contiguous runs of samples, oldest first
    pub fn slices(&self) -> impl Iterator<Item = &[Sample]> {
        let head = self.head;
        self.chunks
            .iter()
            .enumerate()
            .map(move |(i, chunk)| if i == 0 { &chunk[head..] } else { &chunk[..] })
            .chain(std::iter::once(self.open.as_slice()))
            .filter(|s| !s.is_empty())
    }

    /// Samples, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.slices().flat_map(|s| s.iter())
    }

    /// Copy every sample out of the view
    pub fn to_vec(&self) -> Vec<Sample> {
        let mut out = Vec::with_capacity(self.len);
        for slice in self.slices() {
            out.extend_from_slice(slice);
        }
        out
    }

    /// Samples with `from <= timestamp <= to`
    pub fn window(&self, from: Timestamp, to: Timestamp) -> Vec<Sample> {
        let mut out = Vec::new();
        if from > to {
            return out;
        }
        for slice in self.slices() {
            let (first, last) = (slice[0].timestamp, slice[slice.len() - 1].timestamp);
            if last < from {
                continue;
            }
            if first > to {
                break;
            }
            let start = slice.partition_point(|s| s.timestamp < from);
            let end = slice.partition_point(|s| s.timestamp <= to);
            out.extend_from_slice(&slice[start..end]);
        }
        out
    }

    /// Sample closest in time to `ts`; ties go to the earlier sample
    pub fn nearest(&self, ts: Timestamp) -> Option<Sample> {
        let mut before: Option<Sample> = None;
        let mut after: Option<Sample> = None;
        for slice in self.slices() {
            let last = slice[slice.len() - 1];
            if last.timestamp < ts {
                before = Some(last);
                continue;
            }
            let idx = slice.partition_point(|s| s.timestamp < ts);
            after = Some(slice[idx]);
            if idx > 0 {
                before = Some(slice[idx - 1]);
            }
            break;
        }

        match (before, after) {
            (Some(b), Some(a)) => {
                if ts - b.timestamp <= a.timestamp - ts {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (b, a) => b.or(a),
        }
    }

    /// Timestamps of the oldest and newest sample
    pub fn time_range(&self) -> Option<(Timestamp, Timestamp)> {
        let first = self.slices().next()?.first()?.timestamp;
        let last = self.slices().last()?.last()?.timestamp;
        Some((first, last))
    }
}

/// Timestamp-ordered samples of one tag
#[derive(Debug, Default)]
pub struct Series {
    data: RwLock<SeriesData>,
}

impl Series {
    /// Create an empty series
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample, evicting the oldest when the limit is reached
    ///
    /// Returns `true` if the timestamp had to be clamped.
    pub fn push(&self, sample: Sample, limit: Option<usize>) -> bool {
        let mut data = self.data.write();
        let clamped = data.clamped;
        data.push(sample, limit);
        data.clamped != clamped
    }

    /// Number of samples held
    pub fn len(&self) -> usize {
        self.data.read().len
    }

    /// Whether the series holds no samples
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<Sample> {
        self.data.read().latest()
    }

    /// Running statistics
    pub fn stats(&self) -> SeriesStats {
        self.data.read().stats
    }

    /// Number of appends that were clamped to keep timestamps ordered
    pub fn clamped_count(&self) -> u64 {
        self.data.read().clamped
    }

    /// Point-in-time view
    pub fn view(&self) -> SeriesView {
        self.data.read().view()
    }

    fn trim_to(&self, limit: usize) {
        self.data.write().trim_to(limit);
    }
}

/// Thread-safe store of every tag's series
///
/// Single writer (the poller), many readers.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    series: RwLock<HashMap<String, Arc<Series>>>,
    /// Raw capacity, 0 = unlimited
    capacity: AtomicUsize,
}

impl SampleBuffer {
    /// Create an unlimited buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer with a capacity policy
    pub fn with_capacity(policy: CapacityPolicy) -> Self {
        let buffer = Self::new();
        buffer.capacity.store(policy.to_raw(), Ordering::Relaxed);
        buffer
    }

    /// Active capacity policy
    pub fn capacity(&self) -> CapacityPolicy {
        CapacityPolicy::from_raw(self.capacity.load(Ordering::Relaxed))
    }

    /// Apply a new capacity policy, trimming every series immediately
    pub fn set_capacity(&self, policy: CapacityPolicy) {
        self.capacity.store(policy.to_raw(), Ordering::Relaxed);
        if let Some(limit) = self.capacity().limit() {
            for series in self.series.read().values() {
                series.trim_to(limit);
            }
        }
        tracing::debug!("Buffer capacity set to {}", policy);
    }

    fn series(&self, tag: &str) -> Option<Arc<Series>> {
        self.series.read().get(tag).cloned()
    }

    fn series_or_insert(&self, tag: &str) -> Arc<Series> {
        if let Some(series) = self.series(tag) {
            return series;
        }
        self.series
            .write()
            .entry(tag.to_string())
            .or_default()
            .clone()
    }

    /// Append one sample to a tag's series
    pub fn append(&self, tag: &str, sample: Sample) {
        let limit = self.capacity().limit();
        if self.series_or_insert(tag).push(sample, limit) {
            tracing::warn!(
                "Sample for '{}' at {} is older than the last sample; clamped",
                tag,
                sample.timestamp
            );
        }
    }

    /// Replace a tag's series with the given samples (used for imports)
    ///
    /// The capacity policy is not applied; an imported series is kept whole.
    pub fn insert_series(&self, tag: &str, samples: impl IntoIterator<Item = Sample>) {
        let series = Arc::new(Series::new());
        for sample in samples {
            series.push(sample, None);
        }
        self.series.write().insert(tag.to_string(), series);
    }

    /// Most recent sample of a tag
    pub fn latest(&self, tag: &str) -> Option<Sample> {
        self.series(tag)?.latest()
    }

    /// Samples of a tag with `from <= timestamp <= to`
    pub fn window_since(&self, tag: &str, from: Timestamp, to: Timestamp) -> Vec<Sample> {
        self.series(tag)
            .map(|s| s.view().window(from, to))
            .unwrap_or_default()
    }

    /// Sample of a tag closest to `ts` (ties go to the earlier sample)
    pub fn nearest_to(&self, tag: &str, ts: Timestamp) -> Option<Sample> {
        self.series(tag)?.view().nearest(ts)
    }

    /// Point-in-time view of a tag's series
    pub fn view(&self, tag: &str) -> Option<SeriesView> {
        self.series(tag).map(|s| s.view())
    }

    /// Every sample of a tag, oldest first
    pub fn samples(&self, tag: &str) -> Vec<Sample> {
        self.view(tag).map(|v| v.to_vec()).unwrap_or_default()
    }

    /// Number of samples held for a tag
    pub fn len(&self, tag: &str) -> usize {
        self.series(tag).map(|s| s.len()).unwrap_or(0)
    }

    /// Whether no tag holds any sample
    pub fn is_empty(&self) -> bool {
        self.series.read().values().all(|s| s.is_empty())
    }

    /// Running statistics of a tag
    pub fn stats(&self, tag: &str) -> Option<SeriesStats> {
        self.series(tag).map(|s| s.stats())
    }

    /// Tags that have a series, sorted
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.series.read().keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Oldest and newest timestamp across all series
    pub fn time_range(&self) -> Option<(Timestamp, Timestamp)> {
        let series: Vec<Arc<Series>> = self.series.read().values().cloned().collect();
        series
            .iter()
            .filter_map(|s| s.view().time_range())
            .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)))
    }

    /// Storage figures
    pub fn storage_info(&self) -> StorageInfo {
        let map = self.series.read();
        let total_points: usize = map.values().map(|s| s.len()).sum();
        StorageInfo {
            total_points,
            tag_count: map.len(),
            capacity: self.capacity(),
            estimated_bytes: total_points * std::mem::size_of::<Sample>(),
        }
    }

    /// Drop a tag's series
    pub fn remove(&self, tag: &str) -> bool {
        self.series.write().remove(tag).is_some()
    }

    /// Drop every series
    pub fn clear(&self) {
        self.series.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Quality;
    use chrono::{Duration, TimeZone, Utc};

    fn ts(ms: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn fill(buffer: &SampleBuffer, tag: &str, n: usize) {
        for i in 0..n {
            buffer.append(tag, Sample::good(ts(i as i64 * 100), i as f64));
        }
    }

    #[test]
    fn test_append_and_latest() {
        let buffer = SampleBuffer::new();
        assert!(buffer.latest("Motor_Speed").is_none());

        fill(&buffer, "Motor_Speed", 3);
        assert_eq!(buffer.len("Motor_Speed"), 3);
        assert_eq!(buffer.latest("Motor_Speed").unwrap().value, Some(2.0));
    }

    #[test]
    fn test_latest_after_chunk_seal() {
        let buffer = SampleBuffer::new();
        fill(&buffer, "t", CHUNK_LEN);
        assert_eq!(
            buffer.latest("t").unwrap().value,
            Some((CHUNK_LEN - 1) as f64)
        );
        assert_eq!(buffer.samples("t").len(), CHUNK_LEN);
    }

    #[test]
    fn test_capacity_keeps_newest() {
        let buffer = SampleBuffer::with_capacity(CapacityPolicy::MaxPoints(300));
        fill(&buffer, "t", 1000);

        let samples = buffer.samples("t");
        assert_eq!(samples.len(), 300);
        assert_eq!(samples[0].value, Some(700.0));
        assert_eq!(samples[299].value, Some(999.0));
    }

    #[test]
    fn test_small_capacity_in_open_chunk() {
        let buffer = SampleBuffer::with_capacity(CapacityPolicy::MaxPoints(3));
        fill(&buffer, "t", 600);
        let values: Vec<_> = buffer.samples("t").iter().map(|s| s.value).collect();
        assert_eq!(values, vec![Some(597.0), Some(598.0), Some(599.0)]);
    }

    #[test]
    fn test_set_capacity_trims_immediately() {
        let buffer = SampleBuffer::new();
        fill(&buffer, "a", 500);
        fill(&buffer, "b", 50);

        buffer.set_capacity(CapacityPolicy::MaxPoints(100));
        assert_eq!(buffer.len("a"), 100);
        assert_eq!(buffer.len("b"), 50);
        assert_eq!(buffer.samples("a")[0].value, Some(400.0));

        let info = buffer.storage_info();
        assert_eq!(info.total_points, 150);
        assert_eq!(info.tag_count, 2);
        assert_eq!(info.capacity, CapacityPolicy::MaxPoints(100));
    }

    #[test]
    fn test_out_of_order_is_clamped() {
        let buffer = SampleBuffer::new();
        buffer.append("t", Sample::good(ts(1000), 1.0));
        buffer.append("t", Sample::good(ts(500), 2.0));

        let samples = buffer.samples("t");
        assert_eq!(samples[1].timestamp, ts(1000));
        assert_eq!(samples[1].value, Some(2.0));
    }

    #[test]
    fn test_window_since() {
        let buffer = SampleBuffer::new();
        fill(&buffer, "t", 1000);

        let window = buffer.window_since("t", ts(25_000), ts(30_000));
        assert_eq!(window.len(), 51);
        assert_eq!(window[0].value, Some(250.0));
        assert_eq!(window[50].value, Some(300.0));

        assert!(buffer.window_since("t", ts(30_000), ts(25_000)).is_empty());
        assert!(buffer.window_since("missing", ts(0), ts(1)).is_empty());
    }

    #[test]
    fn test_nearest_ties_go_earlier() {
        let buffer = SampleBuffer::new();
        fill(&buffer, "t", 10);

        assert_eq!(buffer.nearest_to("t", ts(150)).unwrap().value, Some(1.0));
        assert_eq!(buffer.nearest_to("t", ts(151)).unwrap().value, Some(2.0));
        assert_eq!(buffer.nearest_to("t", ts(-500)).unwrap().value, Some(0.0));
        assert_eq!(buffer.nearest_to("t", ts(99_999)).unwrap().value, Some(9.0));
        assert!(buffer.nearest_to("missing", ts(0)).is_none());
    }

    #[test]
    fn test_nearest_across_chunks() {
        let buffer = SampleBuffer::with_capacity(CapacityPolicy::MaxPoints(400));
        fill(&buffer, "t", 700);
        // Boundary between the evicted region and the live chunks
        assert_eq!(buffer.nearest_to("t", ts(0)).unwrap().value, Some(300.0));
        let at = (CHUNK_LEN as i64 * 2) * 100 + 40;
        assert_eq!(
            buffer.nearest_to("t", ts(at)).unwrap().value,
            Some((CHUNK_LEN * 2) as f64)
        );
    }

    #[test]
    fn test_stats_and_errors() {
        let buffer = SampleBuffer::new();
        buffer.append("t", Sample::good(ts(0), 5.0));
        buffer.append("t", Sample::error(ts(100)));
        buffer.append("t", Sample::with_quality(ts(200), 7.0, Quality::Stale));

        let stats = buffer.stats("t").unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.range(), Some((5.0, 5.0)));
    }

    #[test]
    fn test_stats_follow_eviction() {
        let buffer = SampleBuffer::with_capacity(CapacityPolicy::MaxPoints(10));
        for i in 0..(CHUNK_LEN * 4) {
            buffer.append("t", Sample::good(ts(i as i64), i as f64));
        }
        let stats = buffer.stats("t").unwrap();
        assert_eq!(stats.count, 10);
        let first = (CHUNK_LEN * 4 - 10) as f64;
        assert_eq!(stats.range(), Some((first, first + 9.0)));
    }

    #[test]
    fn test_evicted_extreme_leaves_range() {
        let buffer = SampleBuffer::with_capacity(CapacityPolicy::MaxPoints(10));
        buffer.append("t", Sample::good(ts(0), 1000.0));
        buffer.append("t", Sample::good(ts(1), -1000.0));
        for i in 0..50 {
            buffer.append("t", Sample::good(ts(2 + i), 0.0));
        }
        let stats = buffer.stats("t").unwrap();
        assert_eq!(stats.range(), Some((0.0, 0.0)));
        assert_eq!(stats.mean(), 0.0);

        // A descending run: each eviction removes the current maximum
        let buffer = SampleBuffer::with_capacity(CapacityPolicy::MaxPoints(3));
        for i in 0..8 {
            buffer.append("d", Sample::good(ts(i), (100 - i) as f64));
            let held: Vec<f64> = buffer.samples("d").iter().filter_map(|s| s.value).collect();
            let max = held.iter().copied().fold(f64::MIN, f64::max);
            let min = held.iter().copied().fold(f64::MAX, f64::min);
            assert_eq!(buffer.stats("d").unwrap().range(), Some((min, max)));
        }
    }

    #[test]
    fn test_stats_empty_after_errors_only() {
        let buffer = SampleBuffer::with_capacity(CapacityPolicy::MaxPoints(2));
        buffer.append("t", Sample::good(ts(0), 3.0));
        buffer.append("t", Sample::error(ts(1)));
        buffer.append("t", Sample::error(ts(2)));
        let stats = buffer.stats("t").unwrap();
        assert_eq!(stats.range(), None);
        assert_eq!(stats.error_count, 2);
    }

    #[test]
    fn test_clear_and_insert_series() {
        let buffer = SampleBuffer::new();
        fill(&buffer, "t", 10);
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.tags().is_empty());

        buffer.insert_series("u", (0..5).map(|i| Sample::good(ts(i), i as f64)));
        assert_eq!(buffer.len("u"), 5);
        assert_eq!(buffer.time_range(), Some((ts(0), ts(4))));
    }

    #[test]
    fn test_view_is_stable_while_appending() {
        let buffer = SampleBuffer::new();
        fill(&buffer, "t", 300);
        let view = buffer.view("t").unwrap();
        fill(&buffer, "t", 300);
        assert_eq!(view.len(), 300);
        assert_eq!(view.to_vec().len(), 300);
        assert_eq!(buffer.len("t"), 600);
    }

    #[test]
    fn test_concurrent_readers() {
        let buffer = Arc::new(SampleBuffer::with_capacity(CapacityPolicy::MaxPoints(1000)));
        let writer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || fill(&buffer, "t", 5000))
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let samples = buffer.samples("t");
                        assert!(samples.len() <= 1000);
                        assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(buffer.len("t"), 1000);
    }

    // Property-based tests using proptest
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_timestamps_never_decrease(offsets in prop::collection::vec(-5_000i64..5_000, 1..600)) {
            let buffer = SampleBuffer::new();
            for (i, offset) in offsets.iter().enumerate() {
                buffer.append("t", Sample::good(ts(*offset), i as f64));
            }
            let samples = buffer.samples("t");
            prop_assert_eq!(samples.len(), offsets.len());
            for pair in samples.windows(2) {
                prop_assert!(pair[0].timestamp <= pair[1].timestamp);
            }
        }

        #[test]
        fn test_cap_keeps_exactly_newest(cap in 1usize..700, extra in 0usize..700) {
            let buffer = SampleBuffer::with_capacity(CapacityPolicy::MaxPoints(cap));
            let total = cap + extra;
            fill(&buffer, "t", total);

            let samples = buffer.samples("t");
            prop_assert_eq!(samples.len(), cap);
            for (i, sample) in samples.iter().enumerate() {
                prop_assert_eq!(sample.value, Some((extra + i) as f64));
            }
        }

        #[test]
        fn test_window_matches_filter(from in 0i64..20_000, span in 0i64..20_000) {
            let buffer = SampleBuffer::with_capacity(CapacityPolicy::MaxPoints(150));
            fill(&buffer, "t", 400);
            let to = from + span;
            let expected: Vec<Sample> = buffer
                .samples("t")
                .into_iter()
                .filter(|s| s.timestamp >= ts(from) && s.timestamp <= ts(to))
                .collect();
            prop_assert_eq!(buffer.window_since("t", ts(from), ts(to)), expected);
        }
    }
}
