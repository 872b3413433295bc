//! Persisted trend documents
//!
//! A [`TrendDocument`] holds everything needed to reopen a trend: device
//! identity, controller family, full tag metadata, the sample interval and
//! every series with its original timestamps. Documents are JSON; every
//! metadata field defaults so files written by older versions still load.
//!
//! The importer also reads the row-oriented `.pytrend` layout
//! (`metadata` + `data: [{timestamp, values}]`) written by the earlier
//! Python trend tool.

use crate::backend::{ControllerFamily, DeviceIdentity};
use crate::buffer::SampleBuffer;
use crate::error::{Result, ResultExt, TrendError};
use crate::types::{Sample, Tag, TagDataType, Timestamp};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Version written into new documents
pub const DOCUMENT_VERSION: &str = "2.0";

/// Application name written into new documents
pub const APP_NAME: &str = "plctrend-rs";

fn default_version() -> String {
    DOCUMENT_VERSION.to_string()
}

fn default_interval_ms() -> u64 {
    1000
}

/// Session metadata stored with a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Identity of the recorded device
    #[serde(default)]
    pub device: DeviceIdentity,
    /// Controller family
    #[serde(default)]
    pub family: ControllerFamily,
    /// Backplane slot
    #[serde(default)]
    pub slot: u8,
    /// Every tag that has a series, in selection order
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Poll interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub sample_interval_ms: u64,
    /// Time the run started
    #[serde(default)]
    pub start_time: Option<Timestamp>,
    /// Time the run ended (or the export time for a running trend)
    #[serde(default)]
    pub end_time: Option<Timestamp>,
    /// Time the document was written
    #[serde(default)]
    pub exported_at: Option<Timestamp>,
    /// Sum of all series lengths
    #[serde(default)]
    pub total_points: usize,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            device: DeviceIdentity::default(),
            family: ControllerFamily::default(),
            slot: 0,
            tags: Vec::new(),
            sample_interval_ms: default_interval_ms(),
            start_time: None,
            end_time: None,
            exported_at: None,
            total_points: 0,
        }
    }
}

/// Samples of one tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRecord {
    /// Tag name
    pub tag: String,
    /// Samples in timestamp order
    #[serde(default)]
    pub samples: Vec<Sample>,
}

/// A complete trend, as exported or imported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendDocument {
    /// Format version
    #[serde(default = "default_version")]
    pub version: String,
    /// Writing application
    #[serde(default)]
    pub app_name: String,
    /// Session metadata
    #[serde(default)]
    pub metadata: DocumentMetadata,
    /// One series per tag
    #[serde(default)]
    pub series: Vec<SeriesRecord>,
}

impl TrendDocument {
    /// Snapshot a buffer into a document
    ///
    /// Series follow the order of `metadata.tags`; buffer series without a
    /// matching tag are appended in name order. Missing run times are taken
    /// from the buffer, and `total_points` and `exported_at` are filled in.
    pub fn from_buffer(mut metadata: DocumentMetadata, buffer: &SampleBuffer) -> Self {
        let mut names: Vec<String> = metadata.tags.iter().map(|t| t.name.clone()).collect();
        for name in buffer.tags() {
            if !names.contains(&name) {
                names.push(name);
            }
        }

        let series: Vec<SeriesRecord> = names
            .into_iter()
            .filter_map(|tag| {
                let samples = buffer.view(&tag)?.to_vec();
                Some(SeriesRecord { tag, samples })
            })
            .collect();

        let range = buffer.time_range();
        if metadata.start_time.is_none() {
            metadata.start_time = range.map(|(start, _)| start);
        }
        if metadata.end_time.is_none() {
            metadata.end_time = range.map(|(_, end)| end);
        }
        metadata.total_points = series.iter().map(|s| s.samples.len()).sum();
        metadata.exported_at = Some(Utc::now());

        Self {
            version: default_version(),
            app_name: APP_NAME.to_string(),
            metadata,
            series,
        }
    }

    /// Samples of one tag
    pub fn series(&self, tag: &str) -> Option<&[Sample]> {
        self.series
            .iter()
            .find(|s| s.tag == tag)
            .map(|s| s.samples.as_slice())
    }

    /// Names of all series, in document order
    pub fn tag_names(&self) -> Vec<&str> {
        self.series.iter().map(|s| s.tag.as_str()).collect()
    }

    /// Earliest and latest sample timestamps across all series
    pub fn time_range(&self) -> Option<(Timestamp, Timestamp)> {
        let mut range: Option<(Timestamp, Timestamp)> = None;
        for sample in self.series.iter().flat_map(|s| s.samples.iter()) {
            let ts = sample.timestamp;
            range = Some(match range {
                Some((start, end)) => (start.min(ts), end.max(ts)),
                None => (ts, ts),
            });
        }
        range
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a document, accepting both the current and the `.pytrend` layout
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        if is_legacy_layout(&value) {
            debug!("Reading row-oriented legacy document");
            let legacy: LegacyDocument = serde_json::from_value(value)?;
            return Ok(legacy.into_document());
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Save document to a JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .map_err(TrendError::from)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(
            "Exported {} series ({} points) to {}",
            self.series.len(),
            self.metadata.total_points,
            path.display()
        );
        Ok(())
    }

    /// Load document from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(TrendError::from)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let doc = Self::from_json(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!(
            "Loaded document v{} with {} series from {}",
            doc.version,
            doc.series.len(),
            path.display()
        );
        Ok(doc)
    }
}

fn is_legacy_layout(value: &Value) -> bool {
    value.get("data").is_some_and(Value::is_array) && value.get("series").is_none()
}

/// Row-oriented layout of the earlier tool
#[derive(Debug, Deserialize)]
struct LegacyDocument {
    #[serde(default)]
    metadata: LegacyMetadata,
    #[serde(default)]
    data: Vec<LegacyRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyMetadata {
    #[serde(default, rename = "plcIP")]
    plc_ip: String,
    #[serde(default)]
    controller_type: String,
    #[serde(default)]
    slot: Value,
    #[serde(default)]
    tags: Vec<String>,
    /// Seconds
    #[serde(default)]
    sample_rate: Option<f64>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    exported_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyRow {
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    values: HashMap<String, Value>,
}

impl LegacyDocument {
    fn into_document(self) -> TrendDocument {
        let meta = self.metadata;
        let family = meta.controller_type.parse().unwrap_or_default();

        let mut names = meta.tags.clone();
        let mut samples: HashMap<String, Vec<Sample>> = HashMap::new();
        let mut skipped = 0usize;

        for row in self.data {
            let Some(timestamp) = parse_timestamp(&row.timestamp) else {
                skipped += 1;
                continue;
            };
            // Tags missing from a row (added mid-trend) get no sample
            for (tag, value) in row.values {
                let Some(sample) = legacy_sample(timestamp, &value) else {
                    continue;
                };
                if !names.contains(&tag) {
                    names.push(tag.clone());
                }
                samples.entry(tag).or_default().push(sample);
            }
        }
        if skipped > 0 {
            warn!("Skipped {} legacy rows with unreadable timestamps", skipped);
        }

        let tags: Vec<Tag> = names
            .iter()
            .enumerate()
            .map(|(i, name)| legacy_tag(name, family).with_palette_color(i))
            .collect();
        let series: Vec<SeriesRecord> = names
            .into_iter()
            .map(|tag| {
                let mut samples = samples.remove(&tag).unwrap_or_default();
                samples.sort_by_key(|s| s.timestamp);
                SeriesRecord { tag, samples }
            })
            .collect();

        let metadata = DocumentMetadata {
            device: DeviceIdentity {
                host: meta.plc_ip,
                ..DeviceIdentity::default()
            },
            family,
            slot: legacy_slot(&meta.slot),
            tags,
            sample_interval_ms: meta
                .sample_rate
                .map(|secs| (secs * 1000.0).round() as u64)
                .unwrap_or_else(default_interval_ms),
            start_time: meta.start_time.as_deref().and_then(parse_timestamp),
            end_time: meta.end_time.as_deref().and_then(parse_timestamp),
            exported_at: meta.exported_at.as_deref().and_then(parse_timestamp),
            total_points: series.iter().map(|s| s.samples.len()).sum(),
        };

        TrendDocument {
            version: "1.0".to_string(),
            app_name: APP_NAME.to_string(),
            metadata,
            series,
        }
    }
}

fn legacy_tag(name: &str, family: ControllerFamily) -> Tag {
    if family.is_file_addressed() {
        if let Ok(tag) = Tag::parse_file_tag(name) {
            return tag;
        }
    }
    Tag::named(name, TagDataType::Float)
}

fn legacy_sample(timestamp: Timestamp, value: &Value) -> Option<Sample> {
    match value {
        Value::Null => Some(Sample::error(timestamp)),
        Value::Bool(b) => Some(Sample::good(timestamp, if *b { 1.0 } else { 0.0 })),
        Value::Number(n) => n.as_f64().map(|v| Sample::good(timestamp, v)),
        _ => None,
    }
}

fn legacy_slot(value: &Value) -> u8 {
    match value {
        Value::Number(n) => n.as_u64().and_then(|s| u8::try_from(s).ok()).unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Parse an ISO-8601 timestamp; values without an offset are taken as UTC
pub fn parse_timestamp(text: &str) -> Option<Timestamp> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}
