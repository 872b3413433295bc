//! Core data types for plctrend-rs
//!
//! This module contains the fundamental data structures used throughout the
//! engine for representing tags, samples and their statistics.
//!
//! # Main Types
//!
//! - [`Tag`] - A named or addressed trendable value
//! - [`TagAddress`] - Where a tag's value lives on the device
//! - [`Sample`] - A single timestamped value with its quality flag
//! - [`SeriesStats`] - Running min/max/mean for the live value table
//!
//! # Bit Tags
//!
//! Bit tags (`N7:0/3`) are derived from their word (`N7:0`). The poller reads
//! the word once per cycle and every bit tag referencing it takes its value
//! from that single read.

use crate::backend::address::{FileAddress, WORD_BITS};
use crate::error::{Result, TrendError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wall-clock timestamp attached to every sample
pub type Timestamp = DateTime<Utc>;

/// Trace colors assigned to tags in selection order
const TRACE_COLORS: [[u8; 4]; 16] = [
    [0x3b, 0x82, 0xf6, 255],
    [0xef, 0x44, 0x44, 255],
    [0x22, 0xc5, 0x5e, 255],
    [0xf5, 0x9e, 0x0b, 255],
    [0x8b, 0x5c, 0xf6, 255],
    [0xec, 0x48, 0x99, 255],
    [0x06, 0xb6, 0xd4, 255],
    [0xf9, 0x73, 0x16, 255],
    [0x14, 0xb8, 0xa6, 255],
    [0xa8, 0x55, 0xf7, 255],
    [0x84, 0xcc, 0x16, 255],
    [0xe1, 0x1d, 0x48, 255],
    [0x63, 0x66, 0xf1, 255],
    [0x0e, 0xa5, 0xe9, 255],
    [0xd9, 0x46, 0xef, 255],
    [0xfa, 0xcc, 0x15, 255],
];

/// Quality flag recorded with every sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Quality {
    /// The device returned a fresh value
    #[default]
    Good,
    /// The device returned a value it flagged as not current
    Stale,
    /// The read failed; the sample carries no value
    Error,
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quality::Good => write!(f, "OK"),
            Quality::Stale => write!(f, "STALE"),
            Quality::Error => write!(f, "ERR"),
        }
    }
}

/// A single recorded value of one tag
///
/// The tag itself is the key under which the buffer stores the sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Cycle timestamp
    pub timestamp: Timestamp,
    /// Value read from the device (`None` for `Quality::Error`)
    #[serde(default, with = "sample_value")]
    pub value: Option<f64>,
    /// Read quality
    #[serde(default)]
    pub quality: Quality,
}

impl Sample {
    /// Create a good sample
    pub fn good(timestamp: Timestamp, value: f64) -> Self {
        Self {
            timestamp,
            value: Some(value),
            quality: Quality::Good,
        }
    }

    /// Create a sample with an explicit quality
    pub fn with_quality(timestamp: Timestamp, value: f64, quality: Quality) -> Self {
        if quality == Quality::Error {
            return Self::error(timestamp);
        }
        Self {
            timestamp,
            value: Some(value),
            quality,
        }
    }

    /// Create an error sample (gap marker)
    pub fn error(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            value: None,
            quality: Quality::Error,
        }
    }

    /// Check if this sample marks a failed read
    pub fn is_error(&self) -> bool {
        self.quality == Quality::Error
    }

    /// Copy of this sample with a different timestamp
    pub(crate) fn at(self, timestamp: Timestamp) -> Self {
        Self { timestamp, ..self }
    }
}

/// Serde representation of a sample value
///
/// JSON has no NaN or infinity, so non-finite values are written as the
/// strings `"NaN"`, `"inf"` and `"-inf"`.
mod sample_value {
    use serde::de::{self, Unexpected};
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) if v.is_nan() => serializer.serialize_str("NaN"),
            Some(v) if *v == f64::INFINITY => serializer.serialize_str("inf"),
            Some(v) if *v == f64::NEG_INFINITY => serializer.serialize_str("-inf"),
            Some(v) => serializer.serialize_some(v),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        match Option::<Repr>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Repr::Number(v)) => Ok(Some(v)),
            Some(Repr::Text(text)) => match text.as_str() {
                "NaN" => Ok(Some(f64::NAN)),
                "inf" => Ok(Some(f64::INFINITY)),
                "-inf" => Ok(Some(f64::NEG_INFINITY)),
                other => Err(de::Error::invalid_value(
                    Unexpected::Str(other),
                    &"a number, \"NaN\", \"inf\" or \"-inf\"",
                )),
            },
        }
    }
}

/// Semantic type of a tag's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TagDataType {
    /// Signed or unsigned integer of any width
    #[default]
    Integer,
    /// Floating point
    Float,
    /// Single bit
    Bool,
    /// Character data, listed but not trendable
    Text,
}

impl TagDataType {
    /// Whether values of this type can be plotted
    pub fn is_trendable(&self) -> bool {
        !matches!(self, TagDataType::Text)
    }
}

impl std::fmt::Display for TagDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagDataType::Integer => write!(f, "Integer"),
            TagDataType::Float => write!(f, "Float"),
            TagDataType::Bool => write!(f, "Bool"),
            TagDataType::Text => write!(f, "Text"),
        }
    }
}

/// Coarse classification of a tag's address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    /// Symbolic tag name (Logix, Micro800)
    Named,
    /// Data file element or sub-element (`N7:0`, `T4:0.ACC`)
    FileElement,
    /// Single bit of a data file word (`B3:0/5`)
    FileBit,
}

/// Where a tag's value lives on the device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagAddress {
    /// Symbolic tag name
    Named(String),
    /// Element or sub-element of a data file
    FileElement(FileAddress),
    /// Bit of a data file word
    FileBit {
        /// The word the bit is taken from
        word: FileAddress,
        /// Bit index 0-15
        bit: u8,
    },
}

impl TagAddress {
    /// Classify this address
    pub fn kind(&self) -> AddressKind {
        match self {
            TagAddress::Named(_) => AddressKind::Named,
            TagAddress::FileElement(_) => AddressKind::FileElement,
            TagAddress::FileBit { .. } => AddressKind::FileBit,
        }
    }

    /// Data file number for file-addressed tags
    pub fn file_number(&self) -> Option<u8> {
        match self {
            TagAddress::Named(_) => None,
            TagAddress::FileElement(addr) => Some(addr.file_number),
            TagAddress::FileBit { word, .. } => Some(word.file_number),
        }
    }
}

impl std::fmt::Display for TagAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagAddress::Named(name) => write!(f, "{}", name),
            TagAddress::FileElement(addr) => write!(f, "{}", addr),
            TagAddress::FileBit { word, bit } => write!(f, "{}/{}", word, bit),
        }
    }
}

/// Per-tag display scaling preference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayScale {
    /// Fit the axis to the visible data
    pub auto: bool,
    /// Manual minimum
    pub min: f64,
    /// Manual maximum
    pub max: f64,
}

impl Default for DisplayScale {
    fn default() -> Self {
        Self {
            auto: true,
            min: 0.0,
            max: 100.0,
        }
    }
}

fn default_color() -> [u8; 4] {
    TRACE_COLORS[0]
}

/// A trendable value on the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Name, unique within a session
    pub name: String,
    /// Device address
    pub address: TagAddress,
    /// Semantic data type
    #[serde(default)]
    pub data_type: TagDataType,
    /// Name of the word tag a bit tag derives from
    #[serde(default)]
    pub parent: Option<String>,
    /// Trace color (RGBA)
    #[serde(default = "default_color")]
    pub color: [u8; 4],
    /// Display scaling
    #[serde(default)]
    pub display_scale: DisplayScale,
}

impl Tag {
    /// Create a symbolic tag
    pub fn named(name: impl Into<String>, data_type: TagDataType) -> Self {
        let name = name.into();
        Self {
            address: TagAddress::Named(name.clone()),
            name,
            data_type,
            parent: None,
            color: default_color(),
            display_scale: DisplayScale::default(),
        }
    }

    /// Create a tag for a data file element or sub-element
    pub fn element(address: FileAddress, data_type: TagDataType) -> Self {
        Self {
            name: address.to_string(),
            address: TagAddress::FileElement(address),
            data_type,
            parent: None,
            color: default_color(),
            display_scale: DisplayScale::default(),
        }
    }

    /// Create a bit tag derived from a word
    pub fn bit(word: FileAddress, bit: u8) -> Self {
        let address = TagAddress::FileBit { word, bit };
        Self {
            name: address.to_string(),
            parent: Some(word.to_string()),
            address,
            data_type: TagDataType::Bool,
            color: default_color(),
            display_scale: DisplayScale::default(),
        }
    }

    /// Parse a file-addressed tag such as `N7:0`, `B3:1/4` or `T4:0.ACC`
    pub fn parse_file_tag(text: &str) -> Result<Self> {
        let address = crate::backend::address::parse_tag_address(text)?;
        Ok(match address {
            TagAddress::FileElement(addr) => Tag::element(addr, addr.data_type()),
            TagAddress::FileBit { word, bit } => Tag::bit(word, bit),
            TagAddress::Named(name) => Tag::named(name, TagDataType::Integer),
        })
    }

    /// Set the trace color
    pub fn with_color(mut self, color: [u8; 4]) -> Self {
        self.color = color;
        self
    }

    /// Assign the palette color for a position in the selection
    pub fn with_palette_color(mut self, index: usize) -> Self {
        self.color = Self::palette_color(index);
        self
    }

    /// Set the display scale
    pub fn with_display_scale(mut self, scale: DisplayScale) -> Self {
        self.display_scale = scale;
        self
    }

    /// Palette color for the n-th trace (wraps around)
    pub fn palette_color(index: usize) -> [u8; 4] {
        TRACE_COLORS[index % TRACE_COLORS.len()]
    }

    /// Address classification
    pub fn address_kind(&self) -> AddressKind {
        self.address.kind()
    }

    /// Data file this tag belongs to, if file-addressed
    pub fn parent_file(&self) -> Option<u8> {
        self.address.file_number()
    }

    /// Whether this tag takes its value from another tag's read
    pub fn is_derived(&self) -> bool {
        matches!(self.address, TagAddress::FileBit { .. })
    }
}

/// Check that tag names are unique, returning the first duplicate otherwise
pub fn ensure_unique_names(tags: &[Tag]) -> Result<()> {
    let mut seen = std::collections::HashSet::with_capacity(tags.len());
    for tag in tags {
        if !seen.insert(tag.name.as_str()) {
            return Err(TrendError::InvalidConfiguration(format!(
                "duplicate tag name '{}'",
                tag.name
            )));
        }
    }
    Ok(())
}

/// Check a selection before it reaches the poller
///
/// Names must be unique and bit tags must address bits 0-15 of their word.
pub fn validate_selection(tags: &[Tag]) -> Result<()> {
    ensure_unique_names(tags)?;
    for tag in tags {
        if let TagAddress::FileBit { bit, .. } = &tag.address {
            if *bit >= WORD_BITS {
                return Err(TrendError::InvalidConfiguration(format!(
                    "tag '{}' addresses bit {}; words have bits 0-{}",
                    tag.name,
                    bit,
                    WORD_BITS - 1
                )));
            }
        }
    }
    Ok(())
}

/// Running statistics over the good samples of a series
///
/// Only `Good` samples with a finite value feed `count`, `sum`, `min` and
/// `max`; `Error` samples are counted separately and `Stale` samples are
/// ignored. Updates are O(1). Appending keeps `min`/`max` exact; under
/// eviction the owning buffer supplies them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    /// Number of good values
    pub count: u64,
    /// Running sum for the mean
    pub sum: f64,
    /// Minimum value held
    pub min: f64,
    /// Maximum value held
    pub max: f64,
    /// Number of error samples currently held
    pub error_count: u64,
}

impl Default for SeriesStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesStats {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::MAX,
            max: f64::MIN,
            error_count: 0,
        }
    }

    /// Value a sample contributes to the statistics, if any
    #[inline]
    pub fn tracked_value(sample: &Sample) -> Option<f64> {
        match (sample.quality, sample.value) {
            (Quality::Good, Some(value)) if value.is_finite() => Some(value),
            _ => None,
        }
    }

    /// Account for an appended sample
    #[inline]
    pub fn push(&mut self, sample: &Sample) {
        if sample.is_error() {
            self.error_count += 1;
        } else if let Some(value) = Self::tracked_value(sample) {
            self.count += 1;
            self.sum += value;
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
    }

    /// Account for an evicted sample
    ///
    /// `min`/`max` are left untouched.
    #[inline]
    pub fn pop(&mut self, sample: &Sample) {
        if sample.is_error() {
            self.error_count = self.error_count.saturating_sub(1);
        } else if let Some(value) = Self::tracked_value(sample) {
            if self.count > 0 {
                self.count -= 1;
                self.sum -= value;
            }
        }
    }

    /// Replace `min`/`max` with the extremes of the held values
    pub fn set_range(&mut self, range: Option<(f64, f64)>) {
        let (min, max) = range.unwrap_or((f64::MAX, f64::MIN));
        self.min = min;
        self.max = max;
    }

    /// Mean of the held values
    #[inline]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// `(min, max)` of the held values, if any
    pub fn range(&self) -> Option<(f64, f64)> {
        (self.count > 0).then_some((self.min, self.max))
    }
}
