//! Test data builders for creating test objects

use plctrend_rs::session::{DocumentMetadata, SeriesRecord, TrendDocument};
use plctrend_rs::{Sample, Tag, TagDataType};

/// Builder for file-addressed or symbolic test tags
pub struct TagBuilder {
    tag: Tag,
}

impl TagBuilder {
    /// Tag parsed from a data file address such as `N7:0` or `B3:0/4`
    pub fn file(address: &str) -> Self {
        Self {
            tag: Tag::parse_file_tag(address).unwrap(),
        }
    }

    /// Symbolic tag
    pub fn named(name: &str) -> Self {
        Self {
            tag: Tag::named(name, TagDataType::Float),
        }
    }

    pub fn data_type(mut self, data_type: TagDataType) -> Self {
        self.tag.data_type = data_type;
        self
    }

    pub fn palette(mut self, index: usize) -> Self {
        self.tag = self.tag.with_palette_color(index);
        self
    }

    pub fn build(self) -> Tag {
        self.tag
    }
}

/// Builder for trend documents with hand-written series
pub struct DocumentBuilder {
    metadata: DocumentMetadata,
    series: Vec<SeriesRecord>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self {
            metadata: DocumentMetadata::default(),
            series: Vec::new(),
        }
    }

    pub fn interval_ms(mut self, ms: u64) -> Self {
        self.metadata.sample_interval_ms = ms;
        self
    }

    /// Add a tag and its samples
    pub fn series(mut self, tag: Tag, samples: Vec<Sample>) -> Self {
        self.series.push(SeriesRecord {
            tag: tag.name.clone(),
            samples,
        });
        self.metadata.tags.push(tag);
        self
    }

    pub fn build(mut self) -> TrendDocument {
        self.metadata.total_points = self.series.iter().map(|s| s.samples.len()).sum();
        TrendDocument {
            version: plctrend_rs::session::DOCUMENT_VERSION.to_string(),
            app_name: "tests".to_string(),
            metadata: self.metadata,
            series: self.series,
        }
    }
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_builder() {
        let tag = TagBuilder::file("B3:0/4").palette(2).build();
        assert_eq!(tag.name, "B3:0/4");
        assert_eq!(tag.data_type, TagDataType::Bool);
        assert_eq!(tag.color, Tag::palette_color(2));
    }
}
