//! CSV export
//!
//! One row per distinct timestamp across all series, one column per tag.
//! A cell is blank when the tag has no sample at exactly that timestamp or
//! the sample is an error marker. The table is for spreadsheets; it cannot
//! be imported back.

use super::document::TrendDocument;
use crate::error::{Result, ResultExt, TrendError};
use crate::types::Timestamp;
use chrono::SecondsFormat;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Header of the timestamp column
pub const TIMESTAMP_COLUMN: &str = "Timestamp";

/// Write a document as CSV, returning the number of data rows
pub fn write_csv<W: Write>(doc: &TrendDocument, writer: W) -> Result<usize> {
    let columns = doc.series.len();
    let mut rows: BTreeMap<Timestamp, Vec<Option<f64>>> = BTreeMap::new();
    for (col, record) in doc.series.iter().enumerate() {
        for sample in &record.samples {
            let row = rows
                .entry(sample.timestamp)
                .or_insert_with(|| vec![None; columns]);
            // A clamped duplicate timestamp keeps the last value
            row[col] = sample.value;
        }
    }

    let mut csv = csv::Writer::from_writer(writer);
    let header = std::iter::once(TIMESTAMP_COLUMN).chain(doc.series.iter().map(|s| s.tag.as_str()));
    csv.write_record(header)?;

    for (timestamp, values) in &rows {
        let mut record = Vec::with_capacity(columns + 1);
        record.push(timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        record.extend(
            values
                .iter()
                .map(|v| v.map(|v| v.to_string()).unwrap_or_default()),
        );
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(rows.len())
}

/// Write a document as a CSV file
pub fn save_csv(doc: &TrendDocument, path: &Path) -> Result<usize> {
    let file = std::fs::File::create(path)
        .map_err(TrendError::from)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let rows = write_csv(doc, std::io::BufWriter::new(file))?;
    info!("Exported {} CSV rows to {}", rows, path.display());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::document::{DocumentMetadata, SeriesRecord};
    use crate::types::Sample;
    use chrono::{TimeZone, Utc};

    fn ts(ms: i64) -> Timestamp {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn doc(series: Vec<SeriesRecord>) -> TrendDocument {
        TrendDocument {
            version: "2.0".to_string(),
            app_name: "test".to_string(),
            metadata: DocumentMetadata::default(),
            series,
        }
    }

    fn to_string(doc: &TrendDocument) -> String {
        let mut out = Vec::new();
        write_csv(doc, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_rows_per_distinct_timestamp() {
        let d = doc(vec![
            SeriesRecord {
                tag: "A".to_string(),
                samples: vec![Sample::good(ts(0), 1.0), Sample::good(ts(1000), 2.0)],
            },
            SeriesRecord {
                tag: "B".to_string(),
                samples: vec![Sample::good(ts(500), 7.5), Sample::good(ts(1000), 8.0)],
            },
        ]);
        let text = to_string(&d);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Timestamp,A,B");
        assert!(lines[1].ends_with(",1,"));
        assert!(lines[2].ends_with(",,7.5"));
        assert!(lines[3].ends_with(",2,8"));
    }

    #[test]
    fn test_error_sample_blank() {
        let d = doc(vec![SeriesRecord {
            tag: "A".to_string(),
            samples: vec![Sample::error(ts(0))],
        }]);
        let text = to_string(&d);
        assert_eq!(text.lines().nth(1).map(|l| l.ends_with(',')), Some(true));
    }

    #[test]
    fn test_empty_document() {
        let text = to_string(&doc(Vec::new()));
        assert_eq!(text.trim(), "Timestamp");
    }

    #[test]
    fn test_save_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trend.csv");
        let d = doc(vec![SeriesRecord {
            tag: "A".to_string(),
            samples: vec![Sample::good(ts(0), 1.0), Sample::good(ts(100), 2.0)],
        }]);
        assert_eq!(save_csv(&d, &path).unwrap(), 2);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "Timestamp");
        assert_eq!(reader.records().count(), 2);
    }
}
