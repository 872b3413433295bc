//! Integration tests for trend persistence
//!
//! These tests validate documents on disk:
//! - JSON export and import through the session controller
//! - CSV export layout
//! - Legacy `.pytrend` files

mod common;

use common::builders::{DocumentBuilder, TagBuilder};
use common::mock_helpers::{create_test_slc, fast_config};
use common::{ts, wait_for};
use plctrend_rs::session::{save_csv, SessionController, SessionMode, TrendDocument};
use plctrend_rs::{ControllerFamily, Sample};
use tempfile::TempDir;

fn recorded_session() -> SessionController {
    let mut session = SessionController::new(fast_config());
    session.connect(create_test_slc()).unwrap();
    session.discover().unwrap();
    session
        .select_by_name(&["N7:0", "B3:0/1", "F8:2"])
        .unwrap();
    session.start().unwrap();
    assert!(wait_for(|| session.stream().len("F8:2") >= 3));
    session.stop().unwrap();
    session
}

#[test]
fn test_file_round_trip_through_sessions() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trend.json");

    let session = recorded_session();
    session.export_to_file(&path).unwrap();
    let original = session.export().unwrap();

    let mut viewer = SessionController::new(fast_config());
    viewer.import_file(&path).unwrap();
    assert_eq!(viewer.mode(), SessionMode::Historical);
    assert_eq!(
        viewer.historical().unwrap().source.as_deref(),
        Some(path.as_path())
    );
    assert_eq!(viewer.family(), Some(ControllerFamily::Slc500));

    let reimported = viewer.export().unwrap();
    for record in &original.series {
        assert_eq!(
            reimported.series(&record.tag).unwrap(),
            record.samples.as_slice(),
            "series {} differs after import",
            record.tag
        );
    }
    assert_eq!(reimported.metadata.tags, original.metadata.tags);
    assert_eq!(reimported.metadata.device.serial, "SIM00001");
}

#[test]
fn test_csv_export_from_session() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trend.csv");

    let session = recorded_session();
    let rows = session.export_csv(&path).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, vec!["Timestamp", "N7:0", "B3:0/1", "F8:2"]);

    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), rows);
    // All three tags are sampled in the same cycles, so no cell is blank
    assert!(records.iter().all(|r| r.iter().all(|cell| !cell.is_empty())));
}

#[test]
fn test_csv_blank_cells_for_missing_samples() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sparse.csv");
    let doc = DocumentBuilder::new()
        .series(
            TagBuilder::named("A").build(),
            vec![Sample::good(ts(0), 1.0), Sample::good(ts(2), 3.0)],
        )
        .series(
            TagBuilder::named("B").build(),
            vec![Sample::good(ts(1), 20.0), Sample::error(ts(2))],
        )
        .build();
    assert_eq!(save_csv(&doc, &path).unwrap(), 3);

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let rows: Vec<Vec<String>> = reader
        .records()
        .map(|r| r.unwrap().iter().skip(1).map(String::from).collect())
        .collect();
    assert_eq!(rows[0], vec!["1", ""]);
    assert_eq!(rows[1], vec!["", "20"]);
    assert_eq!(rows[2], vec!["3", ""]);
}

#[test]
fn test_legacy_pytrend_import() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("old.pytrend");
    std::fs::write(
        &path,
        r#"{
  "version": "1.0",
  "appName": "PLC Trend Tool",
  "metadata": {
    "plcIP": "192.168.0.20",
    "controllerType": "MicroLogix",
    "slot": 0,
    "tags": ["N7:0", "F8:1"],
    "sampleRate": 2.0,
    "startTime": "2024-05-01T08:00:00.000",
    "totalPoints": 3
  },
  "data": [
    {"timestamp": "2024-05-01T08:00:00.000", "values": {"N7:0": 1, "F8:1": 0.5}},
    {"timestamp": "2024-05-01T08:00:02.000", "values": {"N7:0": 2, "F8:1": null}},
    {"timestamp": "not a time", "values": {"N7:0": 99}},
    {"timestamp": "2024-05-01T08:00:04.000", "values": {"N7:0": 3, "F8:1": 1.5}}
  ]
}"#,
    )
    .unwrap();

    let mut viewer = SessionController::new(fast_config());
    viewer.import_file(&path).unwrap();
    let meta = &viewer.historical().unwrap().metadata;
    assert_eq!(meta.family, ControllerFamily::MicroLogix);
    assert_eq!(meta.device.host, "192.168.0.20");
    assert_eq!(meta.sample_interval_ms, 2000);

    let stream = viewer.stream();
    assert_eq!(stream.len("N7:0"), 3);
    assert_eq!(stream.len("F8:1"), 3);
    let f8 = viewer.export().unwrap();
    let f8 = f8.series("F8:1").unwrap();
    assert!(f8[1].is_error());
    assert_eq!(f8[2].value, Some(1.5));
}

#[test]
fn test_corrupt_document_leaves_session_untouched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    let mut session = SessionController::new(fast_config());
    session.connect(create_test_slc()).unwrap();
    assert!(session.import_file(&path).is_err());
    assert_eq!(session.mode(), SessionMode::Connected);
    assert!(session.identity().is_some());
}

#[test]
fn test_document_from_disk_matches_saved() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("built.json");
    let doc = DocumentBuilder::new()
        .interval_ms(250)
        .series(
            TagBuilder::file("T4:0.ACC").build(),
            (0..10).map(|i| Sample::good(ts(i), i as f64)).collect(),
        )
        .build();
    doc.save_to_file(&path).unwrap();
    assert_eq!(TrendDocument::load_from_file(&path).unwrap(), doc);
}
