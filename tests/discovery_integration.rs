//! Integration tests for data file discovery
//!
//! These tests validate discovery against simulated file-addressed controllers:
//! - Which files are found and with which types
//! - Image-space false positives are ignored above the default files
//! - Catalog synthesis from discovered files
//! - Caching per device identity

mod common;

use common::mock_helpers::{create_sparse_slc, create_test_slc};
use plctrend_rs::backend::{
    DataFile, DeviceClient, DeviceIdentity, DiscoveryEngine, DiscoveryOptions, FileAddress,
    FileType, SimulatedDevice,
};
use plctrend_rs::catalog::TagCatalog;
use plctrend_rs::{ControllerFamily, TagDataType};
use std::sync::Arc;

fn discover(device: &dyn DeviceClient) -> Vec<DataFile> {
    DiscoveryEngine::new(DiscoveryOptions::default())
        .discover(device)
        .unwrap()
}

#[test]
fn test_sparse_controller_reports_exactly_its_files() {
    let device = create_sparse_slc();
    let files = discover(device.as_ref());

    let found: Vec<(u8, FileType)> = files.iter().map(|f| (f.file_number, f.file_type)).collect();
    assert_eq!(
        found,
        vec![
            (0, FileType::Output),
            (1, FileType::Input),
            (7, FileType::Integer),
            (40, FileType::Integer),
        ]
    );
    assert_eq!(files[2].element_count, Some(12));
    assert_eq!(files[3].element_count, Some(3));
}

#[test]
fn test_image_space_false_positives_ignored() {
    let device = create_sparse_slc();

    // The simulator answers image reads for any file number
    assert!(device
        .read_element(&FileAddress::new(FileType::Output, 77, 0))
        .is_ok());

    let files = discover(device.as_ref());
    assert!(files
        .iter()
        .filter(|f| f.file_number > 8)
        .all(|f| !f.file_type.is_image_space()));
}

#[test]
fn test_full_default_layout() {
    let device = create_test_slc();
    let files = discover(device.as_ref());
    let labels: Vec<String> = files.iter().map(DataFile::label).collect();
    assert_eq!(
        labels,
        vec!["O0", "I1", "S2", "B3", "T4", "C5", "R6", "N7", "F8"]
    );
}

#[test]
fn test_micrologix_long_file() {
    let device = SimulatedDevice::new(ControllerFamily::MicroLogix)
        .with_data_file(0, FileType::Output, 1)
        .with_data_file(1, FileType::Input, 1)
        .with_data_file(9, FileType::Long, 4)
        .with_data_file(12, FileType::String, 2);
    let files = discover(&device);
    let l9 = files.iter().find(|f| f.file_number == 9).unwrap();
    assert_eq!(l9.file_type, FileType::Long);
    assert_eq!(l9.element_count, Some(4));
    let st12 = files.iter().find(|f| f.file_number == 12).unwrap();
    assert_eq!(st12.file_type, FileType::String);
}

#[test]
fn test_unreachable_device() {
    let device = create_sparse_slc();
    device.set_unreachable(true);
    let err = DiscoveryEngine::new(DiscoveryOptions::default())
        .discover(device.as_ref())
        .unwrap_err();
    assert!(err.is_connectivity());
}

#[test]
fn test_limited_file_range() {
    let device = create_sparse_slc();
    let options = DiscoveryOptions {
        max_file_number: 10,
        probe_element_counts: false,
    };
    let files = DiscoveryEngine::new(options)
        .discover(device.as_ref())
        .unwrap();
    assert_eq!(files.len(), 3);
    assert!(files.iter().all(|f| f.element_count.is_none()));
}

#[test]
fn test_cache_follows_identity() {
    let device = create_sparse_slc();
    let mut engine = DiscoveryEngine::new(DiscoveryOptions::default());
    engine.discover(device.as_ref()).unwrap();
    let reads = device.total_reads();

    engine.discover(device.as_ref()).unwrap();
    assert_eq!(device.total_reads(), reads);

    // Same host, different serial: the controller was swapped
    let replacement = Arc::new(
        SimulatedDevice::new(ControllerFamily::Slc500)
            .with_identity(DeviceIdentity {
                serial: "SWAPPED".to_string(),
                host: "127.0.0.1".to_string(),
                ..DeviceIdentity::default()
            })
            .with_data_file(7, FileType::Integer, 1),
    );
    let files = engine.discover(replacement.as_ref()).unwrap();
    assert!(replacement.total_reads() > 0);
    assert!(files.iter().all(|f| f.file_number != 40));
    let n7 = files.iter().find(|f| f.file_number == 7).unwrap();
    assert_eq!(n7.element_count, Some(1));
}

#[test]
fn test_catalog_from_discovery() {
    let device = create_sparse_slc();
    let catalog = TagCatalog::from_data_files(&discover(device.as_ref()));

    let word = catalog.find("N7:0").unwrap();
    assert!(word.trendable);
    assert_eq!(word.tag.data_type, TagDataType::Integer);

    let bit = catalog.find("N7:11/15").unwrap();
    assert_eq!(bit.tag.data_type, TagDataType::Bool);
    assert_eq!(bit.tag.parent.as_deref(), Some("N7:11"));

    assert!(catalog.find("N7:12").is_none());
    assert!(catalog.find("N40:2").is_some());
}
