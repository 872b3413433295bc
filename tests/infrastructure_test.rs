//! Test to verify test infrastructure works correctly

mod common;

use common::builders::{DocumentBuilder, TagBuilder};
use common::mock_helpers::create_sparse_slc;
use plctrend_rs::{Sample, TagDataType};

#[test]
fn test_infrastructure_setup() {
    let tag = TagBuilder::named("Flow")
        .data_type(TagDataType::Integer)
        .build();
    assert_eq!(tag.name, "Flow");
    assert_eq!(tag.data_type, TagDataType::Integer);

    let doc = DocumentBuilder::new()
        .series(tag, vec![Sample::good(common::ts(0), 1.0)])
        .build();
    assert_eq!(doc.metadata.total_points, 1);
}

#[test]
fn test_simulated_device_helper() {
    let device = create_sparse_slc();
    assert_eq!(device.data_files().len(), 4);
}

#[test]
fn test_float_comparison() {
    common::assert_float_eq(1.0, 1.0000001, 0.001);
}

#[test]
#[should_panic]
fn test_float_comparison_fails() {
    common::assert_float_eq(1.0, 2.0, 0.001);
}
