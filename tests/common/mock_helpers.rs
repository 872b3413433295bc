//! Simulated controller helpers

use plctrend_rs::backend::{FileType, SignalPattern, SimulatedDevice};
use plctrend_rs::config::TrendConfig;
use plctrend_rs::ControllerFamily;
use std::sync::Arc;

/// SLC 500 with O0, I1, B3, N7 and a user integer file N40
///
/// Status (S2) is left out on purpose so file 2 does not exist.
pub fn create_sparse_slc() -> Arc<SimulatedDevice> {
    Arc::new(
        SimulatedDevice::new(ControllerFamily::Slc500)
            .with_data_file(0, FileType::Output, 2)
            .with_data_file(1, FileType::Input, 2)
            .with_data_file(7, FileType::Integer, 12)
            .with_data_file(40, FileType::Integer, 3),
    )
}

/// SLC 500 with the default files and a counter on N7:0
pub fn create_test_slc() -> Arc<SimulatedDevice> {
    Arc::new(SimulatedDevice::slc_with_default_files().with_pattern(
        "N7:0",
        SignalPattern::Counter {
            step: 1.0,
            min: 0.0,
            max: 1000.0,
        },
    ))
}

/// Logix controller with a handful of tags
pub fn create_test_logix() -> Arc<SimulatedDevice> {
    Arc::new(
        SimulatedDevice::new(ControllerFamily::Logix)
            .with_tag("Tank_Level", "REAL")
            .with_tag("Motor_Speed", "DINT")
            .with_tag("Pump_Running", "BOOL")
            .with_tag("Program:MainProgram.Batch_Count", "DINT")
            .with_tag("__Internal", "DINT")
            .with_default_pattern(SignalPattern::Constant(42.0)),
    )
}

/// Config with the fastest allowed poll interval
pub fn fast_config() -> TrendConfig {
    let mut config = TrendConfig::default();
    config.acquisition.interval_ms = 100;
    config
}
