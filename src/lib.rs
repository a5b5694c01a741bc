// qrsbench - QRS detector benchmark
// Module declarations

pub mod commands;
pub mod config;
pub mod dataset;
pub mod detector;
pub mod events;
pub mod metrics;
pub mod report;
pub mod state;
