pub mod build_logs;
pub mod builds;
pub mod scans;
