//! Shared CLI state: configuration loading

pub mod config;

pub use config::ScanConfig;
