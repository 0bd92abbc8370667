//! Command implementations

mod scan;
mod setup;

pub use scan::ScanArgs;
pub use setup::{init_config, show_config};
