pub mod config;
pub mod confirm;
pub mod energy;
pub mod matcher;

pub use config::DetectorConfig;
pub use confirm::{HopDecider, HopOutcome, MatchScore};
pub use matcher::ncc_peak;
