use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use ggwatch_audio::refs::default_labels;
use ggwatch_detect::DetectorConfig;

/// Full listener configuration. Immutable once the listener is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub detector: DetectorConfig,
    /// Executable name of the target process, matched case-insensitively.
    pub exe_name: String,
    /// Seconds between pid discovery attempts while the process is absent.
    pub poll_interval_secs: f32,
    /// Reconnect backoff bounds after capture faults.
    pub backoff_base_secs: f32,
    pub backoff_cap_secs: f32,
    /// Directory holding one reference clip per label.
    pub refs_dir: PathBuf,
    /// Label to filename-stem table for the reference library.
    pub labels: Vec<(String, String)>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            exe_name: "overwatch.exe".to_string(),
            poll_interval_secs: 2.0,
            backoff_base_secs: 2.0,
            backoff_cap_secs: 30.0,
            refs_dir: PathBuf::from("refs"),
            labels: default_labels(),
        }
    }
}
