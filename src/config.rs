//! Engine configuration.
//!
//! One value per knob, built once by the caller and passed down by
//! reference. Predictor-level options live with each model
//! ([`crate::predictor::ModelOptions`]); this covers the global limits and
//! the remote endpoints.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Global engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Candidate elements read from the crude store per column
    pub limit_of_crude_elts: usize,
    /// Answers kept per column in the final tree
    pub limit_of_preset_num: usize,
    /// Memory-aided cell selection from past accepted answers
    pub predict_from_memory: MemoryConfig,
    /// Remote table-extraction service
    pub table_extract: RemoteConfig,
    /// Remote prediction service
    pub remote_predict: RemoteConfig,
}

/// Past-answer memory settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Enable the memory pass
    pub switch: bool,
    /// Directory holding the per-mold memory files
    pub data_dir: Option<PathBuf>,
}

/// A remote endpoint with its call budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Service address; disabled when absent
    pub address: Option<String>,
    /// Expand selections to whole rows on the service side
    pub expand: bool,
    /// Per-call timeout
    #[serde(with = "seconds", default = "default_timeout")]
    pub timeout: Duration,
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        value.as_secs_f64().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            address: None,
            expand: false,
            timeout: default_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            limit_of_crude_elts: 5,
            limit_of_preset_num: 10,
            predict_from_memory: MemoryConfig::default(),
            table_extract: RemoteConfig::default(),
            remote_predict: RemoteConfig::default(),
        }
    }
}

impl Config {
    /// Default settings.
    pub fn new() -> Self {
        Config::default()
    }

    /// Set the crude-candidate cap.
    pub fn with_limit_of_crude_elts(mut self, limit: usize) -> Self {
        self.limit_of_crude_elts = limit;
        self
    }

    /// Set the per-column answer cap.
    pub fn with_limit_of_preset_num(mut self, limit: usize) -> Self {
        self.limit_of_preset_num = limit;
        self
    }

    /// Point the table extractor at a service.
    pub fn with_table_extract(mut self, address: impl Into<String>) -> Self {
        self.table_extract.address = Some(address.into());
        self
    }

    /// Point the remote predictor at a service.
    pub fn with_remote_predict(mut self, address: impl Into<String>) -> Self {
        self.remote_predict.address = Some(address.into());
        self
    }

    /// Enable memory-aided cell selection.
    pub fn with_memory_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.predict_from_memory.switch = true;
        self.predict_from_memory.data_dir = Some(dir.into());
        self
    }
}
