//! Persistence configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Directory for `snapshots_YYYY-MM-DD.jsonl` files.
    #[serde(default = "default_dir")]
    pub dir: String,
    /// Records buffered before a flush.
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_dir() -> String {
    "data/snapshots".to_string()
}

fn default_max_buffer_size() -> usize {
    1
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            dir: default_dir(),
            max_buffer_size: default_max_buffer_size(),
        }
    }
}

impl PersistenceConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.dir.is_empty() {
            return Err("persistence.dir must not be empty".to_string());
        }
        if self.max_buffer_size == 0 {
            return Err("persistence.max_buffer_size must be > 0".to_string());
        }
        Ok(())
    }
}
