//! Built-in defaults (layer 1)

use serde_json::{json, Value};

/// Built-in configuration values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinDefaults {
    /// Source root, relative to the project root (default: "src")
    pub src: String,

    /// Cache root, relative to the project root (default: ".lens/cache")
    pub cache: String,

    /// Tool install root handed to coverage jobs (default: ".")
    pub core: String,

    /// How long `lens cache` waits for the cache lock (default: 30)
    pub lock_timeout_seconds: u64,

    /// Preferred job execution mode (default: "in_process")
    pub jobs_mode: String,

    /// Worker threads used by the dispatcher (default: 4)
    pub jobs_workers: usize,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            src: "src".to_string(),
            cache: ".lens/cache".to_string(),
            core: ".".to_string(),
            lock_timeout_seconds: 30,
            jobs_mode: "in_process".to_string(),
            jobs_workers: 4,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to the layer representation used for merging
    pub fn to_value(&self) -> Value {
        json!({
            "paths": {
                "src": self.src,
                "cache": self.cache,
                "core": self.core,
            },
            "cache": {
                "lock_timeout_seconds": self.lock_timeout_seconds,
                "exclude": [],
            },
            "jobs": {
                "mode": self.jobs_mode,
                "workers": self.jobs_workers,
            },
            "reports": {},
        })
    }
}
