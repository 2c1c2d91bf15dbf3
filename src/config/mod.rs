//! Layered configuration
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. Project config (`lens.toml`, optional)
//! 3. CLI flags
//!
//! The merged value is deserialized into [`Settings`].

mod defaults;
mod effective;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{
    CacheSettings, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, JobSettings,
    PathSettings, Settings, CONFIG_FILENAME,
};
pub use merge::{deep_merge, merge_layers};
