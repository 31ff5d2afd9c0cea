//! Configuration merge system
//!
//! Implements the 3-layer configuration merge:
//! 1. Built-in defaults
//! 2. TOML config file (`--config`)
//! 3. CLI overrides (`--set section.key=value`)

mod effective;
mod engine;
mod merge;

pub use effective::{parse_overrides, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use engine::EngineConfig;
pub use merge::{deep_merge, merge_layers};
