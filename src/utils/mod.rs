/// TOML configuration and the reloadable config manager.
pub mod config;
/// Atomic JSON writes.
pub mod fs;

pub use config::{ConfigError, ConfigManager, WaveplanConfig};
