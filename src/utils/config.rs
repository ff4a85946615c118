//! TOML configuration (`waveplan.toml`)
//!
//! Every section and field has a default, so an absent file is equivalent to
//! an empty one. Analyzer tables are keyed by name:
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "pretty"
//!
//! [cache]
//! root = ".waveplan/cache"
//! ttl_secs = 604800
//!
//! [consensus]
//! source_timeout_secs = 180
//!
//! [perspectives]
//! analyzer = "claude"
//! resolution_threshold = 60
//!
//! [analyzers.claude]
//! provider = "anthropic"
//! model = "claude-sonnet-4-5"
//! api_key_env = "ANTHROPIC_API_KEY"
//!
//! [analyzers.gpt]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! ```

use crate::cache::CacheConfig;
use crate::llm::RetryPolicy;
use crate::perspectives::PerspectiveConfig;
use crate::pivot::PivotConfig;
use crate::sources::GateThresholds;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "waveplan.toml";

// ============= Root Configuration =============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveplanConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub consensus: ConsensusConfig,

    #[serde(default)]
    pub perspectives: PerspectivesConfig,

    #[serde(default)]
    pub quality: GateThresholds,

    #[serde(default)]
    pub pivot: PivotConfig,

    #[serde(default)]
    pub session: SessionConfig,

    /// Semantic analyzers keyed by name
    #[serde(default)]
    pub analyzers: BTreeMap<String, AnalyzerConfig>,
}

// ============= Logging =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// ============= Retry =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    #[serde(default = "default_max_retry_after_secs")]
    pub max_retry_after_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> f64 {
    0.2
}

fn default_max_retry_after_secs() -> u64 {
    120
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            max_retry_after_secs: default_max_retry_after_secs(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
            max_retry_after: Duration::from_secs(self.max_retry_after_secs),
        }
    }
}

// ============= Consensus =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Upper bound for one source to settle, retries included
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,

    /// Analyzers taking part in consensus; empty means every enabled analyzer
    #[serde(default)]
    pub analyzers: Vec<String>,

    /// Extra keywords per domain for the keyword classifier
    #[serde(default)]
    pub extra_keywords: BTreeMap<String, Vec<String>>,
}

fn default_source_timeout_secs() -> u64 {
    180
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            source_timeout_secs: default_source_timeout_secs(),
            analyzers: Vec::new(),
            extra_keywords: BTreeMap::new(),
        }
    }
}

// ============= Perspectives =============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerspectivesConfig {
    /// Analyzer used to generate perspectives; defaults to the first enabled one
    #[serde(default)]
    pub analyzer: Option<String>,

    #[serde(flatten)]
    pub engine: PerspectiveConfig,
}

// ============= Session =============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session directory used when `--session` is not given
    #[serde(default)]
    pub root: Option<PathBuf>,
}

// ============= Analyzers =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    OpenAI,
}

impl ProviderKind {
    pub fn default_key_env(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::OpenAI => "OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub provider: ProviderKind,
    pub model: String,
    /// Environment variable holding the API key (provider default if unset)
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-attempt timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum gap between calls to this analyzer
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_min_interval_secs() -> u64 {
    5
}

fn default_enabled() -> bool {
    true
}

impl AnalyzerConfig {
    pub fn key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_key_env())
    }
}

// ============= Errors =============

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Analyzer '{0}' referenced by {1} does not exist")]
    MissingAnalyzer(String, String),
}

// ============= Loading & Validation =============

impl WaveplanConfig {
    /// Load and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Like [`WaveplanConfig::load`], but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::FileNotFound(path)) => {
                tracing::debug!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: WaveplanConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and cross-references
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::ValidationError(msg)) };

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return invalid(format!("logging.level '{}' is not a log level", self.logging.level));
        }
        if !["pretty", "json"].contains(&self.logging.format.as_str()) {
            return invalid(format!(
                "logging.format must be \"pretty\" or \"json\", got '{}'",
                self.logging.format
            ));
        }

        if self.cache.max_entries == 0 {
            return invalid("cache.max_entries must be at least 1".to_string());
        }

        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1".to_string());
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return invalid("retry.base_delay_ms exceeds retry.max_delay_ms".to_string());
        }
        if !(0.0..1.0).contains(&retry.jitter) {
            return invalid("retry.jitter must be in [0, 1)".to_string());
        }

        if self.consensus.source_timeout_secs == 0 {
            return invalid("consensus.source_timeout_secs must be positive".to_string());
        }
        for domain in self.consensus.extra_keywords.keys() {
            if crate::types::Domain::parse_lenient(domain).is_none() {
                return invalid(format!("consensus.extra_keywords: unknown domain '{}'", domain));
            }
        }

        let p = &self.perspectives.engine;
        if p.resolution_threshold > 100 || p.backup_threshold > 100 {
            return invalid("perspective thresholds must be within 0-100".to_string());
        }
        if p.backup_threshold > p.resolution_threshold {
            return invalid(
                "perspectives.backup_threshold exceeds perspectives.resolution_threshold".to_string(),
            );
        }

        let q = &self.quality;
        for (name, value) in [
            ("max_vendor_fraction", q.max_vendor_fraction),
            ("min_independent_fraction", q.min_independent_fraction),
            ("contrarian_vendor_fraction", q.contrarian_vendor_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("quality.{} must be within 0-1", name));
            }
        }
        if q.contrarian_vendor_fraction < q.max_vendor_fraction {
            return invalid(
                "quality.contrarian_vendor_fraction is below quality.max_vendor_fraction".to_string(),
            );
        }

        if self.pivot.signal_threshold < 0.0 || self.pivot.strong_signal < self.pivot.signal_threshold {
            return invalid("pivot.strong_signal must be at least pivot.signal_threshold".to_string());
        }

        for (name, analyzer) in &self.analyzers {
            if analyzer.model.trim().is_empty() {
                return invalid(format!("analyzers.{}.model is empty", name));
            }
            if !(0.0..=2.0).contains(&analyzer.temperature) {
                return invalid(format!("analyzers.{}.temperature must be within 0-2", name));
            }
            if analyzer.timeout_secs == 0 {
                return invalid(format!("analyzers.{}.timeout_secs must be positive", name));
            }
        }

        if let Some(name) = &self.perspectives.analyzer {
            if !self.analyzers.contains_key(name) {
                return Err(ConfigError::MissingAnalyzer(
                    name.clone(),
                    "perspectives.analyzer".to_string(),
                ));
            }
        }
        for name in &self.consensus.analyzers {
            if !self.analyzers.contains_key(name) {
                return Err(ConfigError::MissingAnalyzer(
                    name.clone(),
                    "consensus.analyzers".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Enabled analyzers taking part in consensus, in name order
    pub fn consensus_analyzers(&self) -> Vec<(&String, &AnalyzerConfig)> {
        self.analyzers
            .iter()
            .filter(|(name, a)| {
                a.enabled
                    && (self.consensus.analyzers.is_empty() || self.consensus.analyzers.contains(*name))
            })
            .collect()
    }

    /// Analyzer used for perspective generation
    pub fn perspective_analyzer(&self) -> Option<(&String, &AnalyzerConfig)> {
        match &self.perspectives.analyzer {
            Some(name) => self.analyzers.get_key_value(name).filter(|(_, a)| a.enabled),
            None => self.analyzers.iter().find(|(_, a)| a.enabled),
        }
    }
}

// ============= Manager =============

/// Holds the active configuration; readers never block a reload
pub struct ConfigManager {
    config: Arc<ArcSwap<WaveplanConfig>>,
    config_path: Option<PathBuf>,
    required: bool,
}

impl ConfigManager {
    /// Load from `path`, falling back to defaults if the file is absent
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let config = WaveplanConfig::load_or_default(&path)?;
        Ok(Self::with_path(config, path, false))
    }

    /// Load from `path`; a missing file is an error here and on reload
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let config = WaveplanConfig::load(&path)?;
        Ok(Self::with_path(config, path, true))
    }

    fn with_path(config: WaveplanConfig, path: PathBuf, required: bool) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: Some(path),
            required,
        }
    }

    /// Wrap an in-memory configuration (no file to reload from)
    pub fn from_config(config: WaveplanConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: None,
            required: false,
        }
    }

    /// Current configuration (lockless read)
    pub fn config(&self) -> Arc<WaveplanConfig> {
        self.config.load_full()
    }

    pub fn path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Re-read the file; on error the previous configuration stays active
    pub fn reload(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.config_path else {
            return Ok(());
        };
        info!("Reloading configuration from {:?}", path);
        let config = if self.required {
            WaveplanConfig::load(path)?
        } else {
            WaveplanConfig::load_or_default(path)?
        };
        self.config.store(Arc::new(config));
        info!("Configuration reloaded successfully");
        Ok(())
    }
}
