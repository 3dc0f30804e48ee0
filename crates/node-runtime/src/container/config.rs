//! # Router Configuration
//!
//! Loaded from an optional TOML file, then environment overrides, then
//! validated. Every section falls back to its `Default` when absent.
//!
//! ## Sources (later wins)
//!
//! 1. Built-in defaults
//! 2. TOML file from the command line, or `BW_CONFIG`
//! 3. `BW_OOB_LISTEN`, `BW_LOG_LEVEL`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use bw_03_resolver::{ResolverConfig, TransactionParams};
use bw_04_chain_builder::ChainBuilderConfig;
use bw_05_terminus::TerminusConfig;
use bw_06_message_pipeline::RouterSettings;
use bw_07_oob_adapter::{OobConfig, DEFAULT_MAX_FRAME_BYTES};

/// Environment variable naming the config file.
pub const ENV_CONFIG: &str = "BW_CONFIG";
pub const ENV_OOB_LISTEN: &str = "BW_OOB_LISTEN";
pub const ENV_LOG_LEVEL: &str = "BW_LOG_LEVEL";

/// Configuration errors. Any of these stops startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete router configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    pub oob: OobSection,
    pub terminus: TerminusSection,
    pub resolver: ResolverSection,
    pub registry: RegistrySection,
    pub chain_builder: ChainBuilderSection,
    pub store: StoreSection,
    pub logging: LoggingSection,
}

/// Local client listener.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OobSection {
    pub listen: String,
    pub max_frame_bytes: usize,
}

impl Default for OobSection {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:28589".to_string(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TerminusSection {
    /// Per-subscription channel bound.
    pub queue_depth: usize,
}

impl Default for TerminusSection {
    fn default() -> Self {
        Self { queue_depth: 256 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverSection {
    pub holdoff_blocks: u64,
    pub expiry_check_interval_ms: u64,
    pub max_expiry_wait_secs: u64,
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            holdoff_blocks: 6,
            expiry_check_interval_ms: 5000,
            max_expiry_wait_secs: 3600,
        }
    }
}

/// Registry interaction and the in-memory registry's block production.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    pub confirmations: u64,
    pub timeout_blocks: u64,
    pub max_chain_age_secs: u64,
    pub block_interval_ms: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            confirmations: 2,
            timeout_blocks: 20,
            max_chain_age_secs: 300,
            block_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainBuilderSection {
    /// Concurrent builds.
    pub workers: usize,
}

impl Default for ChainBuilderSection {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Object store backend. No path keeps everything in memory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl RouterConfig {
    /// Load from `path` (or `BW_CONFIG` when `None`), apply environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(ENV_CONFIG).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(listen) = lookup(ENV_OOB_LISTEN) {
            self.oob.listen = listen;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.terminus.queue_depth == 0 {
            return invalid("terminus.queue_depth must be positive");
        }
        if self.chain_builder.workers == 0 {
            return invalid("chain_builder.workers must be positive");
        }
        if self.registry.confirmations == 0 {
            return invalid("registry.confirmations must be positive");
        }
        if self.registry.timeout_blocks < self.registry.confirmations {
            return invalid("registry.timeout_blocks must be at least registry.confirmations");
        }
        if self.registry.block_interval_ms == 0 {
            return invalid("registry.block_interval_ms must be positive");
        }
        if self.oob.max_frame_bytes == 0 {
            return invalid("oob.max_frame_bytes must be positive");
        }
        Ok(())
    }

    // =========================================================================
    // Subsystem views
    // =========================================================================

    pub fn router_settings(&self) -> RouterSettings {
        RouterSettings {
            resolver: ResolverConfig {
                holdoff_blocks: self.resolver.holdoff_blocks,
                expiry_check_interval: Duration::from_millis(self.resolver.expiry_check_interval_ms),
                max_expiry_wait: Duration::from_secs(self.resolver.max_expiry_wait_secs),
            },
            terminus: TerminusConfig {
                queue_depth: self.terminus.queue_depth,
            },
            chain_builder: ChainBuilderConfig {
                workers: self.chain_builder.workers,
                ..ChainBuilderConfig::default()
            },
            max_chain_age: Duration::from_secs(self.registry.max_chain_age_secs),
        }
    }

    pub fn transaction_params(&self) -> TransactionParams {
        TransactionParams {
            confirmations: self.registry.confirmations,
            timeout_blocks: self.registry.timeout_blocks,
        }
    }

    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.registry.block_interval_ms)
    }

    pub fn oob_config(&self) -> OobConfig {
        OobConfig {
            listen: self.oob.listen.clone(),
            max_frame_bytes: self.oob.max_frame_bytes,
            ..OobConfig::default()
        }
    }
}
