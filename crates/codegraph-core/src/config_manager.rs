use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Configuration for documentation walks
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DocWalkConfig {
    /// Worker pool and fallback settings
    #[serde(default)]
    pub walker: WalkerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Worker pool and fallback settings for the bottom-up walker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalkerConfig {
    /// Size of the shared worker pool
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// How long a worker waits for a node owned by another worker before
    /// falling back to a degraded result
    #[serde(default = "default_fallback_timeout_seconds")]
    pub fallback_timeout_seconds: f64,

    /// Upper bound for one artifact generation call
    #[serde(default = "default_generation_timeout_seconds")]
    pub generation_timeout_seconds: f64,

    /// Reuse artifacts already persisted in the graph store
    #[serde(default = "default_use_existing_artifacts")]
    pub use_existing_artifacts: bool,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            fallback_timeout_seconds: default_fallback_timeout_seconds(),
            generation_timeout_seconds: default_generation_timeout_seconds(),
            use_existing_artifacts: default_use_existing_artifacts(),
        }
    }
}

impl WalkerConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout_seconds = timeout.as_secs_f64();
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Per-wait timeout. Values that are not a valid duration fall back to
    /// the default.
    pub fn fallback_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.fallback_timeout_seconds)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_fallback_timeout_seconds()))
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.generation_timeout_seconds)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_generation_timeout_seconds()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::ValidationError(
                "max_workers must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("fallback_timeout_seconds", self.fallback_timeout_seconds),
            ("generation_timeout_seconds", self.generation_timeout_seconds),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be a positive number of seconds, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "compact", "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_max_workers() -> usize {
    num_cpus::get().max(1)
}
fn default_fallback_timeout_seconds() -> f64 {
    30.0
}
fn default_generation_timeout_seconds() -> f64 {
    120.0
}
fn default_use_existing_artifacts() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager
pub struct ConfigManager {
    config: DocWalkConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.codegraph.toml)
    /// 3. Sensible defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading documentation walk configuration");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        info!(
            config_file = %config_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "NONE (using defaults)".to_string()),
            max_workers = config.walker.max_workers,
            fallback_timeout_seconds = config.walker.fallback_timeout_seconds,
            "Configuration loaded"
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load configuration from an explicit file. Environment overrides are not applied.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::read_toml_file(path)?;
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Wrap an already-built configuration after validating it.
    pub fn from_config(config: DocWalkConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    /// Load .env file if it exists
    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            } else {
                info!("Loaded .env file from current directory");
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".codegraph.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .codegraph.env: {}", e);
                } else {
                    info!("Loaded .codegraph.env from home directory");
                }
            }
        }
    }

    /// Find and load config file
    /// Search order:
    /// 1. ./.codegraph.toml (current directory)
    /// 2. ~/.codegraph/config.toml (user config)
    /// 3. Use defaults
    fn load_config_file() -> Result<(DocWalkConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".codegraph.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".codegraph").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        info!("No config file found, using defaults");
        Ok((DocWalkConfig::default(), None))
    }

    /// Read TOML config file
    fn read_toml_file(path: &Path) -> Result<DocWalkConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(config: DocWalkConfig) -> DocWalkConfig {
        Self::apply_overrides_from(config, |key| std::env::var(key).ok())
    }

    fn apply_overrides_from(
        mut config: DocWalkConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> DocWalkConfig {
        if let Some(workers) = lookup("CODEGRAPH_MAX_WORKERS") {
            match workers.parse() {
                Ok(n) => config.walker.max_workers = n,
                Err(_) => warn!("Ignoring invalid CODEGRAPH_MAX_WORKERS: {}", workers),
            }
        }
        if let Some(timeout) = lookup("CODEGRAPH_FALLBACK_TIMEOUT_SECONDS") {
            match timeout.parse() {
                Ok(secs) => config.walker.fallback_timeout_seconds = secs,
                Err(_) => warn!("Ignoring invalid CODEGRAPH_FALLBACK_TIMEOUT_SECONDS: {}", timeout),
            }
        }
        if let Some(timeout) = lookup("CODEGRAPH_GENERATION_TIMEOUT_SECONDS") {
            match timeout.parse() {
                Ok(secs) => config.walker.generation_timeout_seconds = secs,
                Err(_) => warn!(
                    "Ignoring invalid CODEGRAPH_GENERATION_TIMEOUT_SECONDS: {}",
                    timeout
                ),
            }
        }
        if let Some(reuse) = lookup("CODEGRAPH_USE_EXISTING_ARTIFACTS") {
            config.walker.use_existing_artifacts = reuse.to_lowercase() == "true" || reuse == "1";
        }

        if let Some(level) = lookup("RUST_LOG") {
            config.logging.level = level;
        }
        if let Some(format) = lookup("CODEGRAPH_LOG_FORMAT") {
            config.logging.format = format;
        }

        config
    }

    /// Validate configuration
    pub fn validate_config(config: &DocWalkConfig) -> Result<(), ConfigError> {
        config.walker.validate()?;

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, compact, json",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &DocWalkConfig {
        &self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = DocWalkConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}
