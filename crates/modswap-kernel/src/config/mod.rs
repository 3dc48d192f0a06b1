//! Configuration
//!
//! [`ModswapConfig`] is read once at startup. The file format is detected
//! from the extension (YAML, TOML, JSON, INI, RON, JSON5) and `${VAR}` /
//! `$VAR` references are substituted from the environment before parsing.
//! Variables prefixed with `MODSWAP__` override file values
//! (`MODSWAP__AUTO_LOAD__ENABLED=true`).

use config::{Config as Cfg, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::info;

use crate::error::{KernelError, KernelResult};


/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "MODSWAP";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Detect configuration format from file extension
pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "ini" => Ok(FileFormat::Ini),
        "ron" => Ok(FileFormat::Ron),
        "json5" => Ok(FileFormat::Json5),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

static BRACED_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("braced variable pattern is valid")
});

static BARE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("bare variable pattern is valid")
});

/// Substitute environment variables in a string.
///
/// Unknown variables are left untouched.
pub fn substitute_env_vars(content: &str) -> String {
    let braced = BRACED_VAR.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    BARE_VAR
        .replace_all(&braced, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string()
}

/// Load configuration from a string with explicit format
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let substituted = substitute_env_vars(content);

    Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Load configuration from a file, with `<prefix>__` environment overrides
pub fn load_with_env<T>(path: &str, env_prefix: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let substituted = substitute_env_vars(&content);

    Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Schedule of one watch-loop timer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub enabled: bool,
    pub check_every_seconds: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            check_every_seconds: 10,
        }
    }
}

impl TimerConfig {
    pub fn enabled_every(seconds: u64) -> Self {
        Self {
            enabled: true,
            check_every_seconds: seconds,
        }
    }

    /// Check period, never shorter than one second
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_every_seconds.max(1))
    }
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModswapConfig {
    /// Directory holding module archives
    pub module_dir: PathBuf,
    /// Load-eligible archive extension, without the dot
    pub extension: String,
    /// Modules exempt from bulk and automatic operations
    pub ignored_modules: Vec<String>,
    pub auto_load: TimerConfig,
    pub auto_unload: TimerConfig,
    pub auto_reload: TimerConfig,
    /// Delay between enabling a module and mirroring its commands into the tree dispatcher
    pub command_sync_delay_ms: u64,
    /// Fall back to handler inspection when the alias convention does not identify an owner
    pub structural_owner_lookup: bool,
    /// Deadline for gentle-unload negotiation. Unset means wait indefinitely.
    pub negotiation_timeout_secs: Option<u64>,
}

impl Default for ModswapConfig {
    fn default() -> Self {
        Self {
            module_dir: PathBuf::from("modules"),
            extension: "jar".to_string(),
            ignored_modules: Vec::new(),
            auto_load: TimerConfig::default(),
            auto_unload: TimerConfig::default(),
            auto_reload: TimerConfig::default(),
            command_sync_delay_ms: 500,
            structural_owner_lookup: true,
            negotiation_timeout_secs: None,
        }
    }
}

impl ModswapConfig {
    /// Defaults rooted at `module_dir`
    pub fn with_module_dir<P: AsRef<Path>>(module_dir: P) -> Self {
        Self {
            module_dir: module_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Read the configuration file at `path`.
    ///
    /// A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> KernelResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let path_str = path.to_str().ok_or_else(|| {
            Report::new(KernelError::Config(ConfigError::UnsupportedFormat(
                "non UTF-8 path".to_string(),
            )))
        })?;

        let config: Self = load_with_env(path_str, ENV_PREFIX)
            .map_err(KernelError::from)
            .map_err(Report::new)
            .attach(format!("loading {}", path.display()))?;

        config
            .validate()
            .map_err(KernelError::from)
            .map_err(Report::new)
            .attach(format!("validating {}", path.display()))?;

        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> ConfigResult<()> {
        if self.extension.is_empty() || self.extension.starts_with('.') {
            return Err(ConfigError::Invalid {
                key: "extension",
                reason: format!("'{}' must be non-empty and given without a dot", self.extension),
            });
        }

        for (key, timer) in [
            ("auto_load", &self.auto_load),
            ("auto_unload", &self.auto_unload),
            ("auto_reload", &self.auto_reload),
        ] {
            if timer.enabled && timer.check_every_seconds == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "check_every_seconds must be at least 1".to_string(),
                });
            }
        }

        if self.negotiation_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                key: "negotiation_timeout_secs",
                reason: "use no value instead of 0 to wait indefinitely".to_string(),
            });
        }

        Ok(())
    }

    pub fn command_sync_delay(&self) -> Duration {
        Duration::from_millis(self.command_sync_delay_ms)
    }

    pub fn negotiation_timeout(&self) -> Option<Duration> {
        self.negotiation_timeout_secs.map(Duration::from_secs)
    }

    /// Whether `path` carries the load-eligible extension (case-insensitive)
    pub fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }

    /// Whether any watch-loop timer is enabled
    pub fn any_timer_enabled(&self) -> bool {
        self.auto_load.enabled || self.auto_unload.enabled || self.auto_reload.enabled
    }
}
