//! Configuration management for docarrow
//!
//! This module handles loading, parsing, and managing configuration from various sources:
//! - Configuration files (TOML format)
//! - Environment variables
//! - Command-line arguments
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::executor::Strategy;

/// Environment variable overriding `connection.default_uri`
pub const ENV_URI: &str = "DOCARROW_URI";
/// Environment variable overriding `export.strategy`
pub const ENV_STRATEGY: &str = "DOCARROW_STRATEGY";
/// Environment variable overriding `export.workers`
pub const ENV_WORKERS: &str = "DOCARROW_WORKERS";
/// Environment variable overriding `logging.level`
pub const ENV_LOG_LEVEL: &str = "DOCARROW_LOG_LEVEL";
/// Environment variable naming the multi-process worker binary
pub const ENV_WORKER_PROGRAM: &str = "DOCARROW_WORKER_PROGRAM";

/// File name of the binary that serves `worker` requests
pub const WORKER_BINARY: &str = "docarrow";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Export configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Default MongoDB connection URI
    #[serde(default = "default_uri")]
    pub default_uri: String,

    /// Connection and server selection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Application name reported to the server
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

/// Export pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Execution strategy
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,

    /// Number of partitions and concurrent workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Records requested per round trip
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: u32,

    /// Order rows by partition index instead of completion
    #[serde(default = "default_deterministic_order")]
    pub deterministic_order: bool,

    /// Field defining the stable order partitions are cut from
    #[serde(default = "default_sort_key")]
    pub sort_key: String,

    /// Binary started for multi-process workers (see [`ExportConfig::worker_program`])
    #[serde(default)]
    pub worker_program: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_app_name() -> String {
    "docarrow".to_string()
}

fn default_strategy() -> Strategy {
    Strategy::Sequential
}

fn default_workers() -> usize {
    4
}

fn default_fetch_batch_size() -> u32 {
    1000
}

fn default_deterministic_order() -> bool {
    true
}

fn default_sort_key() -> String {
    "_id".to_string()
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    false
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            default_uri: default_uri(),
            timeout: default_timeout(),
            app_name: default_app_name(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            workers: default_workers(),
            fetch_batch_size: default_fetch_batch_size(),
            deterministic_order: default_deterministic_order(),
            sort_key: default_sort_key(),
            worker_program: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::InvalidFormat(format!("{}: {e}", path.display()))
            }
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load configuration with file and environment precedence
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DOCARROW_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup(ENV_URI) {
            self.connection.default_uri = uri;
        }
        if let Some(strategy) = lookup(ENV_STRATEGY) {
            self.export.strategy = strategy.parse().map_err(|_| invalid(ENV_STRATEGY, &strategy))?;
        }
        if let Some(workers) = lookup(ENV_WORKERS) {
            self.export.workers = workers
                .trim()
                .parse()
                .map_err(|_| invalid(ENV_WORKERS, &workers))?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level.parse().map_err(|_| invalid(ENV_LOG_LEVEL, &level))?;
        }
        if let Some(program) = lookup(ENV_WORKER_PROGRAM).filter(|p| !p.is_empty()) {
            self.export.worker_program = Some(PathBuf::from(program));
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".docarrow")
            .join("config.toml")
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.export.workers == 0 {
            return Err(invalid("export.workers", "0").into());
        }
        if self.export.fetch_batch_size == 0 {
            return Err(invalid("export.fetch_batch_size", "0").into());
        }
        if self.export.sort_key.trim().is_empty() {
            return Err(invalid("export.sort_key", &self.export.sort_key).into());
        }
        if self.connection.timeout == 0 {
            return Err(invalid("connection.timeout", "0").into());
        }
        Ok(())
    }

    /// Get connection timeout as Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.timeout)
    }
}

impl ExportConfig {
    /// Worker count, rejecting zero
    pub fn worker_count(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.workers).ok_or_else(|| invalid("export.workers", "0").into())
    }

    /// Binary to start for multi-process workers
    ///
    /// Tried in order: `export.worker_program`, `DOCARROW_WORKER_PROGRAM`,
    /// the running executable if it is `docarrow` itself, and `docarrow` on
    /// `PATH`. A library caller's own executable is never used.
    pub fn worker_program(&self) -> Result<PathBuf> {
        self.resolve_worker_program(|key| std::env::var_os(key), std::env::current_exe().ok())
    }

    /// [`ExportConfig::worker_program`] over an arbitrary environment
    pub fn resolve_worker_program<F>(
        &self,
        lookup: F,
        current_exe: Option<PathBuf>,
    ) -> Result<PathBuf>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        if let Some(path) = &self.worker_program {
            return Ok(path.clone());
        }
        if let Some(path) = lookup(ENV_WORKER_PROGRAM).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        if let Some(exe) = current_exe.filter(|exe| is_worker_binary(exe)) {
            return Ok(exe);
        }
        if let Some(found) = lookup("PATH").and_then(|paths| find_on_path(&paths)) {
            return Ok(found);
        }

        Err(ConfigError::MissingValue {
            field: "export.worker_program".to_string(),
            hint: format!("set {ENV_WORKER_PROGRAM} or install {WORKER_BINARY} on PATH"),
        }
        .into())
    }
}

fn is_worker_binary(path: &Path) -> bool {
    path.file_stem().is_some_and(|stem| stem == WORKER_BINARY)
}

fn find_on_path(paths: &OsStr) -> Option<PathBuf> {
    let file_name = format!("{WORKER_BINARY}{}", std::env::consts::EXE_SUFFIX);
    std::env::split_paths(paths)
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
}

fn invalid(field: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.default_uri, "mongodb://localhost:27017");
        assert_eq!(config.export.strategy, Strategy::Sequential);
        assert!(config.export.deterministic_order);
        assert_eq!(config.export.sort_key, "_id");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [export]
            strategy = "multiprocess"
            workers = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.export.strategy, Strategy::Multiprocess);
        assert_eq!(config.export.workers, 8);
        assert_eq!(config.export.fetch_batch_size, 1000);
        assert_eq!(config.connection.timeout, 30);
        assert_eq!(config.logging.level, LogLevel::Warn);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let err = Config::from_toml("[export]\nworkers = \"many\"").unwrap_err();
        assert!(matches!(err, ExportError::Config(ConfigError::InvalidFormat(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_from(env(&[
                (ENV_URI, "mongodb://db:27017"),
                (ENV_STRATEGY, "threads"),
                (ENV_WORKERS, "6"),
                (ENV_LOG_LEVEL, "debug"),
                (ENV_WORKER_PROGRAM, "/opt/bin/docarrow"),
            ]))
            .unwrap();
        assert_eq!(
            config.export.worker_program,
            Some(PathBuf::from("/opt/bin/docarrow"))
        );
        assert_eq!(config.connection.default_uri, "mongodb://db:27017");
        assert_eq!(config.export.strategy, Strategy::Multithreaded);
        assert_eq!(config.export.workers, 6);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_bad_env_value_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env_from(env(&[(ENV_WORKERS, "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_WORKERS));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.export.workers = 0;
        assert!(config.validate().is_err());
        assert!(config.export.worker_count().is_err());

        let mut config = Config::default();
        config.export.fetch_batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.export.sort_key = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_program_prefers_configured_path() {
        let mut export = ExportConfig::default();
        export.worker_program = Some(PathBuf::from("/opt/docarrow/bin/docarrow"));
        let program = export
            .resolve_worker_program(
                |_| Some(OsString::from("/elsewhere/docarrow")),
                Some(PathBuf::from("/usr/bin/docarrow")),
            )
            .unwrap();
        assert_eq!(program, PathBuf::from("/opt/docarrow/bin/docarrow"));
    }

    #[test]
    fn test_worker_program_from_env_then_own_binary() {
        let export = ExportConfig::default();
        let program = export
            .resolve_worker_program(
                |key| (key == ENV_WORKER_PROGRAM).then(|| OsString::from("/srv/docarrow")),
                Some(PathBuf::from("/usr/bin/docarrow")),
            )
            .unwrap();
        assert_eq!(program, PathBuf::from("/srv/docarrow"));

        let program = export
            .resolve_worker_program(|_| None, Some(PathBuf::from("/usr/bin/docarrow")))
            .unwrap();
        assert_eq!(program, PathBuf::from("/usr/bin/docarrow"));
    }

    #[test]
    fn test_worker_program_never_reuses_foreign_executable() {
        let export = ExportConfig::default();
        let err = export
            .resolve_worker_program(|_| None, Some(PathBuf::from("/home/me/target/debug/my-app")))
            .unwrap_err();
        match err {
            ExportError::Config(ConfigError::MissingValue { field, hint }) => {
                assert_eq!(field, "export.worker_program");
                assert!(hint.contains(ENV_WORKER_PROGRAM));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_worker_program_found_on_path() {
        let dir = std::env::temp_dir().join(format!("docarrow-path-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let binary = dir.join(format!("{WORKER_BINARY}{}", std::env::consts::EXE_SUFFIX));
        std::fs::write(&binary, b"").unwrap();

        let path = std::env::join_paths([PathBuf::from("/nonexistent"), dir.clone()]).unwrap();
        let program = ExportConfig::default()
            .resolve_worker_program(
                |key| (key == "PATH").then(|| path.clone()),
                Some(PathBuf::from("/usr/bin/python3")),
            )
            .unwrap();
        assert_eq!(program, binary);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.export.worker_program = Some(PathBuf::from("/usr/local/bin/docarrow"));
        let reparsed = Config::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_connection_timeout() {
        let config = Config::default();
        assert_eq!(config.connection_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/docarrow.toml").unwrap_err();
        assert!(matches!(err, ExportError::Config(ConfigError::FileNotFound(_))));
    }
}
