use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config file {path}: {err}", path = .0.display(), err = .1)]
    ReadFailed(path::PathBuf, #[source] std::io::Error),
    #[error("failed to write config file {path}: {err}", path = .0.display(), err = .1)]
    WriteFailed(path::PathBuf, #[source] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path available (neither XDG_CONFIG_HOME nor HOME is set)")]
    ConfigPathUnavailable,
    #[error("invalid value {value:?} for {name}")]
    InvalidOverride { name: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub worker: WorkerConfig,
    pub server: ServerConfig,
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub check_interval_seconds: u64,
    pub batch_limit: usize,
    pub request_timeout_seconds: f64,
    pub max_concurrent_probes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub path: String,
    pub sync_on_start: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "chainwatch.db".into() }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { check_interval_seconds: 30, batch_limit: 100, request_timeout_seconds: 5.0, max_concurrent_probes: 16 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 8080 }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { path: "networks.toml".into(), sync_on_start: true }
    }
}

/// Upper bound for `worker.request_timeout_seconds`
pub const MAX_REQUEST_TIMEOUT_SECONDS: f64 = 3600.0;

impl WorkerConfig {
    pub fn check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.check_interval_seconds)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        let fallback = std::time::Duration::from_secs(5);
        let seconds = self.request_timeout_seconds;
        if seconds.is_nan() {
            return fallback;
        }
        std::time::Duration::try_from_secs_f64(seconds.min(MAX_REQUEST_TIMEOUT_SECONDS)).unwrap_or(fallback)
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/chainwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("chainwatch/config.toml"))
}

fn parse_override<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, Error> {
    value.trim().parse().map_err(|_| Error::InvalidOverride { name, value })
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_title_1(f, "Worker")?;
        write_1(f, "Check Interval (s)", &self.worker.check_interval_seconds)?;
        write_1(f, "Batch Limit", &self.worker.batch_limit)?;
        write_1(f, "Request Timeout (s)", &self.worker.request_timeout_seconds)?;
        write_1(f, "Max Concurrent Probes", &self.worker.max_concurrent_probes)?;
        write_title_1(f, "Server")?;
        write_1(f, "Bind Address", &self.server.bind)?;
        write_1(f, "Port", &self.server.port)?;
        write_title_1(f, "Registry")?;
        write_1(f, "Path", &self.registry.path)?;
        write_1(f, "Sync On Start", &self.registry.sync_on_start)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/chainwatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```no_run
    /// use chainwatch_service::config::Config;
    ///
    /// let cfg = Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), chainwatch_service::config::Error>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string =
                fs::read_to_string(&config_path).map_err(|err| Error::ReadFailed(config_path.clone(), err))?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Load the file, then apply environment overrides and validate
    pub fn load(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let mut config = Self::from_config(optional_path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::WriteFailed(path.to_path_buf(), err))?;
        }

        std::fs::write(path, config_str).map_err(|err| Error::WriteFailed(path.to_path_buf(), err))
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), Error> {
        self.apply_overrides(|name| env::var(name).ok())
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), Error> {
        if let Some(value) = lookup("CHECK_INTERVAL_SECONDS") {
            self.worker.check_interval_seconds = parse_override("CHECK_INTERVAL_SECONDS", value)?;
        }
        if let Some(value) = lookup("BATCH_LIMIT") {
            self.worker.batch_limit = parse_override("BATCH_LIMIT", value)?;
        }
        if let Some(value) = lookup("REQUEST_TIMEOUT") {
            self.worker.request_timeout_seconds = parse_override("REQUEST_TIMEOUT", value)?;
        }
        if let Some(value) = lookup("CHAINWATCH_DATABASE") {
            self.database.path = value;
        }
        if let Some(value) = lookup("CHAINWATCH_REGISTRY") {
            self.registry.path = value;
        }
        if let Some(value) = lookup("CHAINWATCH_BIND") {
            self.server.bind = value;
        }
        if let Some(value) = lookup("CHAINWATCH_PORT") {
            self.server.port = parse_override("CHAINWATCH_PORT", value)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.worker.check_interval_seconds == 0 {
            return Err(Error::Invalid("worker.check_interval_seconds must be at least 1".into()));
        }
        if self.worker.batch_limit == 0 {
            return Err(Error::Invalid("worker.batch_limit must be at least 1".into()));
        }
        if self.worker.max_concurrent_probes == 0 {
            return Err(Error::Invalid("worker.max_concurrent_probes must be at least 1".into()));
        }
        let timeout = self.worker.request_timeout_seconds;
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(Error::Invalid(format!("worker.request_timeout_seconds must be positive, got {timeout}")));
        }
        if timeout > MAX_REQUEST_TIMEOUT_SECONDS {
            return Err(Error::Invalid(format!(
                "worker.request_timeout_seconds must be at most {MAX_REQUEST_TIMEOUT_SECONDS}, got {timeout}"
            )));
        }

        Ok(())
    }
}
