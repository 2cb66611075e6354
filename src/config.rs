use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ngcs::commands::{DEFAULT_TIMESTAMP_FORMAT, RunOptions};
use ngcs::ipc::client::{ClientConfig, DEFAULT_SOCKET_PATH, SOCKET_ENV};
use ngcs::ipc::codec::DEFAULT_MAX_LENGTH;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub socket: SocketConfig,
    pub status: StatusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    pub path: Option<PathBuf>,
    /// Blocking transport only; 0 disables the timeout.
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub max_frame_length: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            path: None,
            read_timeout_ms: 30000,
            write_timeout_ms: 30000,
            max_frame_length: DEFAULT_MAX_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub timestamp_format: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            socket: SocketConfig::default(),
            status: StatusConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Client settings. Socket path precedence: `--socket`, `NGCS_SOCKET`,
    /// config, built-in default.
    pub fn client_config(&self, socket_override: Option<&Path>) -> ClientConfig {
        let socket_path = socket_override
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(SOCKET_ENV).map(PathBuf::from))
            .or_else(|| self.socket.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH));

        ClientConfig {
            socket_path,
            max_frame_length: self.socket.max_frame_length,
            read_timeout: timeout(self.socket.read_timeout_ms),
            write_timeout: timeout(self.socket.write_timeout_ms),
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            timestamp_format: self.status.timestamp_format.clone(),
        }
    }
}

fn timeout(ms: u64) -> Option<Duration> {
    (ms > 0).then_some(Duration::from_millis(ms))
}
