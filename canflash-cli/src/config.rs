//! Configuration file support for canflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (CANFLASH_*)
//! 3. Local config file (./canflash.toml)
//! 4. Global config file (~/.config/canflash/config.toml)
//!
//! ```toml
//! [connection]
//! interface = "can0"
//! timeout_secs = 5.0
//!
//! [update]
//! build_dir = "build_fw_deploy"
//!
//! [commits]
//! repository = "UBCFormulaElectric/Consolidated-Firmware"
//! api_url = "https://api.github.com"
//!
//! [[board]]
//! name = "bench"
//! mcu = "STM32F412xx"
//! start_update_can_id = 1400
//! update_ack_can_id = 1401
//! path = "firmware/dev/bench/bench_app_metadata.hex"
//! ```

use crate::CliError;
use crate::lookup::{DEFAULT_API_URL, DEFAULT_REPOSITORY};
use canflash::{Board, Catalog, Microcontroller};
use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Interface used when nothing else is configured.
pub const DEFAULT_INTERFACE: &str = "can0";

/// Build directory used when nothing else is configured.
pub const DEFAULT_BUILD_DIR: &str = "build_fw_deploy";

/// Local configuration file name.
pub const LOCAL_CONFIG_FILE: &str = "canflash.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// SocketCAN interface (e.g., "can0" or "vcan0").
    pub interface: Option<String>,
    /// Per-phase reply timeout in seconds.
    pub timeout_secs: Option<f64>,
}

/// Update configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Firmware build directory that board image paths are relative to.
    pub build_dir: Option<PathBuf>,
}

/// Commit lookup configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitsConfig {
    /// GitHub repository ("owner/name") the firmware is built from.
    pub repository: Option<String>,
    /// GitHub REST API root.
    pub api_url: Option<String>,
}

/// A board defined in a config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardEntry {
    /// Board name; also becomes a configuration of its own.
    pub name: String,
    /// Microcontroller part name (STM32F412xx or STM32H733xx).
    pub mcu: String,
    /// Start-update command identifier.
    pub start_update_can_id: u16,
    /// Update-ack reply identifier.
    pub update_ack_can_id: u16,
    /// Image path relative to the build directory.
    pub path: PathBuf,
}

impl BoardEntry {
    fn to_board(&self) -> Result<Board, CliError> {
        let mcu = Microcontroller::from_name(&self.mcu).ok_or_else(|| {
            CliError::Config(format!(
                "board '{}': unknown microcontroller '{}'",
                self.name, self.mcu
            ))
        })?;
        Ok(Board::new(
            self.name.as_str(),
            self.start_update_can_id,
            self.update_ack_can_id,
            Arc::new(mcu),
            self.path.as_path(),
        ))
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Update configuration.
    #[serde(default)]
    pub update: UpdateConfig,
    /// Commit lookup configuration.
    #[serde(default)]
    pub commits: CommitsConfig,
    /// Custom boards.
    #[serde(default, rename = "board")]
    pub boards: Vec<BoardEntry>,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config-file flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "canflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one. Boards with the same name are
    /// replaced.
    fn merge(&mut self, other: Self) {
        if other.connection.interface.is_some() {
            self.connection.interface = other.connection.interface;
        }
        if other.connection.timeout_secs.is_some() {
            self.connection.timeout_secs = other.connection.timeout_secs;
        }
        if other.update.build_dir.is_some() {
            self.update.build_dir = other.update.build_dir;
        }
        if other.commits.repository.is_some() {
            self.commits.repository = other.commits.repository;
        }
        if other.commits.api_url.is_some() {
            self.commits.api_url = other.commits.api_url;
        }

        for board in other.boards {
            self.boards.retain(|b| b.name != board.name);
            self.boards.push(board);
        }
    }

    /// CAN interface, preferring the command line.
    pub fn interface(&self, cli: Option<&str>) -> String {
        cli.or(self.connection.interface.as_deref())
            .unwrap_or(DEFAULT_INTERFACE)
            .to_string()
    }

    /// Reply timeout, preferring the command line.
    pub fn timeout(&self, cli: Option<f64>) -> Result<Duration, CliError> {
        match cli.or(self.connection.timeout_secs) {
            None => Ok(canflash::bootloader::DEFAULT_TIMEOUT),
            Some(secs) => Duration::try_from_secs_f64(secs)
                .ok()
                .filter(|d| !d.is_zero())
                .ok_or_else(|| CliError::Usage(format!("invalid timeout: {secs} seconds"))),
        }
    }

    /// Build directory, preferring the command line.
    pub fn build_dir(&self, cli: Option<&Path>) -> PathBuf {
        cli.map(Path::to_path_buf)
            .or_else(|| self.update.build_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BUILD_DIR))
    }

    /// Repository commit hashes are looked up in.
    pub fn repository(&self) -> &str {
        self.commits.repository.as_deref().unwrap_or(DEFAULT_REPOSITORY)
    }

    /// GitHub API root for commit lookups.
    pub fn api_url(&self) -> &str {
        self.commits.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    /// Built-in catalog extended with the custom boards. Each custom board
    /// gets a configuration named after it.
    pub fn catalog(&self) -> Result<Catalog, CliError> {
        let mut catalog = Catalog::builtin();
        for entry in &self.boards {
            catalog.insert(entry.name.as_str(), vec![entry.to_board()?]);
        }
        Ok(catalog)
    }
}
