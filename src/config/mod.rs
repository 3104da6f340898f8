//! Application configuration: a versioned, serde config struct loaded
//! from/saved to the data directory, migrated via a small `Migrate`
//! trait, persisted as TOML.

mod migration;

pub use migration::Migrate;

use crate::shared::DeviceUid;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn default_max_concurrent_ops() -> usize {
    4
}

fn default_page_size() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 250,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutorConfig {
    #[serde(default = "default_max_concurrent_ops")]
    pub max_concurrent_ops: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GDriveConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub client_id_path: Option<PathBuf>,
    pub client_secret_path: Option<PathBuf>,
}

impl Default for GDriveConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            client_id_path: None,
            client_secret_path: None,
        }
    }
}

/// Main Outlet configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutletConfig {
    pub version: u32,
    pub data_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Stable identity for this machine's local backend. Generated once
    /// when the config is first created and kept across restarts so that
    /// `Node` snapshots written to disk under this device stay
    /// resolvable by the `UidMapper` rebuilt at the next startup.
    #[serde(default = "DeviceUid::new")]
    pub local_device_uid: DeviceUid,
    #[serde(default)]
    pub gdrive: GDriveConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl OutletConfig {
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join("outlet.toml");

        if config_path.exists() {
            info!("loading config from {:?}", config_path);
            let raw = fs::read_to_string(&config_path)?;
            let mut config: OutletConfig = toml::from_str(&raw)?;

            if config.version < Self::target_version() {
                info!(
                    "migrating config v{} -> v{}",
                    config.version,
                    Self::target_version()
                );
                config.migrate()?;
                config.save()?;
            }

            Ok(config)
        } else {
            warn!("no config found, creating default at {:?}", config_path);
            let config = Self::default_with_dir(data_dir.to_path_buf());
            config.save()?;
            Ok(config)
        }
    }

    pub fn default_with_dir(data_dir: PathBuf) -> Self {
        Self {
            version: Self::target_version(),
            data_dir,
            log_level: default_log_level(),
            local_device_uid: DeviceUid::new(),
            gdrive: GDriveConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }

    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        let config_path = self.data_dir.join("outlet.toml");
        let raw = toml::to_string_pretty(self)?;
        fs::write(&config_path, raw)?;
        Ok(())
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("staging")
    }

    pub fn cache_db_path(&self, device_uid: &str) -> PathBuf {
        self.data_dir.join(format!("cache-{device_uid}.db"))
    }

    pub fn ops_db_path(&self) -> PathBuf {
        self.data_dir.join("ops.db")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(self.staging_dir())?;
        Ok(())
    }
}

impl Migrate for OutletConfig {
    fn current_version(&self) -> u32 {
        self.version
    }

    fn target_version() -> u32 {
        1
    }

    fn migrate(&mut self) -> Result<()> {
        match self.version {
            0 => {
                self.version = 1;
                Ok(())
            }
            1 => Ok(()),
            v => Err(anyhow!("unknown config version: {}", v)),
        }
    }
}
