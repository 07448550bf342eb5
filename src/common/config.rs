//!
//! # Agent configuration
//!
//! Core configuration structures consumed by the worker loop and the asset processors.
//! Loading the document from disk belongs to the daemon bootstrap; this module only
//! describes its shape and defaults.
//!
//! 中文: 工作循环和资产处理器使用的核心配置结构。
//!
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Polling behaviour of the worker loop.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PollingConfig {
    /// Regular interval between two KeyScaler polls, in seconds.
    pub interval_secs: u64,
    /// Shortened interval used while a CSR is waiting for its signed certificate.
    pub certificate_wait_secs: u64,
    /// A heartbeat is logged every this many cycles (0 disables it).
    pub heartbeat_every: u64,
    /// Granularity at which the sleeping worker re-checks its stop flag, in milliseconds.
    pub tick_millis: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            certificate_wait_secs: 15,
            heartbeat_every: 12,
            tick_millis: 250,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn certificate_wait(&self) -> Duration {
        Duration::from_secs(self.certificate_wait_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }
}

/// Local storage locations and write policy.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageConfig {
    /// Destination of the group metadata asset. Empty means "not configured".
    pub group_metadata_path: PathBuf,
    /// Directory where code-signing targets are downloaded before a script runs.
    pub temp_dir: PathBuf,
    /// Unix permissions applied to private key material.
    #[serde(default = "default_file_permissions")]
    pub file_permissions: u32,
    /// Route encrypted certificates into the platform certificate store when one is available.
    pub use_certificate_store: bool,
}

fn default_file_permissions() -> u32 {
    0o600 // -rw-------
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            group_metadata_path: PathBuf::new(),
            temp_dir: std::env::temp_dir(),
            file_permissions: default_file_permissions(),
            use_certificate_store: false,
        }
    }
}

/// Identity of the device towards KeyScaler.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Edge devices announce a user agent during authentication.
    pub edge_device: bool,
    pub user_agent: String,
}

/// Script execution and reporting.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ScriptConfig {
    /// Deflate the device log before base64-encoding it into the receipt.
    pub compress_output: bool,
    /// Interpreter used by the shell executor.
    pub shell: String,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            compress_output: cfg!(feature = "script-compression"),
            shell: "/bin/sh".to_string(),
        }
    }
}

/// Complete agent configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub script: ScriptConfig,
}

impl AgentConfig {
    /// Parses an already loaded configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Deserialize(e.to_string()))
    }
}
