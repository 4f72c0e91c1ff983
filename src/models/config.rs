use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::utils::path::{get_config_path, get_data_dir};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "DOCTRACK_CONFIG";

/// How tracking codes are generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeScheme {
    /// PREFIX-YYYY-NNN, next number after the highest existing one
    #[default]
    Sequential,
    /// PREFIX-YYYYMMDD-NNNN with a random four digit suffix
    Random,
}

impl fmt::Display for CodeScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Random => write!(f, "random"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub upload_dir: PathBuf,
    pub backup_dir: PathBuf,
    /// Flat JSON snapshot of all documents
    pub export_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = get_data_dir();

        Self {
            database_path: data_dir.join("doctrack.db"),
            upload_dir: data_dir.join("uploads"),
            backup_dir: data_dir.join("backups"),
            export_path: data_dir.join("document_tracking.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a session is cleared
    pub timeout_secs: u64,
    pub cookie_name: String,
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 1800,
            cookie_name: "doctrack_session".into(),
            secure_cookie: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_bytes: usize,
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 16 * 1024 * 1024,
            allowed_extensions: [
                "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "csv", "png", "jpg",
                "jpeg", "gif",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub scheme: CodeScheme,
    pub prefix: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            scheme: CodeScheme::Sequential,
            prefix: "DOC".into(),
        }
    }
}

/// First administrator, created when the user table is empty
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub admin_username: String,
    pub admin_email: String,
    /// When unset a random password is generated and logged once
    pub admin_password: Option<String>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            admin_username: "admin".into(),
            admin_email: "admin@localhost".into(),
            admin_password: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: Option<String>,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub uploads: UploadConfig,
    pub tracking: TrackingConfig,
    pub bootstrap: BootstrapConfig,
}

impl AppConfig {
    /// Load from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {:?}", path))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Invalid config file: {:?}", path))?;

        Ok(config)
    }

    /// Load from `$DOCTRACK_CONFIG`, falling back to the platform config path
    pub fn from_env() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(get_config_path);
        Self::load(&path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn log_level(&self) -> tracing::Level {
        self.log_level
            .as_deref()
            .and_then(|l| l.parse().ok())
            .unwrap_or(tracing::Level::INFO)
    }

    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.storage.upload_dir)?;
        std::fs::create_dir_all(&self.storage.backup_dir)?;
        if let Some(parent) = self.storage.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Configuration rooted in one directory (used by tests and demos)
    pub fn with_data_dir(dir: &Path) -> Self {
        Self {
            storage: StorageConfig {
                database_path: dir.join("doctrack.db"),
                upload_dir: dir.join("uploads"),
                backup_dir: dir.join("backups"),
                export_path: dir.join("document_tracking.json"),
            },
            ..Default::default()
        }
    }
}
