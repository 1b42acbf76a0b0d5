//! Configuration and credential storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::auth::{StoreError, TokenStore};

pub const DEFAULT_BASE_URL: &str =
    "https://reappbackend-c4cuaygbgehpdvfm.centralindia-01.azurewebsites.net";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend origin; endpoint paths are appended to it
    pub base_url: String,
    /// Pincodes the pickup service currently operates in
    pub serviceable_pincodes: Vec<String>,
    /// Role sent when registering a new user
    pub user_role: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            serviceable_pincodes: ["500001", "500002", "600001", "110001"]
                .into_iter()
                .map(String::from)
                .collect(),
            user_role: "User".to_string(),
        }
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "pickup-cli", "pickup-cli")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Path of the durable token file
    pub fn credentials_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("credentials.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn is_serviceable(&self, pincode: &str) -> bool {
        self.serviceable_pincodes.iter().any(|p| p == pincode.trim())
    }
}

/// On-disk layout of the credential file; keys match the backend's names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(rename = "refreshToken", skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

/// Token store backed by a TOML file, cached in memory after the first read.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    cache: Mutex<Option<CredentialFile>>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Config::credentials_path()?))
    }

    fn read(&self) -> Result<CredentialFile, StoreError> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ref cached) = *cache {
            return Ok(cached.clone());
        }

        let file = match fs::read_to_string(&self.path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CredentialFile::default(),
            Err(e) => return Err(e.into()),
        };
        *cache = Some(file.clone());
        Ok(file)
    }

    /// Write to a sibling temp file and rename over the target, so readers
    /// never observe a half-written pair.
    fn write(&self, file: CredentialFile) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let dir = self.path.parent().ok_or(StoreError::Location)?;
        fs::create_dir_all(dir)?;

        let tmp = dir.join(format!(".credentials-{}.tmp", uuid::Uuid::new_v4()));
        let content = toml::to_string_pretty(&file)?;
        let written =
            write_private(&tmp, content.as_bytes()).and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        *cache = Some(file);
        Ok(())
    }
}

/// Create `path` owner-only (0600 on unix) and fill it.
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(content)?;
    file.sync_all()
}

impl TokenStore for FileTokenStore {
    fn get_access_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.read()?.access_token)
    }

    fn get_refresh_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.read()?.refresh_token)
    }

    fn set_tokens(&self, access: &str, refresh: &str) -> Result<(), StoreError> {
        self.write(CredentialFile {
            access_token: Some(access.to_string()),
            refresh_token: Some(refresh.to_string()),
        })
    }

    fn clear_tokens(&self) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        *cache = Some(CredentialFile::default());
        Ok(())
    }
}
