use crate::{PeerwatchError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerwatchConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay between poll cycles in milliseconds
    pub interval_ms: u64,
    /// Drop results from a cycle older than the newest one already applied
    pub discard_stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Largest file accepted for upload (in bytes)
    pub max_upload_bytes: u64,
    /// How long a finished upload keeps showing as complete
    pub completion_grace_ms: u64,
    /// Where downloaded files are written; current directory when unset
    pub download_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiConfig {
    pub notification_ttl_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            request_timeout_ms: 5_000,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            discard_stale: false,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: crate::guard::MAX_UPLOAD_BYTES,
            completion_grace_ms: 1_000,
            download_dir: None,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            notification_ttl_ms: 3_000,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl TransferConfig {
    pub fn completion_grace(&self) -> Duration {
        Duration::from_millis(self.completion_grace_ms)
    }
}

impl UiConfig {
    pub fn notification_ttl(&self) -> Duration {
        Duration::from_millis(self.notification_ttl_ms)
    }
}

impl PeerwatchConfig {
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|d| d.join("peerwatch"))
            .ok_or_else(|| PeerwatchError::Config("Unable to determine config directory".to_string()))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults on first run.
    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            let config = Self::default();
            config.save_to(&path).await?;
            return Ok(config);
        }

        Self::load_from(&path).await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).await?;
        let config: PeerwatchConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub async fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| PeerwatchError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, contents).await?;
        Ok(())
    }
}

/// Log file used while the terminal UI owns stdout.
pub fn log_file_path() -> Result<PathBuf> {
    let mut path = dirs::data_dir()
        .ok_or_else(|| PeerwatchError::Other("Could not find data directory".to_string()))?;
    path.push("peerwatch");
    std::fs::create_dir_all(&path)?;
    path.push("peerwatch.log");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PeerwatchConfig::default();
        assert_eq!(config.backend.port, 8080);
        assert_eq!(config.poll.interval(), Duration::from_millis(500));
        assert_eq!(config.transfer.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.transfer.completion_grace(), Duration::from_secs(1));
        assert_eq!(config.ui.notification_ttl(), Duration::from_secs(3));
        assert!(!config.poll.discard_stale);
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = PeerwatchConfig::default();
        config.backend.port = 9001;
        config.poll.discard_stale = true;
        config.save_to(&path).await.unwrap();

        let loaded = PeerwatchConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[backend]\nhost = \"127.0.0.1\"\nport = 9100\nrequest_timeout_ms = 200\n")
            .await
            .unwrap();

        let loaded = PeerwatchConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded.backend.port, 9100);
        assert_eq!(loaded.poll, PollConfig::default());
    }

    #[tokio::test]
    async fn test_invalid_toml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "backend = [").await.unwrap();

        let result = PeerwatchConfig::load_from(&path).await;
        assert!(matches!(result, Err(PeerwatchError::Toml(_))));
    }
}
