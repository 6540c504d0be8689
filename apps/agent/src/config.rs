//! Agent configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/filestream/agent.toml`
//! - Windows: `%APPDATA%/filestream/agent.toml`
//!
//! `FILESTREAM_CONFIG` overrides the path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use filestream_pipeline::PipelineConfig;
use filestream_protocol::constants::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};

/// Environment variable holding an explicit configuration path.
pub const CONFIG_ENV: &str = "FILESTREAM_CONFIG";

/// Agent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Staging area for files being uploaded.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Output area for reconstructed files.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,

    #[serde(default = "default_metadata_timeout_secs")]
    pub metadata_timeout_secs: u64,

    #[serde(default = "default_chunk_timeout_secs")]
    pub chunk_timeout_secs: u64,

    /// Keep staged uploads after their upload finishes.
    #[serde(default)]
    pub keep_staged_uploads: bool,

    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("filestream")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("filestream")
    }
}

fn default_upload_dir() -> PathBuf {
    data_dir().join("uploads")
}

fn default_download_dir() -> PathBuf {
    data_dir().join("downloads")
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_ack_timeout_secs() -> u64 {
    10
}

fn default_metadata_timeout_secs() -> u64 {
    30
}

fn default_chunk_timeout_secs() -> u64 {
    30
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            download_dir: default_download_dir(),
            chunk_size: default_chunk_size(),
            ack_timeout_secs: default_ack_timeout_secs(),
            metadata_timeout_secs: default_metadata_timeout_secs(),
            chunk_timeout_secs: default_chunk_timeout_secs(),
            keep_staged_uploads: false,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Loads configuration from `path`, writing a default there if missing.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Settings for the transfer service.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            upload_dir: self.upload_dir.clone(),
            download_dir: self.download_dir.clone(),
            chunk_size: self.chunk_size,
            ack_timeout: Duration::from_secs(self.ack_timeout_secs),
            metadata_timeout: Duration::from_secs(self.metadata_timeout_secs),
            chunk_timeout: Duration::from_secs(self.chunk_timeout_secs),
            keep_staged_uploads: self.keep_staged_uploads,
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }
}

/// Returns the configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }

    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("filestream")
            .join("agent.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("filestream").join("agent.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/filestream/agent.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(config.ack_timeout_secs, 10);
        assert_eq!(config.metadata_timeout_secs, 30);
        assert_eq!(config.chunk_timeout_secs, 30);
        assert_eq!(config.shutdown_timeout_secs, 5);
        assert!(!config.keep_staged_uploads);
        assert!(config.upload_dir.ends_with("uploads"));
        assert!(config.download_dir.ends_with("downloads"));
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = Config {
            upload_dir: "/srv/up".into(),
            download_dir: "/srv/down".into(),
            chunk_size: 4096,
            ack_timeout_secs: 1,
            metadata_timeout_secs: 2,
            chunk_timeout_secs: 3,
            keep_staged_uploads: true,
            shutdown_timeout_secs: 4,
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn config_partial_toml() {
        // Only specify chunk size, rest should use defaults.
        let toml_str = "chunk_size = 512";
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.ack_timeout_secs, 10);
        assert!(!config.keep_staged_uploads);
    }

    #[test]
    fn load_from_creates_default_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("agent.toml");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("agent.toml");

        let config = Config {
            chunk_size: 64,
            keep_staged_uploads: true,
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.chunk_size, 64);
        assert!(loaded.keep_staged_uploads);
    }

    #[test]
    fn pipeline_config_converts_seconds() {
        let config = Config {
            metadata_timeout_secs: 7,
            ..Config::default()
        };
        let pc = config.pipeline_config();
        assert_eq!(pc.metadata_timeout, Duration::from_secs(7));
        assert_eq!(pc.chunk_size, config.chunk_size);
    }
}
