//! Bridge Configuration
//!
//! Settings shared by the execution broker and the tool locator:
//! - Default command timeout and the kill/output grace periods
//! - Explicit adb / fastboot / SDK paths
//! - Library home (scratch and install directories)

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use directories::ProjectDirs;
use tracing::{info, debug};

use crate::error::{CoreError, Result};
use crate::paths::LibraryDirs;

/// Explicit tool locations; anything left unset is searched for
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsConfig {
    /// Path to the adb binary
    pub bridge_path: Option<PathBuf>,
    /// Path to the fastboot binary
    pub flash_path: Option<PathBuf>,
    /// Android SDK root; its platform-tools directory is searched
    pub sdk_path: Option<PathBuf>,
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Config version for migrations
    pub version: u32,
    /// Timeout applied to commands that do not carry their own, in milliseconds
    pub default_timeout_ms: u64,
    /// How long to wait for a killed process to be reaped, in milliseconds
    pub kill_grace_ms: u64,
    /// How long to keep draining output after the process exited, in milliseconds
    pub output_grace_ms: u64,
    /// Tool locations
    pub tools: ToolsConfig,
    /// Library home; defaults to ~/.droidctl
    pub library_home: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            default_timeout_ms: 30_000,
            kill_grace_ms: 2_000,
            output_grace_ms: 500,
            tools: ToolsConfig::default(),
            library_home: None,
        }
    }
}

impl BridgeConfig {
    /// Get the configuration directory path
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("org", "droidctl", "droidctl")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Load configuration from the platform config directory
    ///
    /// A missing file yields the defaults; nothing is written.
    pub async fn load() -> Result<Self> {
        let config_file = Self::config_file()
            .ok_or_else(|| CoreError::Config("Cannot determine config path".into()))?;

        if config_file.exists() {
            Self::load_from(&config_file).await
        } else {
            info!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file
    pub async fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = tokio::fs::read_to_string(path).await?;
        let config: BridgeConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the platform config directory
    pub async fn save(&self) -> Result<()> {
        let config_file = Self::config_file()
            .ok_or_else(|| CoreError::Config("Cannot determine config path".into()))?;
        self.save_to(&config_file).await
    }

    /// Save configuration to an explicit file
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = toml::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let durations = [
            ("default_timeout_ms", self.default_timeout_ms),
            ("kill_grace_ms", self.kill_grace_ms),
            ("output_grace_ms", self.output_grace_ms),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(CoreError::Config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn output_grace(&self) -> Duration {
        Duration::from_millis(self.output_grace_ms)
    }

    /// Resolve the library directories, honouring `library_home`
    pub fn library_dirs(&self) -> Result<LibraryDirs> {
        match &self.library_home {
            Some(home) => Ok(LibraryDirs::at(home.clone())),
            None => LibraryDirs::discover(),
        }
    }

    /// Get Android SDK path, with auto-detection
    pub fn get_sdk_path(&self) -> Option<PathBuf> {
        self.tools.sdk_path.clone().or_else(|| {
            let from_env = ["ANDROID_HOME", "ANDROID_SDK_ROOT"]
                .iter()
                .filter_map(|var| std::env::var_os(var))
                .map(PathBuf::from);

            // Auto-detect common paths
            let candidates = if cfg!(windows) {
                vec![
                    dirs::config_local_dir().map(|d| d.join("Android").join("Sdk")),
                    Some(PathBuf::from("C:\\Android\\sdk")),
                ]
            } else {
                vec![
                    dirs::home_dir().map(|h: PathBuf| h.join("Android").join("Sdk")),
                    Some(PathBuf::from("/usr/local/android-sdk")),
                ]
            };

            from_env
                .chain(candidates.into_iter().flatten())
                .find(|p: &PathBuf| p.exists())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.default_timeout(), Duration::from_secs(30));
        assert!(config.kill_grace() > Duration::ZERO);
        assert!(config.tools.bridge_path.is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: BridgeConfig = toml::from_str("default_timeout_ms = 5000\n").unwrap();
        assert_eq!(config.default_timeout(), Duration::from_secs(5));
        assert_eq!(config.kill_grace_ms, BridgeConfig::default().kill_grace_ms);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = BridgeConfig::default();
        config.tools.bridge_path = Some(PathBuf::from("/opt/sdk/platform-tools/adb"));
        config.default_timeout_ms = 1_500;
        config.save_to(&path).await.unwrap();

        let loaded = BridgeConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_zero_timeout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "default_timeout_ms = 0\n").await.unwrap();

        let err = BridgeConfig::load_from(&path).await.unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[tokio::test]
    async fn test_zero_grace_periods_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        for contents in ["kill_grace_ms = 0\n", "output_grace_ms = 0\n"] {
            tokio::fs::write(&path, contents).await.unwrap();
            match BridgeConfig::load_from(&path).await {
                Err(CoreError::Config(message)) => {
                    assert!(message.starts_with(contents.split(' ').next().unwrap()))
                }
                other => panic!("expected a config error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_explicit_library_home() {
        let mut config = BridgeConfig::default();
        config.library_home = Some(PathBuf::from("/var/lib/droidctl"));
        let dirs = config.library_dirs().unwrap();
        assert_eq!(dirs.scratch(), PathBuf::from("/var/lib/droidctl/tmp"));
    }
}
