//! Error types for droidctl configuration handling

use thiserror::Error;

/// Errors raised while resolving directories or reading configuration
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Home directory could not be determined")]
    NoHomeDirectory,
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Io(e) => format!("File operation failed: {}", e),
            CoreError::TomlParse(e) => format!("Configuration file is not valid TOML: {}", e),
            CoreError::NoHomeDirectory => {
                "No home directory found; set library_home in the configuration".to_string()
            }
            _ => self.to_string(),
        }
    }
}
