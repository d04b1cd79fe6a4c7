//! Bridge errors
//!
//! Validation failures are raised before any process is spawned. A command
//! that ran but timed out is not an error; see `ExecutionResult::timed_out`.

use std::path::PathBuf;
use thiserror::Error;

use crate::device::DeviceState;

/// Errors produced by the execution core and the feature wrappers
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{tool} was not found (searched: {searched:?}). Install the Android platform tools to continue")]
    ToolNotFound {
        tool: &'static str,
        searched: Vec<PathBuf>,
    },

    #[error("Device {identity} is {state}: {reason}")]
    IllegalDeviceState {
        identity: String,
        state: DeviceState,
        reason: &'static str,
    },

    #[error("Device {0} is not known to the registry; refresh devices first")]
    UnknownDevice(String),

    #[error("Malformed device line: {line:?}")]
    MalformedDeviceLine { line: String },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid IPv4 address: {0:?}")]
    InvalidAddress(String),

    #[error("Failed to launch {program:?}: {source}")]
    ProcessLaunch {
        program: PathBuf,
        source: std::io::Error,
    },

    #[error("Command was cancelled")]
    Cancelled,

    #[error("Command task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Could not parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error("{0} already exists on the device")]
    AlreadyExists(String),

    #[error("Command `{command}` failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] droidctl_core::CoreError),
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Whether refreshing devices and retrying can make the operation succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BridgeError::IllegalDeviceState { .. }
                | BridgeError::UnknownDevice(_)
                | BridgeError::Cancelled
        )
    }

    /// Whether the tool binaries are missing; never retried
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::ToolNotFound { .. })
    }

    pub(crate) fn parse(what: &'static str, detail: impl Into<String>) -> Self {
        BridgeError::Parse {
            what,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let state = BridgeError::IllegalDeviceState {
            identity: "emulator-5554".into(),
            state: DeviceState::Offline,
            reason: "commands cannot target offline devices",
        };
        assert!(state.is_recoverable());
        assert!(!state.is_fatal());

        let missing = BridgeError::ToolNotFound {
            tool: "adb",
            searched: vec![],
        };
        assert!(missing.is_fatal());
        assert!(!missing.is_recoverable());
    }

    #[test]
    fn test_state_message() {
        let err = BridgeError::IllegalDeviceState {
            identity: "192.168.1.5:5555".into(),
            state: DeviceState::Unauthorized,
            reason: "host must be authorized by the device first",
        };
        assert_eq!(
            err.to_string(),
            "Device 192.168.1.5:5555 is unauthorized: host must be authorized by the device first"
        );
    }
}
