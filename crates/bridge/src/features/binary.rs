//! Presence checks for `su` and `busybox`

use std::sync::Arc;

use serde::Serialize;

use super::DeviceTarget;
use crate::broker::ExecutionBroker;
use crate::device::Device;
use crate::error::BridgeResult;

/// Version reported for a binary that is not installed
pub const NOT_AVAILABLE: &str = "n/a";

const VERSION_ARG: &str = "--version";
const NOT_FOUND: &str = "not found";

/// Result of running `<binary> --version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryInfo {
    pub installed: bool,
    pub version: String,
}

impl BinaryInfo {
    pub fn from_version_output(output: &str) -> Self {
        let output = output.trim();
        if output.contains(NOT_FOUND) {
            Self {
                installed: false,
                version: NOT_AVAILABLE.to_string(),
            }
        } else {
            Self {
                installed: true,
                version: output.lines().next().unwrap_or_default().trim().to_string(),
            }
        }
    }
}

async fn query_version(target: &DeviceTarget, binary: &str) -> BridgeResult<BinaryInfo> {
    let output = target.shell_output(binary, &[VERSION_ARG]).await?;
    Ok(BinaryInfo::from_version_output(&output))
}

/// Superuser binary on the device
pub struct SuperUser {
    target: DeviceTarget,
}

impl SuperUser {
    pub(crate) fn new(device: Arc<Device>, broker: Arc<ExecutionBroker>) -> Self {
        Self {
            target: DeviceTarget::new(device, broker),
        }
    }

    pub async fn info(&self) -> BridgeResult<BinaryInfo> {
        query_version(&self.target, "su").await
    }

    pub async fn is_installed(&self) -> BridgeResult<bool> {
        Ok(self.info().await?.installed)
    }

    /// Version string, or [`NOT_AVAILABLE`]
    pub async fn version(&self) -> BridgeResult<String> {
        Ok(self.info().await?.version)
    }
}

/// BusyBox on the device
pub struct BusyBox {
    target: DeviceTarget,
}

impl BusyBox {
    pub(crate) fn new(device: Arc<Device>, broker: Arc<ExecutionBroker>) -> Self {
        Self {
            target: DeviceTarget::new(device, broker),
        }
    }

    pub async fn info(&self) -> BridgeResult<BinaryInfo> {
        query_version(&self.target, "busybox").await
    }

    pub async fn is_installed(&self) -> BridgeResult<bool> {
        Ok(self.info().await?.installed)
    }

    pub async fn version(&self) -> BridgeResult<String> {
        Ok(self.info().await?.version)
    }
}
