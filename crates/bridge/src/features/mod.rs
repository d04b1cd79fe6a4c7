//! Device features
//!
//! Thin wrappers that run a command on the device and parse its output.
//! Nothing is cached: every getter runs a fresh command through the broker.

mod battery;
mod binary;
mod build_prop;
mod file_system;
mod package_manager;
mod permission;

pub use battery::{Battery, BatteryHealth, BatteryInfo, BatteryStatus};
pub use binary::{BinaryInfo, BusyBox, SuperUser, NOT_AVAILABLE};
pub use build_prop::{BuildProp, BuildProperty};
pub use file_system::{FileEntry, FileKind, FileSystem};
pub use package_manager::{InstallFlag, Package, PackageFilter, PackageManager};
pub use permission::{Permission, PermissionSet};

use std::sync::Arc;
use std::time::Duration;

use crate::broker::ExecutionBroker;
pub(crate) use crate::command::shell_quote;
use crate::command::Command;
use crate::device::Device;
use crate::error::BridgeResult;
use crate::process::ExecutionResult;

/// A device and the broker its commands run through
#[derive(Clone)]
pub(crate) struct DeviceTarget {
    device: Arc<Device>,
    broker: Arc<ExecutionBroker>,
}

impl DeviceTarget {
    pub(crate) fn new(device: Arc<Device>, broker: Arc<ExecutionBroker>) -> Self {
        Self { device, broker }
    }

    pub(crate) fn device(&self) -> &Arc<Device> {
        &self.device
    }

    fn shell_command(&self, tag: &str, args: &[&str]) -> BridgeResult<Command> {
        Command::shell()
            .device(&self.device)
            .tag(tag)
            .args(args.iter().copied())
            .create()
    }

    /// `adb -s <device> shell <tag> <args>`
    pub(crate) async fn shell(&self, tag: &str, args: &[&str]) -> BridgeResult<ExecutionResult> {
        let cmd = self.shell_command(tag, args)?;
        self.broker.run(&cmd).await
    }

    pub(crate) async fn shell_output(&self, tag: &str, args: &[&str]) -> BridgeResult<String> {
        let cmd = self.shell_command(tag, args)?;
        self.broker.run_output_only(&cmd).await
    }

    /// Run a shell command and turn a non-zero exit into an error
    pub(crate) async fn shell_checked(&self, tag: &str, args: &[&str]) -> BridgeResult<String> {
        let cmd = self.shell_command(tag, args)?;
        self.broker.run_checked(&cmd).await
    }

    /// `adb -s <device> <tag> <args>`, failing on a non-zero exit
    pub(crate) async fn bridge_checked(
        &self,
        tag: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> BridgeResult<String> {
        let mut builder = Command::bridge()
            .device(&self.device)
            .tag(tag)
            .args(args.iter().copied());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let cmd = builder.create()?;
        self.broker.run_checked(&cmd).await
    }
}
