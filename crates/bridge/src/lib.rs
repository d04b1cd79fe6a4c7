//! droidctl bridge
//!
//! Drives adb and fastboot as subprocesses: builds commands, validates
//! their target device, runs them under a timeout, and keeps a registry
//! of known devices fed by `adb devices -l`.

pub mod address;
pub mod broker;
pub mod command;
pub mod controller;
pub mod device;
pub mod discovery;
pub mod error;
pub mod features;
pub mod process;
pub mod registry;
pub mod toolchain;

#[cfg(all(test, unix))]
mod testing;

pub use address::{Ip4Address, ADB_DEFAULT_PORT};
pub use broker::{CommandTask, ExecutionBroker};
pub use command::{Command, CommandKind, RebootMode};
pub use controller::DroidController;
pub use device::{Device, DeviceIdentity, DeviceState, DeviceSummary};
pub use discovery::DiscoveryReport;
pub use error::{BridgeError, BridgeResult};
pub use process::{ExecutionResult, ProcessHandle};
pub use registry::{DeviceObservation, DeviceRegistry};
pub use toolchain::ToolLocator;
