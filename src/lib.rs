//! droidctl - drive Android devices through adb and fastboot
//!
//! The library is organized into two crates:
//!
//! - `droidctl-core`: configuration and the library's working directories
//! - `droidctl-bridge`: commands, the execution broker, the device
//!   registry and device discovery
//!
//! ```no_run
//! use droidctl::prelude::*;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = BridgeConfig::load().await?;
//! let controller = DroidController::from_config(&config)?;
//! if let Some(device) = controller.first_device().await? {
//!     let level = device.battery(controller.broker()).level().await?;
//!     println!("{} is at {}%", device.display_name(), level);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod commands;

pub use droidctl_bridge as bridge;
pub use droidctl_core as core;

/// Prelude module for convenient imports
pub mod prelude {
    pub use droidctl_bridge::features::{InstallFlag, PackageFilter};
    pub use droidctl_bridge::{
        BridgeError, Command, Device, DeviceState, DroidController, ExecutionBroker, Ip4Address,
        RebootMode,
    };
    pub use droidctl_core::BridgeConfig;
}
