//! Droid Controller
//!
//! Entry point for applications: owns the broker and the device registry
//! and exposes server control, discovery and TCP/IP connection handling.

use std::sync::Arc;

use droidctl_core::BridgeConfig;
use tracing::info;

use crate::address::Ip4Address;
use crate::broker::ExecutionBroker;
use crate::command::{Command, RebootMode};
use crate::device::{Device, DeviceIdentity};
use crate::discovery::{self, DiscoveryReport};
use crate::error::{BridgeError, BridgeResult};
use crate::registry::DeviceRegistry;

/// Facade over the execution broker and device registry
#[derive(Clone)]
pub struct DroidController {
    broker: Arc<ExecutionBroker>,
}

impl DroidController {
    pub fn new(broker: Arc<ExecutionBroker>) -> Self {
        Self { broker }
    }

    /// Controller with a fresh registry, wired from configuration
    pub fn from_config(config: &BridgeConfig) -> BridgeResult<Self> {
        let registry = Arc::new(DeviceRegistry::new());
        let broker = ExecutionBroker::from_config(config, registry)?;
        Ok(Self::new(Arc::new(broker)))
    }

    pub fn broker(&self) -> &Arc<ExecutionBroker> {
        &self.broker
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        self.broker.registry()
    }

    pub async fn start_server(&self) -> BridgeResult<()> {
        self.broker.run_checked(&Command::start_server()).await?;
        info!("adb server started");
        Ok(())
    }

    pub async fn stop_server(&self) -> BridgeResult<()> {
        self.broker.run_checked(&Command::kill_server()).await?;
        info!("adb server stopped");
        Ok(())
    }

    /// Re-read the device list into the registry
    pub async fn refresh_devices(&self) -> BridgeResult<DiscoveryReport> {
        discovery::refresh(&self.broker).await
    }

    /// Every device seen so far, including stale ones
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.registry().all()
    }

    /// Refresh, then pick the first device that accepts commands
    pub async fn first_device(&self) -> BridgeResult<Option<Arc<Device>>> {
        let report = self.refresh_devices().await?;
        Ok(report.updated.into_iter().find(|device| device.is_usable()))
    }

    /// Look up a device by serial or `a.b.c.d:port`
    pub fn device(&self, identity: &str) -> Option<Arc<Device>> {
        self.registry().lookup_str(identity)
    }

    /// Connect to a device over TCP/IP and return it once listed
    pub async fn connect(&self, address: &Ip4Address) -> BridgeResult<Arc<Device>> {
        let cmd = Command::connect(address);
        let output = self.broker.run_checked(&cmd).await?;

        // adb exits with zero even when the connection was refused
        let output_lower = output.to_ascii_lowercase();
        if !output_lower.contains("connected to") || output_lower.contains("failed") {
            return Err(BridgeError::CommandFailed {
                command: cmd.to_string(),
                output,
            });
        }

        self.refresh_devices().await?;
        let identity = DeviceIdentity::from(*address);
        self.registry()
            .lookup(&identity)
            .ok_or_else(|| BridgeError::UnknownDevice(identity.to_string()))
    }

    /// Drop the TCP/IP connection to `address`
    pub async fn disconnect(&self, address: &Ip4Address) -> BridgeResult<()> {
        self.broker.run_checked(&Command::disconnect(Some(address))).await?;
        self.refresh_devices().await?;
        Ok(())
    }

    /// Drop every TCP/IP connection
    pub async fn disconnect_all(&self) -> BridgeResult<()> {
        self.broker.run_checked(&Command::disconnect(None)).await?;
        self.refresh_devices().await?;
        Ok(())
    }

    /// Reboot `device`; its state is revised by the next refresh
    pub async fn reboot(&self, device: &Arc<Device>, mode: RebootMode) -> BridgeResult<()> {
        self.broker.run_checked(&Command::reboot(device, mode)).await?;
        info!("Rebooting {} into {:?}", device.identity(), mode);
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::device::DeviceState;
    use crate::toolchain::ToolLocator;

    /// `/bin/sh <verb> ...` runs `<scratch>/<verb>` as a script
    fn controller_with_scripts(scripts: &[(&str, &str)]) -> (tempfile::TempDir, DroidController) {
        let dir = tempfile::tempdir().unwrap();
        for (verb, body) in scripts {
            std::fs::write(dir.path().join(verb), body).unwrap();
        }
        let broker = ExecutionBroker::new(
            ToolLocator::fixed("/bin/sh", "/bin/sh"),
            Arc::new(DeviceRegistry::new()),
            dir.path(),
        );
        (dir, DroidController::new(Arc::new(broker)))
    }

    const LISTING: &str = "cat <<'EOF'\n\
List of devices attached\n\
R58M offline product:r8q model:SM_G780F device:r8q\n\
emulator-5554 device product:sdk model:Pixel device:generic_x86\n\
EOF\n";

    #[tokio::test]
    async fn test_first_device_skips_unusable() {
        let (_dir, controller) = controller_with_scripts(&[("devices", LISTING)]);

        let device = controller.first_device().await.unwrap().unwrap();
        assert_eq!(device.identity().to_string(), "emulator-5554");
        assert_eq!(controller.devices().len(), 2);
        assert_eq!(controller.device("R58M").unwrap().state(), DeviceState::Offline);
    }

    #[tokio::test]
    async fn test_connect_adds_tcp_device() {
        let (_dir, controller) = controller_with_scripts(&[
            ("connect", "echo \"connected to $1\"\n"),
            (
                "devices",
                "echo '10.0.0.7:5555 device product:r8q model:SM_G780F device:r8q'\n",
            ),
        ]);

        let address: Ip4Address = "10.0.0.7".parse().unwrap();
        let device = controller.connect(&address).await.unwrap();
        assert!(device.is_connected_via_tcp());
        assert_eq!(device.address(), Some(&address));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let (_dir, controller) = controller_with_scripts(&[(
            "connect",
            "echo \"failed to connect to '$1': Connection refused\"\n",
        )]);

        let address: Ip4Address = "10.0.0.8:5555".parse().unwrap();
        let err = controller.connect(&address).await.unwrap_err();
        assert!(matches!(err, BridgeError::CommandFailed { .. }));
        // Nothing was listed, so nothing was refreshed
        assert!(controller.devices().is_empty());
    }

    #[tokio::test]
    async fn test_reboot_offline_device_is_rejected() {
        let (_dir, controller) = controller_with_scripts(&[("devices", LISTING)]);
        controller.refresh_devices().await.unwrap();
        let launched = controller.broker().launched_processes();

        let offline = controller.device("R58M").unwrap();
        let err = controller.reboot(&offline, RebootMode::Recovery).await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(controller.broker().launched_processes(), launched);
    }
}
