//! CLI commands for droidctl
//!
//! Each command resolves its device through a fresh discovery pass, so
//! identities typed on the command line always match the current listing.

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::info;

use droidctl_bridge::features::PackageFilter;
use droidctl_bridge::{Command, Device, DeviceSummary, DroidController, Ip4Address, RebootMode};

/// Refresh the registry and look up `identity`
async fn resolve_device(controller: &DroidController, identity: &str) -> Result<Arc<Device>> {
    controller.refresh_devices().await?;
    match controller.device(identity) {
        Some(device) => Ok(device),
        None => bail!("No device {identity:?} is attached; run `droidctl devices` to list them"),
    }
}

/// Render summaries as a fixed-width table
pub fn format_device_table(devices: &[DeviceSummary]) -> String {
    if devices.is_empty() {
        return "No devices attached\n".to_string();
    }

    let width = devices
        .iter()
        .map(|d| d.identity.len())
        .max()
        .unwrap_or(0)
        .max("IDENTITY".len());

    let mut table = format!("{:<width$}  {:<4}  {:<13}  MODEL\n", "IDENTITY", "VIA", "STATE");
    for device in devices {
        table.push_str(&format!(
            "{:<width$}  {:<4}  {:<13}  {}\n",
            device.identity,
            device.connection,
            device.state.to_string(),
            device.model.replace('_', " "),
        ));
    }
    table
}

/// Device list command
pub struct DevicesCommand {
    pub json: bool,
}

impl DevicesCommand {
    pub async fn execute(&self, controller: &DroidController) -> Result<()> {
        let report = controller.refresh_devices().await?;
        for rejected in &report.rejected {
            info!("{}", rejected);
        }

        let summaries: Vec<DeviceSummary> =
            report.updated.iter().map(|device| device.summary()).collect();
        if self.json {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        } else {
            print!("{}", format_device_table(&summaries));
        }
        Ok(())
    }
}

/// Shell command; returns the remote exit code
pub struct ShellCommand {
    pub device: String,
    pub command: Vec<String>,
    pub root: bool,
}

impl ShellCommand {
    pub async fn execute(&self, controller: &DroidController) -> Result<i32> {
        let Some((program, args)) = self.command.split_first() else {
            bail!("No shell command given");
        };
        let device = resolve_device(controller, &self.device).await?;

        let cmd = Command::shell()
            .device(&device)
            .tag(program.as_str())
            .args(args)
            .run_as_root(self.root)
            .create()?;
        let result = controller.broker().run(&cmd).await?;

        print!("{}", result.output);
        if result.timed_out {
            bail!(
                "`{}` timed out after {:?}",
                cmd,
                controller.broker().default_timeout()
            );
        }
        Ok(result.exit_code)
    }
}

/// Reboot command
pub struct RebootCommand {
    pub device: String,
    pub mode: RebootMode,
}

impl RebootCommand {
    pub async fn execute(&self, controller: &DroidController) -> Result<()> {
        let device = resolve_device(controller, &self.device).await?;
        controller.reboot(&device, self.mode).await?;
        println!("Rebooting {}", device.display_name());
        Ok(())
    }
}

/// TCP/IP connect command
pub struct ConnectCommand {
    pub address: Ip4Address,
}

impl ConnectCommand {
    pub async fn execute(&self, controller: &DroidController) -> Result<()> {
        let device = controller.connect(&self.address).await?;
        println!("Connected to {} ({})", device.display_name(), device.state());
        Ok(())
    }
}

/// TCP/IP disconnect command
pub struct DisconnectCommand {
    pub address: Option<Ip4Address>,
}

impl DisconnectCommand {
    pub async fn execute(&self, controller: &DroidController) -> Result<()> {
        match &self.address {
            Some(address) => {
                controller.disconnect(address).await?;
                println!("Disconnected {}", address);
            }
            None => {
                controller.disconnect_all().await?;
                println!("Disconnected everything");
            }
        }
        Ok(())
    }
}

pub enum ServerAction {
    Start,
    Kill,
}

/// adb server control
pub struct ServerCommand {
    pub action: ServerAction,
}

impl ServerCommand {
    pub async fn execute(&self, controller: &DroidController) -> Result<()> {
        match self.action {
            ServerAction::Start => controller.start_server().await?,
            ServerAction::Kill => controller.stop_server().await?,
        }
        Ok(())
    }
}

/// Battery state command
pub struct BatteryCommand {
    pub device: String,
    pub json: bool,
}

impl BatteryCommand {
    pub async fn execute(&self, controller: &DroidController) -> Result<()> {
        let device = resolve_device(controller, &self.device).await?;
        let info = device.battery(controller.broker()).info().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&info)?);
            return Ok(());
        }

        match info.percentage() {
            Some(percentage) => println!("Level:       {:.0}%", percentage),
            None => println!("Level:       {}", info.level),
        }
        println!("Status:      {:?}", info.status);
        println!("Health:      {:?}", info.health);
        println!("Charging:    {}", info.is_charging());
        println!("Voltage:     {:.3} V", info.voltage);
        println!("Temperature: {:.1} °C", info.temperature);
        if !info.technology.is_empty() {
            println!("Technology:  {}", info.technology);
        }
        Ok(())
    }
}

/// System property command
pub struct PropsCommand {
    pub device: String,
    pub key: Option<String>,
}

impl PropsCommand {
    pub async fn execute(&self, controller: &DroidController) -> Result<()> {
        let device = resolve_device(controller, &self.device).await?;
        let props = device.build_prop(controller.broker());

        match &self.key {
            Some(key) => match props.property(key).await? {
                Some(value) => println!("{}", value),
                None => bail!("Property {key:?} is not set on {}", device.identity()),
            },
            None => {
                for property in props.properties().await? {
                    println!("[{}]: [{}]", property.key, property.value);
                }
            }
        }
        Ok(())
    }
}

/// Package list command
pub struct PackagesCommand {
    pub device: String,
    pub third_party: bool,
}

impl PackagesCommand {
    pub async fn execute(&self, controller: &DroidController) -> Result<()> {
        let device = resolve_device(controller, &self.device).await?;
        let filters: &[PackageFilter] = if self.third_party {
            &[PackageFilter::OnlyThirdParty]
        } else {
            &[]
        };

        let packages = device
            .package_manager(controller.broker())
            .list_packages(filters)
            .await?;
        for package in packages {
            match package.path {
                Some(path) => println!("{}  {}", package.name, path),
                None => println!("{}", package.name),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use droidctl_bridge::DeviceState;

    fn summary(identity: &str, connection: &'static str, state: DeviceState) -> DeviceSummary {
        DeviceSummary {
            identity: identity.into(),
            connection,
            state,
            product: "sdk".into(),
            model: "Pixel_7".into(),
            device_name: "emu64".into(),
            transport_id: None,
        }
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(format_device_table(&[]), "No devices attached\n");
    }

    #[test]
    fn test_table_columns_align() {
        let table = format_device_table(&[
            summary("emulator-5554", "usb", DeviceState::Online),
            summary("192.168.1.20:5555", "tcp", DeviceState::Offline),
        ]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("IDENTITY"));
        assert!(lines[1].contains("Pixel 7"));

        let via = lines[0].find("VIA").unwrap();
        assert_eq!(&lines[1][via..via + 3], "usb");
        assert_eq!(&lines[2][via..via + 3], "tcp");
    }
}
