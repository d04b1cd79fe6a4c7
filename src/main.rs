//! droidctl command-line entry point

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use droidctl::bridge::{DroidController, Ip4Address, RebootMode};
use droidctl::commands::{
    BatteryCommand, ConnectCommand, DevicesCommand, DisconnectCommand, PackagesCommand,
    PropsCommand, RebootCommand, ServerAction, ServerCommand, ShellCommand,
};
use droidctl::core::{BridgeConfig, APP_NAME, VERSION};

fn parse_reboot_mode(s: &str) -> Result<RebootMode, String> {
    RebootMode::from_name(s)
        .ok_or_else(|| format!("Unknown reboot mode {s:?} (expected device, recovery or bootloader)"))
}

#[derive(Parser)]
#[command(name = "droidctl")]
#[command(author, version, about = "Discover and control Android devices", long_about = None)]
struct Cli {
    /// Default timeout for device commands, in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached devices
    Devices {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Run a shell command on a device
    Shell {
        /// Serial or ip:port of the device
        device: String,

        /// Command and its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,

        /// Run through `su -c`
        #[arg(long)]
        root: bool,
    },

    /// Reboot a device
    Reboot {
        device: String,

        /// device, recovery or bootloader
        #[arg(default_value = "device", value_parser = parse_reboot_mode)]
        mode: RebootMode,
    },

    /// Connect to a device over TCP/IP
    Connect {
        /// a.b.c.d[:port], port defaults to 5555
        address: Ip4Address,
    },

    /// Drop one TCP/IP connection, or all of them
    Disconnect { address: Option<Ip4Address> },

    /// Start the adb server
    StartServer,

    /// Stop the adb server
    KillServer,

    /// Show the battery state of a device
    Battery {
        device: String,

        #[arg(long)]
        json: bool,
    },

    /// Show system properties of a device
    Props {
        device: String,

        /// Only print this property
        key: Option<String>,
    },

    /// List installed packages
    Packages {
        device: String,

        /// Only third-party packages
        #[arg(long)]
        third_party: bool,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    debug!("{} v{} starting", APP_NAME, VERSION);

    let config = BridgeConfig::load()
        .await
        .context("Failed to load configuration")?;
    let controller = DroidController::from_config(&config)?;
    if let Some(secs) = cli.timeout {
        controller
            .broker()
            .set_default_timeout(Duration::from_secs(secs))?;
    }

    match cli.command {
        Commands::Devices { json } => DevicesCommand { json }.execute(&controller).await?,
        Commands::Shell {
            device,
            command,
            root,
        } => {
            let code = ShellCommand {
                device,
                command,
                root,
            }
            .execute(&controller)
            .await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Reboot { device, mode } => {
            RebootCommand { device, mode }.execute(&controller).await?
        }
        Commands::Connect { address } => ConnectCommand { address }.execute(&controller).await?,
        Commands::Disconnect { address } => {
            DisconnectCommand { address }.execute(&controller).await?
        }
        Commands::StartServer => {
            ServerCommand {
                action: ServerAction::Start,
            }
            .execute(&controller)
            .await?
        }
        Commands::KillServer => {
            ServerCommand {
                action: ServerAction::Kill,
            }
            .execute(&controller)
            .await?
        }
        Commands::Battery { device, json } => {
            BatteryCommand { device, json }.execute(&controller).await?
        }
        Commands::Props { device, key } => PropsCommand { device, key }.execute(&controller).await?,
        Commands::Packages {
            device,
            third_party,
        } => {
            PackagesCommand {
                device,
                third_party,
            }
            .execute(&controller)
            .await?
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_shell_takes_trailing_args() {
        let cli = Cli::try_parse_from(["droidctl", "shell", "emulator-5554", "ls", "-l", "/sdcard"])
            .unwrap();
        match cli.command {
            Commands::Shell { device, command, root } => {
                assert_eq!(device, "emulator-5554");
                assert_eq!(command, ["ls", "-l", "/sdcard"]);
                assert!(!root);
            }
            _ => panic!("expected shell"),
        }
    }

    #[test]
    fn test_reboot_mode_parsing() {
        let cli = Cli::try_parse_from(["droidctl", "reboot", "R58M", "recovery"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Reboot { mode: RebootMode::Recovery, .. }
        ));
        assert!(Cli::try_parse_from(["droidctl", "reboot", "R58M", "fastbootd"]).is_err());
    }

    #[test]
    fn test_connect_address_defaults_port() {
        let cli = Cli::try_parse_from(["droidctl", "--timeout", "5", "connect", "10.0.0.7"]).unwrap();
        assert_eq!(cli.timeout, Some(5));
        match cli.command {
            Commands::Connect { address } => assert_eq!(address.to_string(), "10.0.0.7:5555"),
            _ => panic!("expected connect"),
        }
    }
}
