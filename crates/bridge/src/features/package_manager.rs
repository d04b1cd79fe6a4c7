//! Package management via `adb install` and `pm`

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use super::{shell_quote, DeviceTarget};
use crate::broker::ExecutionBroker;
use crate::device::Device;
use crate::error::{BridgeError, BridgeResult};

const PACKAGE_PREFIX: &str = "package:";
const INSTALLER_MARKER: &str = " installer=";
const INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Options of `adb install`, combined into one argument such as `-rg`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallFlag {
    ForwardLock,
    ReplaceExisting,
    AllowTestPackages,
    InstallOnSd,
    AllowDowngrade,
    PartialInstall,
    GrantAllPermissions,
}

impl InstallFlag {
    pub fn as_char(&self) -> char {
        match self {
            InstallFlag::ForwardLock => 'l',
            InstallFlag::ReplaceExisting => 'r',
            InstallFlag::AllowTestPackages => 't',
            InstallFlag::InstallOnSd => 's',
            InstallFlag::AllowDowngrade => 'd',
            InstallFlag::PartialInstall => 'p',
            InstallFlag::GrantAllPermissions => 'g',
        }
    }

    /// `None` when no flag is given
    pub fn combine(flags: &[InstallFlag]) -> Option<String> {
        let mut arg = String::from("-");
        for flag in flags {
            if !arg.contains(flag.as_char()) {
                arg.push(flag.as_char());
            }
        }
        (arg.len() > 1).then_some(arg)
    }
}

/// Filters of `pm list packages`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageFilter {
    OnlyDisabled,
    OnlyEnabled,
    OnlySystem,
    OnlyThirdParty,
    WithInstaller,
    IncludeUninstalled,
}

impl PackageFilter {
    pub fn as_arg(&self) -> &'static str {
        match self {
            PackageFilter::OnlyDisabled => "-d",
            PackageFilter::OnlyEnabled => "-e",
            PackageFilter::OnlySystem => "-s",
            PackageFilter::OnlyThirdParty => "-3",
            PackageFilter::WithInstaller => "-i",
            PackageFilter::IncludeUninstalled => "-u",
        }
    }
}

/// An installed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    pub name: String,
    /// APK location on the device
    pub path: Option<String>,
    pub installer: Option<String>,
}

impl Package {
    /// Parse `pm list packages -f [-i]` output
    ///
    /// Lines look like `package:/data/app/com.example-1/base.apk=com.example installer=com.android.vending`.
    /// The path itself may contain `=`, so the name is taken after the last one.
    pub fn parse_listing(output: &str) -> Vec<Package> {
        output
            .lines()
            .filter_map(|line| line.trim().strip_prefix(PACKAGE_PREFIX))
            .filter_map(|entry| {
                let (entry, installer) = match entry.split_once(INSTALLER_MARKER) {
                    Some((entry, installer)) => (entry, Some(installer.trim())),
                    None => (entry, None),
                };
                let (path, name) = match entry.rsplit_once('=') {
                    Some((path, name)) => (Some(path.to_string()), name.trim()),
                    None => (None, entry.trim()),
                };
                if name.is_empty() {
                    return None;
                }

                Some(Package {
                    name: name.to_string(),
                    path,
                    installer: installer
                        .filter(|i| !i.is_empty() && *i != "null")
                        .map(str::to_string),
                })
            })
            .collect()
    }
}

fn check_apk(apk: &Path) -> BridgeResult<()> {
    let is_apk = apk
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("apk"));
    if !is_apk || !apk.is_file() {
        return Err(BridgeError::InvalidCommand(format!(
            "{} is not an existing .apk file",
            apk.display()
        )));
    }
    Ok(())
}

/// Package manager of one device
pub struct PackageManager {
    target: DeviceTarget,
}

impl PackageManager {
    pub(crate) fn new(device: Arc<Device>, broker: Arc<ExecutionBroker>) -> Self {
        Self {
            target: DeviceTarget::new(device, broker),
        }
    }

    /// Install an APK from the host
    pub async fn install(&self, apk: &Path, flags: &[InstallFlag]) -> BridgeResult<()> {
        check_apk(apk)?;
        let apk = apk.canonicalize()?;
        let apk = apk.to_string_lossy();

        let mut args: Vec<&str> = Vec::new();
        let combined = InstallFlag::combine(flags);
        if let Some(combined) = &combined {
            args.push(combined);
        }
        args.push(&apk);

        let output = self
            .target
            .bridge_checked("install", &args, Some(INSTALL_TIMEOUT))
            .await?;
        if output.contains("Failure") {
            return Err(BridgeError::CommandFailed {
                command: format!("adb install {}", args.join(" ")),
                output,
            });
        }

        info!("Installed {} on {}", apk, self.target.device().identity());
        Ok(())
    }

    pub async fn list_packages(&self, filters: &[PackageFilter]) -> BridgeResult<Vec<Package>> {
        let mut args = vec!["list", "packages", "-f"];
        args.extend(filters.iter().map(PackageFilter::as_arg));

        let output = self.target.shell_checked("pm", &args).await?;
        Ok(Package::parse_listing(&output))
    }

    pub async fn uninstall(&self, name: &str) -> BridgeResult<()> {
        let quoted = shell_quote(name);
        let output = self
            .target
            .shell_checked("pm", &["uninstall", quoted.as_str()])
            .await?;
        if !output.contains("Success") {
            return Err(BridgeError::CommandFailed {
                command: format!("pm uninstall {}", name),
                output,
            });
        }
        info!("Uninstalled {} from {}", name, self.target.device().identity());
        Ok(())
    }
}
