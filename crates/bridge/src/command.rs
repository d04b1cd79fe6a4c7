//! Command Model
//!
//! An immutable description of one tool invocation. Commands are built with
//! a builder per kind:
//!
//! ```ignore
//! let cmd = Command::shell()
//!     .device(&device)
//!     .tag("dumpsys")
//!     .arg("battery")
//!     .timeout(Duration::from_secs(5))
//!     .create()?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::address::Ip4Address;
use crate::device::Device;
use crate::error::{BridgeError, BridgeResult};

/// Quote `arg` for the device shell, which re-splits everything after `shell`
pub(crate) fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:=@%,".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Which tool runs the command, and how
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `adb <tag> <args>`
    Bridge,
    /// `adb shell <tag> <args>`
    BridgeShell,
    /// `fastboot <tag> <args>`
    Flash,
}

impl CommandKind {
    pub fn tool_name(&self) -> &'static str {
        match self {
            CommandKind::Bridge | CommandKind::BridgeShell => "adb",
            CommandKind::Flash => "fastboot",
        }
    }
}

/// Target of a reboot command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebootMode {
    /// Normal boot
    #[default]
    Device,
    Recovery,
    Bootloader,
}

impl RebootMode {
    /// Argument passed after `reboot`; a normal boot takes none
    pub fn as_arg(&self) -> Option<&'static str> {
        match self {
            RebootMode::Device => None,
            RebootMode::Recovery => Some("recovery"),
            RebootMode::Bootloader => Some("bootloader"),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "device" | "system" => Some(RebootMode::Device),
            "recovery" => Some(RebootMode::Recovery),
            "bootloader" => Some(RebootMode::Bootloader),
            _ => None,
        }
    }
}

/// A validated, immutable unit of work for the execution broker
#[derive(Debug, Clone)]
pub struct Command {
    kind: CommandKind,
    tag: String,
    args: Vec<String>,
    device: Option<Arc<Device>>,
    timeout: Option<Duration>,
    run_as_root: bool,
}

impl Command {
    /// Builder for a plain adb command
    pub fn bridge() -> BridgeCommandBuilder {
        BridgeCommandBuilder::default()
    }

    /// Builder for an `adb shell` command
    pub fn shell() -> ShellCommandBuilder {
        ShellCommandBuilder::default()
    }

    /// Builder for a fastboot command
    pub fn flash() -> FlashCommandBuilder {
        FlashCommandBuilder::default()
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn device(&self) -> Option<&Arc<Device>> {
        self.device.as_ref()
    }

    /// Per-command timeout; `None` uses the broker default
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn run_as_root(&self) -> bool {
        self.run_as_root
    }

    /// `adb start-server`
    pub fn start_server() -> Self {
        Self::untargeted(CommandKind::Bridge, "start-server", Vec::new())
    }

    /// `adb kill-server`
    pub fn kill_server() -> Self {
        Self::untargeted(CommandKind::Bridge, "kill-server", Vec::new())
    }

    /// `adb devices -l`
    pub fn list_devices_long() -> Self {
        Self::untargeted(CommandKind::Bridge, "devices", vec!["-l".to_string()])
    }

    /// `fastboot devices -l`
    pub fn flash_devices() -> Self {
        Self::untargeted(CommandKind::Flash, "devices", vec!["-l".to_string()])
    }

    /// `adb connect a.b.c.d:port`
    pub fn connect(address: &Ip4Address) -> Self {
        Self::untargeted(CommandKind::Bridge, "connect", vec![address.to_string()])
    }

    /// `adb disconnect [a.b.c.d:port]`; without an address every TCP device is dropped
    pub fn disconnect(address: Option<&Ip4Address>) -> Self {
        let args = address.map(|a| vec![a.to_string()]).unwrap_or_default();
        Self::untargeted(CommandKind::Bridge, "disconnect", args)
    }

    /// `adb -s <device> reboot [mode]`
    pub fn reboot(device: &Arc<Device>, mode: RebootMode) -> Self {
        Self {
            kind: CommandKind::Bridge,
            tag: "reboot".to_string(),
            args: mode.as_arg().map(|m| vec![m.to_string()]).unwrap_or_default(),
            device: Some(Arc::clone(device)),
            timeout: None,
            run_as_root: false,
        }
    }

    fn untargeted(kind: CommandKind, tag: &str, args: Vec<String>) -> Self {
        Self {
            kind,
            tag: tag.to_string(),
            args,
            device: None,
            timeout: None,
            run_as_root: false,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.tool_name())?;
        if let Some(device) = &self.device {
            write!(f, " -s {}", device.identity())?;
        }
        if self.kind == CommandKind::BridgeShell {
            f.write_str(" shell")?;
            if self.run_as_root {
                f.write_str(" su -c")?;
            }
        }
        write!(f, " {}", self.tag)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Fields shared by every builder
#[derive(Debug, Default)]
struct CommandParts {
    tag: Option<String>,
    args: Vec<String>,
    device: Option<Arc<Device>>,
    timeout: Option<Duration>,
}

impl CommandParts {
    fn finish(self, kind: CommandKind, run_as_root: bool) -> BridgeResult<Command> {
        let tag = match self.tag {
            Some(tag) if !tag.trim().is_empty() => tag,
            _ => {
                return Err(BridgeError::InvalidCommand(format!(
                    "{} command has no tag",
                    kind.tool_name()
                )))
            }
        };

        if self.timeout == Some(Duration::ZERO) {
            return Err(BridgeError::InvalidCommand("timeout must be non-zero".into()));
        }

        Ok(Command {
            kind,
            tag,
            args: self.args,
            device: self.device,
            timeout: self.timeout,
            run_as_root,
        })
    }
}

/// Builder for [`CommandKind::Bridge`] commands
#[derive(Debug, Default)]
pub struct BridgeCommandBuilder {
    parts: CommandParts,
}

impl BridgeCommandBuilder {
    pub fn device(mut self, device: &Arc<Device>) -> Self {
        self.parts.device = Some(Arc::clone(device));
        self
    }

    /// The verb, e.g. `install`
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.parts.tag = Some(tag.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.parts.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parts.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.parts.timeout = Some(timeout);
        self
    }

    pub fn create(self) -> BridgeResult<Command> {
        self.parts.finish(CommandKind::Bridge, false)
    }
}

/// Builder for [`CommandKind::BridgeShell`] commands
#[derive(Debug, Default)]
pub struct ShellCommandBuilder {
    parts: CommandParts,
    run_as_root: bool,
}

impl ShellCommandBuilder {
    pub fn device(mut self, device: &Arc<Device>) -> Self {
        self.parts.device = Some(Arc::clone(device));
        self
    }

    /// The program run on the device, e.g. `getprop`
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.parts.tag = Some(tag.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.parts.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parts.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.parts.timeout = Some(timeout);
        self
    }

    /// Wrap the command in `su -c` on the device
    pub fn run_as_root(mut self, run_as_root: bool) -> Self {
        self.run_as_root = run_as_root;
        self
    }

    pub fn create(self) -> BridgeResult<Command> {
        self.parts.finish(CommandKind::BridgeShell, self.run_as_root)
    }
}

/// Builder for [`CommandKind::Flash`] commands
#[derive(Debug, Default)]
pub struct FlashCommandBuilder {
    parts: CommandParts,
}

impl FlashCommandBuilder {
    pub fn device(mut self, device: &Arc<Device>) -> Self {
        self.parts.device = Some(Arc::clone(device));
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.parts.tag = Some(tag.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.parts.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parts.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.parts.timeout = Some(timeout);
        self
    }

    pub fn create(self) -> BridgeResult<Command> {
        self.parts.finish(CommandKind::Flash, false)
    }
}
