//! Execution Broker
//!
//! Turns a [`Command`] into a tool invocation and supervises it. Commands
//! are validated (device known to the registry, device state allows
//! targeting, tool binary present) before anything is spawned. Process
//! creation is serialized across the whole broker because the adb server
//! is a per-host singleton; waiting for processes is not.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use droidctl_core::BridgeConfig;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::command::{shell_quote, Command, CommandKind};
use crate::error::{BridgeError, BridgeResult};
use crate::process::{ExecutionResult, ProcessHandle, ProcessLimits};
use crate::registry::DeviceRegistry;
use crate::toolchain::ToolLocator;

/// Flag that restricts a command to a single device
const TARGET_FLAG: &str = "-s";

/// Single entry point for running tool commands
pub struct ExecutionBroker {
    locator: ToolLocator,
    registry: Arc<DeviceRegistry>,
    scratch_dir: PathBuf,
    default_timeout: RwLock<Duration>,
    kill_grace: Duration,
    output_grace: Duration,
    launch_lock: Mutex<()>,
    launched: AtomicU64,
}

impl ExecutionBroker {
    /// Broker with default timeouts; `scratch_dir` must exist
    pub fn new(
        locator: ToolLocator,
        registry: Arc<DeviceRegistry>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        let defaults = BridgeConfig::default();
        Self {
            locator,
            registry,
            scratch_dir: scratch_dir.into(),
            default_timeout: RwLock::new(defaults.default_timeout()),
            kill_grace: defaults.kill_grace(),
            output_grace: defaults.output_grace(),
            launch_lock: Mutex::new(()),
            launched: AtomicU64::new(0),
        }
    }

    /// Broker wired from configuration; creates the library directories
    pub fn from_config(config: &BridgeConfig, registry: Arc<DeviceRegistry>) -> BridgeResult<Self> {
        let dirs = config.library_dirs()?;
        dirs.create_all()?;

        let locator = ToolLocator::from_config(config, &dirs);
        let mut broker = Self::new(locator, registry, dirs.scratch());
        *broker.default_timeout.get_mut() = config.default_timeout();
        broker.kill_grace = config.kill_grace();
        broker.output_grace = config.output_grace();

        info!("Execution broker ready, scratch dir {:?}", broker.scratch_dir);
        Ok(broker)
    }

    /// Override the kill and output grace periods
    pub fn with_grace_periods(mut self, kill_grace: Duration, output_grace: Duration) -> Self {
        self.kill_grace = kill_grace;
        self.output_grace = output_grace;
        self
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn locator(&self) -> &ToolLocator {
        &self.locator
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Timeout for commands that do not carry their own
    pub fn default_timeout(&self) -> Duration {
        *self.default_timeout.read()
    }

    /// Change the default timeout; processes already launched keep theirs
    pub fn set_default_timeout(&self, timeout: Duration) -> BridgeResult<()> {
        if timeout.is_zero() {
            return Err(BridgeError::InvalidCommand("default timeout must be non-zero".into()));
        }
        *self.default_timeout.write() = timeout;
        Ok(())
    }

    /// Number of processes spawned by this broker
    pub fn launched_processes(&self) -> u64 {
        self.launched.load(Ordering::Relaxed)
    }

    /// Arguments passed to the tool, without the tool path itself
    pub fn resolve_args(cmd: &Command) -> Vec<String> {
        let mut args = Vec::with_capacity(cmd.args().len() + 6);

        if let Some(device) = cmd.device() {
            args.push(TARGET_FLAG.to_string());
            args.push(device.identity().to_string());
        }

        if cmd.kind() == CommandKind::BridgeShell {
            args.push("shell".to_string());
            if cmd.run_as_root() {
                // su takes the line as one argument, so it must survive the
                // device shell's split in one piece
                let mut line = cmd.tag().to_string();
                for arg in cmd.args() {
                    line.push(' ');
                    line.push_str(arg);
                }
                args.extend(["su".to_string(), "-c".to_string(), shell_quote(&line)]);
                return args;
            }
        }

        args.push(cmd.tag().to_string());
        args.extend(cmd.args().iter().cloned());
        args
    }

    /// Full argv, tool path first, after validating the command
    pub fn resolve_argv(&self, cmd: &Command) -> BridgeResult<Vec<String>> {
        let (program, args, _) = self.prepare(cmd)?;
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(program.to_string_lossy().into_owned());
        argv.extend(args);
        Ok(argv)
    }

    fn validate_target(&self, cmd: &Command) -> BridgeResult<()> {
        let Some(device) = cmd.device() else {
            return Ok(());
        };

        if !self.registry.resolves(device) {
            return Err(BridgeError::UnknownDevice(device.identity().to_string()));
        }

        let state = device.state();
        if let Some(reason) = state.targeting_restriction() {
            return Err(BridgeError::IllegalDeviceState {
                identity: device.identity().to_string(),
                state,
                reason,
            });
        }

        Ok(())
    }

    fn prepare(&self, cmd: &Command) -> BridgeResult<(PathBuf, Vec<String>, ProcessLimits)> {
        self.validate_target(cmd)?;
        let program = self.locator.resolve(cmd.kind())?;
        let limits = ProcessLimits {
            timeout: cmd.timeout().unwrap_or_else(|| self.default_timeout()),
            kill_grace: self.kill_grace,
            output_grace: self.output_grace,
        };
        Ok((program, Self::resolve_args(cmd), limits))
    }

    /// Validate and start `cmd`, returning the raw process handle
    pub async fn run_get_process_handle(&self, cmd: &Command) -> BridgeResult<ProcessHandle> {
        let (program, args, limits) = self.prepare(cmd)?;
        debug!("Running `{}`", cmd);

        // Held until the process exists, not until it exits
        let _launch = self.launch_lock.lock().await;
        let handle = ProcessHandle::launch(&program, &args, &self.scratch_dir, limits)?;
        self.launched.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    /// Run `cmd` to completion
    pub async fn run(&self, cmd: &Command) -> BridgeResult<ExecutionResult> {
        self.run_get_process_handle(cmd).await?.wait().await
    }

    pub async fn run_no_output(&self, cmd: &Command) -> BridgeResult<()> {
        self.run(cmd).await.map(|_| ())
    }

    pub async fn run_output_only(&self, cmd: &Command) -> BridgeResult<String> {
        self.run(cmd).await.map(|result| result.output)
    }

    pub async fn run_exit_code_only(&self, cmd: &Command) -> BridgeResult<i32> {
        self.run(cmd).await.map(|result| result.exit_code)
    }

    /// Run `cmd` and return its output, failing unless it exited with zero
    pub async fn run_checked(&self, cmd: &Command) -> BridgeResult<String> {
        let result = self.run(cmd).await?;
        if result.success() {
            return Ok(result.output);
        }

        let output = if result.timed_out {
            format!("timed out\n{}", result.output)
        } else {
            result.output
        };
        Err(BridgeError::CommandFailed {
            command: cmd.to_string(),
            output,
        })
    }

    /// Run `cmd` on the runtime in the background
    pub fn spawn(self: &Arc<Self>, cmd: Command) -> CommandTask {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let broker = Arc::clone(self);

        let handle = tokio::spawn(async move {
            if token.is_cancelled() {
                return Err(BridgeError::Cancelled);
            }
            let process = broker.run_get_process_handle(&cmd).await?;
            process.wait_or_cancel(&token).await
        });

        CommandTask { handle, cancel }
    }
}

/// A command running in the background
///
/// Dropping the task detaches it; the command still runs to completion.
pub struct CommandTask {
    handle: JoinHandle<BridgeResult<ExecutionResult>>,
    cancel: CancellationToken,
}

impl CommandTask {
    /// Kill the process, or keep it from starting
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the result
    pub async fn join(self) -> BridgeResult<ExecutionResult> {
        self.handle.await?
    }
}
