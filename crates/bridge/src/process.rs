//! Process supervision
//!
//! One external tool invocation: stdout and stderr share a single OS pipe,
//! a blocking pump drains it line by line, and waiting is bounded by the
//! command timeout. A timed out or cancelled process is killed and reaped
//! with a single bounded wait.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::process::{Child, Command as ProcessCommand};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{BridgeError, BridgeResult};

/// Exit code reported when no status could be obtained
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Outcome of one finished invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    /// stdout and stderr, merged in the order they were read
    pub output: String,
    /// The process was killed because it outlived its timeout
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines()
    }
}

/// Time bounds applied to one process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessLimits {
    pub timeout: Duration,
    pub kill_grace: Duration,
    pub output_grace: Duration,
}

enum Outcome {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// A running tool process
pub struct ProcessHandle {
    child: Child,
    program: PathBuf,
    output: Arc<Mutex<String>>,
    pump: Option<JoinHandle<()>>,
    limits: ProcessLimits,
}

impl ProcessHandle {
    /// Start `program` with merged output. Must be called inside the broker's launch section.
    pub(crate) fn launch(
        program: &Path,
        args: &[String],
        working_dir: &Path,
        limits: ProcessLimits,
    ) -> BridgeResult<Self> {
        let launch_error = |source| BridgeError::ProcessLaunch {
            program: program.to_path_buf(),
            source,
        };

        let (reader, writer) = os_pipe::pipe().map_err(launch_error)?;
        let writer_err = writer.try_clone().map_err(launch_error)?;

        let mut command = ProcessCommand::new(program);
        command
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(writer_err)
            .kill_on_drop(true);

        let child = command.spawn().map_err(launch_error)?;
        // The parent's copies of the write end live in `command`; release them so the pump sees EOF
        drop(command);

        debug!("Launched {:?} (pid {:?})", program, child.id());

        let output = Arc::new(Mutex::new(String::new()));
        let pump = spawn_output_pump(reader, Arc::clone(&output));

        Ok(Self {
            child,
            program: program.to_path_buf(),
            output,
            pump: Some(pump),
            limits,
        })
    }

    /// OS process id, while the process has not been reaped
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn timeout(&self) -> Duration {
        self.limits.timeout
    }

    /// Output captured so far
    pub fn output_so_far(&self) -> String {
        self.output.lock().clone()
    }

    /// Send a kill signal without waiting
    pub fn kill(&mut self) -> BridgeResult<()> {
        self.child.start_kill()?;
        Ok(())
    }

    /// Wait for exit, killing the process once its timeout elapses
    pub async fn wait(self) -> BridgeResult<ExecutionResult> {
        self.wait_or_cancel(&CancellationToken::new()).await
    }

    /// Like [`wait`](Self::wait), but a cancelled token also kills the process
    pub(crate) async fn wait_or_cancel(
        mut self,
        cancel: &CancellationToken,
    ) -> BridgeResult<ExecutionResult> {
        let outcome = tokio::select! {
            status = self.child.wait() => Outcome::Exited(status?),
            _ = tokio::time::sleep(self.limits.timeout) => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        let (status, timed_out) = match outcome {
            Outcome::Exited(status) => (Some(status), false),
            Outcome::TimedOut => {
                warn!(
                    "{:?} did not finish within {:?}, killing it",
                    self.program, self.limits.timeout
                );
                (self.terminate().await, true)
            }
            Outcome::Cancelled => {
                debug!("{:?} cancelled, killing it", self.program);
                self.terminate().await;
                self.drain().await;
                return Err(BridgeError::Cancelled);
            }
        };

        let output = self.drain().await;
        let exit_code = status.map(exit_code).unwrap_or(UNKNOWN_EXIT_CODE);
        debug!("{:?} exited with {}", self.program, exit_code);

        Ok(ExecutionResult {
            exit_code,
            output,
            timed_out,
        })
    }

    /// Kill, then wait once for at most the kill grace period
    async fn terminate(&mut self) -> Option<ExitStatus> {
        if let Err(e) = self.child.start_kill() {
            warn!("Failed to kill {:?}: {}", self.program, e);
        }

        match tokio::time::timeout(self.limits.kill_grace, self.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                warn!("Failed to reap {:?}: {}", self.program, e);
                None
            }
            Err(_) => {
                warn!(
                    "{:?} still running {:?} after kill, giving up on its status",
                    self.program, self.limits.kill_grace
                );
                None
            }
        }
    }

    /// Give the pump a bounded chance to reach EOF, then snapshot the buffer
    async fn drain(&mut self) -> String {
        if let Some(pump) = self.pump.take() {
            if tokio::time::timeout(self.limits.output_grace, pump).await.is_err() {
                // A descendant still holds the pipe open
                debug!("Output of {:?} still open, returning what was read", self.program);
            }
        }
        self.output.lock().clone()
    }
}

fn spawn_output_pump(reader: os_pipe::PipeReader, sink: Arc<Mutex<String>>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let reader = BufReader::new(reader);
        for line in reader.split(b'\n') {
            let Ok(bytes) = line else { break };
            let text = String::from_utf8_lossy(&bytes);
            let text = text.strip_suffix('\r').unwrap_or(&text);

            let mut buffer = sink.lock();
            buffer.push_str(text);
            buffer.push('\n');
        }
    })
}

/// Exit code, `128 + signal` for signal deaths on unix, else -1
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    UNKNOWN_EXIT_CODE
}
