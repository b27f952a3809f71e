//! Process management layer
//!
//! Handles the language server child process lifecycle and stderr
//! draining, completely separate from transport concerns.

use crate::io::transport::StreamTransport;
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};

/// How long a graceful stop waits for the process to exit before SIGKILL
const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Process State Management
// ============================================================================

/// How to stop a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// SIGTERM, then SIGKILL if the process lingers
    Graceful,
    /// SIGKILL immediately
    Force,
}

/// Process lifecycle states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running { pid: u32 },
    Stopped,
}

impl ProcessState {
    pub fn pid(&self) -> Option<u32> {
        match self {
            ProcessState::Running { pid } => Some(*pid),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running { .. })
    }
}

// ============================================================================
// Stderr Monitoring Trait
// ============================================================================

/// Trait for monitoring stderr output from external processes
pub trait StderrMonitor: Send + Sync {
    /// Install a handler for stderr lines
    ///
    /// Only one handler can be active at a time. Must be installed before
    /// the process starts; stderr is drained either way.
    fn on_stderr_line<F>(&mut self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static;
}

// ============================================================================
// Process Management
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Process not started")]
    NotStarted,

    #[error("Process already started")]
    AlreadyStarted,

    #[error("Stdin not available")]
    StdinNotAvailable,

    #[error("Stdout not available")]
    StdoutNotAvailable,

    #[error("Stderr not available")]
    StderrNotAvailable,
}

/// Trait for managing external process lifecycle
#[async_trait]
pub trait ProcessManager: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn start(&mut self) -> Result<(), Self::Error>;

    async fn stop(&mut self, mode: StopMode) -> Result<(), Self::Error>;

    fn is_running(&self) -> bool;

    /// Hand out the transport over the process's stdin/stdout (once)
    fn create_stdio_transport(&mut self) -> Result<StreamTransport, Self::Error>;

    /// Synchronous force kill for Drop implementations
    fn kill_sync(&mut self);
}

/// Manages child processes spawned via Command
pub struct ChildProcessManager {
    command: String,

    args: Vec<String>,

    working_directory: Option<PathBuf>,

    /// Thread-safe process state, also updated by the wait task
    state: Arc<Mutex<ProcessState>>,

    /// Stdio transport (created when process starts)
    stdio_transport: Option<StreamTransport>,

    stderr_handler: Option<Box<dyn Fn(String) + Send + Sync>>,

    stderr_task: Option<JoinHandle<()>>,

    /// Waits for the child to exit
    wait_task: Option<JoinHandle<()>>,
}

impl ChildProcessManager {
    pub fn new(command: String, args: Vec<String>, working_dir: Option<PathBuf>) -> Self {
        Self {
            command,
            args,
            working_directory: working_dir,
            state: Arc::new(Mutex::new(ProcessState::NotStarted)),
            stdio_transport: None,
            stderr_handler: None,
            stderr_task: None,
            wait_task: None,
        }
    }

    /// Get current process state (thread-safe)
    pub fn get_state(&self) -> ProcessState {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.state.lock().unwrap().clone()
    }

    fn set_state(&self, state: ProcessState) {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        *self.state.lock().unwrap() = state;
    }

    /// Always drains stderr so the child never blocks on a full pipe
    fn spawn_stderr_monitor(&mut self, stderr: tokio::process::ChildStderr) {
        let handler = self.stderr_handler.take();

        let task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        trace!("ChildProcessManager: stderr EOF reached");
                        break;
                    }
                    Ok(_) => {
                        let line_content = line.trim().to_string();
                        if line_content.is_empty() {
                            continue;
                        }
                        match &handler {
                            Some(handler) => handler(line_content),
                            None => trace!("ChildProcessManager: stderr drained: {}", line_content),
                        }
                    }
                    Err(e) => {
                        error!("Failed to read from stderr: {}", e);
                        break;
                    }
                }
            }
        });

        self.stderr_task = Some(task);
    }

    fn spawn_wait_task(&mut self, mut child: Child) {
        let pid = self.get_state().pid();
        let state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            match child.wait().await {
                Ok(exit_status) => {
                    info!("Process PID {:?} exited with status: {}", pid, exit_status)
                }
                Err(e) => error!("Error waiting for child process: {}", e),
            }

            if let Ok(mut process_state) = state.lock() {
                *process_state = ProcessState::Stopped;
            }
        });

        self.wait_task = Some(task);
    }

    #[cfg(unix)]
    fn send_signal(pid: u32, signal: libc::c_int) -> bool {
        // SAFETY: kill(2) has no memory-safety preconditions
        unsafe { libc::kill(pid as libc::pid_t, signal) == 0 }
    }
}

#[async_trait]
impl ProcessManager for ChildProcessManager {
    type Error = ProcessError;

    async fn start(&mut self) -> Result<(), Self::Error> {
        if self.is_running() {
            return Err(ProcessError::AlreadyStarted);
        }

        info!("Starting process: {} {:?}", self.command, self.args);

        let mut command_builder = Command::new(&self.command);
        command_builder
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(working_dir) = &self.working_directory {
            command_builder.current_dir(working_dir);
        }

        let mut child = command_builder
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let Some(pid) = child.id() else {
            return Err(ProcessError::Io(io::Error::other(
                "Failed to get process ID",
            )));
        };
        info!("Process started with PID: {}", pid);
        self.set_state(ProcessState::Running { pid });

        let stdin = child.stdin.take().ok_or(ProcessError::StdinNotAvailable)?;
        let stdout = child
            .stdout
            .take()
            .ok_or(ProcessError::StdoutNotAvailable)?;
        let stderr = child
            .stderr
            .take()
            .ok_or(ProcessError::StderrNotAvailable)?;

        self.stdio_transport = Some(StreamTransport::from_child(stdin, stdout));
        self.spawn_stderr_monitor(stderr);
        self.spawn_wait_task(child);

        Ok(())
    }

    async fn stop(&mut self, mode: StopMode) -> Result<(), Self::Error> {
        let pid = match self.get_state().pid() {
            Some(pid) => pid,
            None => return Err(ProcessError::NotStarted),
        };

        // Unused transport (never handed to a client) closes with the process
        self.stdio_transport.take();

        #[cfg(unix)]
        {
            match mode {
                StopMode::Graceful => {
                    info!("Gracefully stopping process with PID: {}", pid);
                    if Self::send_signal(pid, libc::SIGTERM) {
                        trace!("Sent SIGTERM to process {}", pid);
                    }
                }
                StopMode::Force => {
                    info!("Force killing process with PID: {}", pid);
                    Self::send_signal(pid, libc::SIGKILL);
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = mode;
            warn!("Signal-based termination not available; process {} may remain", pid);
        }

        if let Some(mut wait_task) = self.wait_task.take() {
            if tokio::time::timeout(GRACEFUL_STOP_TIMEOUT, &mut wait_task)
                .await
                .is_err()
            {
                warn!("Process {} did not exit in time, killing", pid);
                #[cfg(unix)]
                Self::send_signal(pid, libc::SIGKILL);
                let _ = wait_task.await;
            }
        }

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        self.set_state(ProcessState::Stopped);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.get_state().is_running()
    }

    fn create_stdio_transport(&mut self) -> Result<StreamTransport, Self::Error> {
        self.stdio_transport.take().ok_or(ProcessError::NotStarted)
    }

    fn kill_sync(&mut self) {
        let Some(pid) = self.get_state().pid() else {
            return;
        };

        info!("Synchronously force killing process with PID: {}", pid);

        #[cfg(unix)]
        Self::send_signal(pid, libc::SIGKILL);

        #[cfg(not(unix))]
        warn!("Sync process kill not available - process may remain");

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        self.set_state(ProcessState::Stopped);
    }
}

impl StderrMonitor for ChildProcessManager {
    fn on_stderr_line<F>(&mut self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.stderr_handler = Some(Box::new(handler));
    }
}

impl Drop for ChildProcessManager {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("ChildProcessManager dropped while process is running - force killing");
            self.kill_sync();
        }
    }
}
