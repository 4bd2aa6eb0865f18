//! Channel - owns one worker process and its command fifo.
//!
//! Flow:
//! 1. Create a fresh temp directory with a fifo in it
//! 2. Spawn the worker pointed at the fifo, stdout+stderr merged into one pipe
//! 3. Open the fifo for writing once the worker has opened it for reading
//! 4. `send()` writes one JSON document per call, optionally draining output
//! 5. `cleanup()` (or drop) kills the worker and removes the fifo directory

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio::time::Instant;

use crate::output::OutputReader;
use crate::transport::{CommandSink, FifoTransport};

pub const DEFAULT_PROGRAM: &str = "daq_application";
/// Overrides [`DEFAULT_PROGRAM`] in [`ChannelConfig::default`].
pub const PROGRAM_ENV: &str = "DAQ_APPLICATION";
pub const COMMAND_FACILITY_FLAG: &str = "--commandFacility";
pub const PIPE_NAME: &str = "commands.jstream";

const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub program: PathBuf,
    /// Arguments placed before the facility flag.
    pub args: Vec<String>,
    pub facility_flag: String,
    pub pipe_name: String,
    pub temp_prefix: String,
    pub connect_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        let program = std::env::var_os(PROGRAM_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRAM));
        Self {
            program,
            args: Vec::new(),
            facility_flag: COMMAND_FACILITY_FLAG.to_string(),
            pipe_name: PIPE_NAME.to_string(),
            temp_prefix: "daqrepl-".to_string(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl ChannelConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_facility_flag(mut self, flag: impl Into<String>) -> Self {
        self.facility_flag = flag.into();
        self
    }

    pub fn with_pipe_name(mut self, name: impl Into<String>) -> Self {
        self.pipe_name = name.into();
        self
    }

    pub fn with_temp_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_prefix = prefix.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Worker spawned, fifo not yet open for writing. Only seen inside `spawn`.
    Starting,
    Ready,
    /// Writing a command or draining output after it.
    Sending,
    /// Worker killed and transport removed. Absorbing.
    Terminated,
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to create command fifo: {0}")]
    Transport(#[source] io::Error),
    #[error("failed to create output pipe: {0}")]
    Pipe(#[source] io::Error),
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("worker exited before opening the command fifo ({0})")]
    Exited(ExitStatus),
    #[error("worker did not open the command fifo within {0:?}")]
    ConnectTimeout(Duration),
    #[error("failed to open command fifo: {0}")]
    Connect(#[source] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("worker process is gone")]
    ProcessGone,
    #[error("command is not serializable: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to write command: {0}")]
    Transport(#[source] io::Error),
    #[error("failed to read worker output: {0}")]
    Output(#[source] io::Error),
    #[error("failed to remove transport: {0}")]
    Cleanup(#[source] io::Error),
}

pub struct Channel {
    state: ChannelState,
    fifo: FifoTransport,
    worker: Option<Child>,
    output: Option<OutputReader<pipe::Receiver>>,
    /// Set while a payload is being written; still set if that write was dropped.
    write_pending: bool,
}

impl Channel {
    /// Spawn the worker and wait until it has opened the command fifo.
    ///
    /// Everything created along the way is released again on failure.
    pub async fn spawn(config: ChannelConfig) -> Result<Self, SpawnError> {
        let fifo = FifoTransport::create(&config.temp_prefix, &config.pipe_name)
            .map_err(SpawnError::Transport)?;
        let uri = fifo.uri();

        tracing::info!(program = %config.program.display(), uri = %uri, "Spawning worker");
        let (child, stream) = spawn_worker(&config, &uri)?;

        let mut channel = Self {
            state: ChannelState::Starting,
            fifo,
            worker: Some(child),
            output: Some(OutputReader::new(stream)),
            write_pending: false,
        };

        if let Err(e) = channel.connect(config.connect_timeout).await {
            tracing::warn!(error = %e, "Worker failed to start");
            if let Err(cleanup_err) = channel.cleanup() {
                tracing::warn!(error = %cleanup_err, "Failed to remove transport directory");
            }
            return Err(e);
        }

        channel.state = ChannelState::Ready;
        tracing::info!(pid = ?channel.worker_id(), "Worker connected to command fifo");
        Ok(channel)
    }

    async fn connect(&mut self, timeout: Duration) -> Result<(), SpawnError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.fifo.try_open().map_err(SpawnError::Connect)? {
                return Ok(());
            }

            if let Some(child) = self.worker.as_mut()
                && let Some(status) = child.try_wait().map_err(SpawnError::Connect)?
            {
                return Err(SpawnError::Exited(status));
            }

            if Instant::now() >= deadline {
                return Err(SpawnError::ConnectTimeout(timeout));
            }
            tokio::time::sleep(CONNECT_POLL_INTERVAL).await;
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn transport_path(&self) -> &Path {
        self.fifo.path()
    }

    pub fn worker_id(&self) -> Option<u32> {
        self.worker.as_ref().and_then(Child::id)
    }

    /// Poll the worker's exit status without blocking.
    pub fn is_alive(&mut self) -> bool {
        let Some(child) = self.worker.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::debug!(%status, "Worker has exited");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to poll worker status");
                false
            }
        }
    }

    /// Send one command, then collect output for up to `wait`.
    ///
    /// `None` or a zero budget returns an empty string right after the write.
    /// A dead worker or a failed write tears the channel down, and so does
    /// the next call after a send that was dropped before its write finished.
    pub async fn send<C: Serialize + ?Sized>(
        &mut self,
        command: &C,
        wait: Option<Duration>,
    ) -> Result<String, ChannelError> {
        self.ensure_alive()?;

        let payload = serde_json::to_vec(command)?;
        self.state = ChannelState::Sending;
        self.write_pending = true;
        if let Err(e) = self.fifo.write(&payload).await {
            self.write_pending = false;
            tracing::warn!(error = %e, "Command write failed, tearing down channel");
            self.cleanup_logged();
            return Err(ChannelError::Transport(e));
        }
        self.write_pending = false;
        tracing::debug!(payload_bytes = payload.len(), "Sent command");

        let result = match wait {
            Some(budget) if !budget.is_zero() => self.drain(budget).await,
            _ => Ok(String::new()),
        };
        self.state = ChannelState::Ready;
        result
    }

    /// Collect whatever the worker prints within `budget`.
    pub async fn output(&mut self, budget: Duration) -> Result<String, ChannelError> {
        if self.state == ChannelState::Terminated {
            return Err(ChannelError::ProcessGone);
        }
        self.drain(budget).await
    }

    async fn drain(&mut self, budget: Duration) -> Result<String, ChannelError> {
        match self.output.as_mut() {
            Some(reader) => reader.drain(budget).await.map_err(ChannelError::Output),
            None => Ok(String::new()),
        }
    }

    fn ensure_alive(&mut self) -> Result<(), ChannelError> {
        self.reject_interrupted_write()?;
        match self.state {
            ChannelState::Terminated => return Err(ChannelError::ProcessGone),
            // The previous send was dropped mid-drain.
            ChannelState::Sending => self.state = ChannelState::Ready,
            ChannelState::Starting | ChannelState::Ready => {}
        }

        if !self.is_alive() {
            tracing::warn!("Worker is gone, tearing down channel");
            self.cleanup_logged();
            return Err(ChannelError::ProcessGone);
        }
        Ok(())
    }

    /// A dropped send may have left part of its payload in the fifo. Nothing
    /// else may follow it, so the channel is torn down instead.
    fn reject_interrupted_write(&mut self) -> Result<(), ChannelError> {
        if !self.write_pending {
            return Ok(());
        }
        self.write_pending = false;
        tracing::warn!("Previous command write was interrupted, tearing down channel");
        self.cleanup_logged();
        Err(ChannelError::Transport(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "previous command write was interrupted",
        )))
    }

    /// Kill the worker if one is held. Does not change state.
    pub fn terminate(&mut self) {
        if let Some(mut child) = self.worker.take() {
            let pid = child.id();
            match child.start_kill() {
                Ok(()) => tracing::debug!(?pid, "Killed worker"),
                Err(e) => tracing::debug!(?pid, error = %e, "Worker already gone"),
            }
        }
    }

    /// Kill the worker, close the fifo and remove its directory.
    ///
    /// Safe to call repeatedly; each resource is released once.
    pub fn cleanup(&mut self) -> io::Result<()> {
        self.terminate();
        self.output = None;
        let result = self.fifo.close();
        if self.state != ChannelState::Terminated {
            tracing::debug!("Channel terminated");
            self.state = ChannelState::Terminated;
        }
        result
    }

    fn cleanup_logged(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::warn!(error = %e, "Failed to remove transport directory");
        }
    }

    /// Close the command fifo and let the worker finish on its own.
    ///
    /// Output is drained until the worker closes its end or `grace` runs
    /// out; the worker is killed if it is still running by then.
    pub async fn shutdown(&mut self, grace: Duration) -> Result<String, ChannelError> {
        if self.state == ChannelState::Terminated {
            return Err(ChannelError::ProcessGone);
        }
        self.reject_interrupted_write()?;
        let deadline = Instant::now() + grace;

        tracing::info!(grace_ms = grace.as_millis(), "Shutting down worker");
        self.fifo.close_writer();

        let mut output = String::new();
        if let Some(reader) = self.output.as_mut() {
            match reader.drain(deadline.saturating_duration_since(Instant::now())).await {
                Ok(text) => output = text,
                Err(e) => tracing::warn!(error = %e, "Failed to drain worker output"),
            }
        }

        if let Some(child) = self.worker.as_mut() {
            match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) => tracing::info!(%status, "Worker exited"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Failed to wait for worker"),
                Err(_) => tracing::warn!("Worker still running after grace period, killing"),
            }
        }

        self.cleanup().map_err(ChannelError::Cleanup)?;
        Ok(output)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.cleanup_logged();
    }
}

#[async_trait]
impl CommandSink for Channel {
    type Error = ChannelError;

    async fn submit(
        &mut self,
        command: &serde_json::Value,
        wait: Option<Duration>,
    ) -> Result<String, ChannelError> {
        self.send(command, wait).await
    }
}

/// Spawn `program [args..] <facility flag> <uri>` with stdout and stderr
/// sharing one pipe. Returns the child and the read end of that pipe.
fn spawn_worker(config: &ChannelConfig, uri: &str) -> Result<(Child, pipe::Receiver), SpawnError> {
    let (writer, reader) = pipe::pipe().map_err(SpawnError::Pipe)?;
    let stdout = writer.into_blocking_fd().map_err(SpawnError::Pipe)?;
    let stderr = stdout.try_clone().map_err(SpawnError::Pipe)?;

    // `command` holds the parent's copies of the write end; they close when it
    // drops at the end of this function so the reader can see end-of-stream.
    let mut command = Command::new(&config.program);
    command
        .args(&config.args)
        .arg(&config.facility_flag)
        .arg(uri)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);

    let child = command.spawn().map_err(|source| SpawnError::Spawn {
        program: config.program.display().to_string(),
        source,
    })?;
    Ok((child, reader))
}
