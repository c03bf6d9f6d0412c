//! Lifecycle of server child processes, keyed by config basename.
//!
//! The supervisor owns every child. Output is read by small pump tasks that
//! only forward raw chunks; framing happens here, on the owner side, so all
//! state changes happen in one place.

mod shutdown;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use pilot_types::LogLevel;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};

use crate::log::LineFramer;
use crate::{Error, Result};

/// Children that exited keep their entry until both pipes are drained, but
/// not longer than this.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

const READ_BUFFER_SIZE: usize = 4096;

/// Level the server always runs at, at minimum. Status detection depends on
/// INFO lines.
pub const FLOOR_LEVEL: LogLevel = LogLevel::Info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessPolicy {
    /// How long a fresh child must stay alive to count as started
    pub start_grace: Duration,
    /// Interval between termination requests while stopping
    pub stop_retry: Duration,
    /// Total time allowed for a graceful stop before killing
    pub stop_timeout: Duration,
}

impl Default for ProcessPolicy {
    fn default() -> Self {
        Self {
            start_grace: Duration::from_millis(500),
            stop_retry: Duration::from_millis(300),
            stop_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputData {
    Chunk(Vec<u8>),
    /// End of stream
    Closed,
}

/// Raw output from one stream of one child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub key: String,
    pub pid: u32,
    pub stream: OutputStream,
    pub data: OutputData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was tracked under the key
    NotRunning,
    Clean,
    /// The child had to be killed after the stop timeout
    Forced,
}

impl StopOutcome {
    #[must_use]
    pub fn is_clean(self) -> bool {
        self != Self::Forced
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessErrorKind {
    FailedToStart,
    Crashed,
}

impl fmt::Display for ProcessErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailedToStart => write!(f, "FailedToStart"),
            Self::Crashed => write!(f, "Crashed"),
        }
    }
}

/// A tracked instance that exited on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitedServer {
    pub key: String,
    pub code: Option<i32>,
    /// Incomplete lines still buffered when the instance was reaped
    pub trailing_lines: Vec<String>,
}

#[derive(Debug)]
pub struct ServerInstance {
    key: String,
    config_path: PathBuf,
    child: Child,
    pid: u32,
    working_dir: PathBuf,
    log_level: LogLevel,
    state: InstanceState,
    ready: bool,
    stdout: LineFramer,
    stderr: LineFramer,
    open_streams: u8,
    exited_at: Option<(Instant, Option<i32>)>,
}

impl ServerInstance {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    #[must_use]
    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// Set once the server reported all of its servers running.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    fn framer(&mut self, stream: OutputStream) -> &mut LineFramer {
        match stream {
            OutputStream::Stdout => &mut self.stdout,
            OutputStream::Stderr => &mut self.stderr,
        }
    }

    fn drain_framers(&mut self) -> Vec<String> {
        self.stdout
            .flush()
            .into_iter()
            .chain(self.stderr.flush())
            .collect()
    }
}

pub struct Supervisor {
    executable: PathBuf,
    working_dir: Option<PathBuf>,
    policy: ProcessPolicy,
    instances: HashMap<String, ServerInstance>,
    output_tx: mpsc::UnboundedSender<ProcessOutput>,
}

impl Supervisor {
    pub fn new(
        executable: impl Into<PathBuf>,
        output_tx: mpsc::UnboundedSender<ProcessOutput>,
    ) -> Self {
        Self {
            executable: executable.into(),
            working_dir: None,
            policy: ProcessPolicy::default(),
            instances: HashMap::new(),
            output_tx,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ProcessPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, working_dir: Option<PathBuf>) -> Self {
        self.working_dir = working_dir;
        self
    }

    #[must_use]
    pub fn policy(&self) -> &ProcessPolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: ProcessPolicy) {
        self.policy = policy;
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Instance key of a config file: its basename.
    #[must_use]
    pub fn instance_key(config_path: &Path) -> String {
        config_path.file_name().map_or_else(
            || config_path.to_string_lossy().into_owned(),
            |name| name.to_string_lossy().into_owned(),
        )
    }

    /// Verbosity the child actually runs at.
    #[must_use]
    pub fn effective_level(requested: LogLevel, fallback: LogLevel) -> LogLevel {
        let requested = if requested == LogLevel::Undefined {
            fallback
        } else {
            requested
        };
        requested.max(FLOOR_LEVEL)
    }

    /// Program to spawn. A relative path with a directory part is resolved
    /// against our own working directory, since the child gets another one.
    /// A bare name is left for `PATH` lookup.
    fn program_path(&self) -> std::io::Result<PathBuf> {
        if self.executable.is_relative() && self.executable.components().count() > 1 {
            std::path::absolute(&self.executable)
        } else {
            Ok(self.executable.clone())
        }
    }

    fn working_dir_for_child(&self, program: &Path) -> Option<PathBuf> {
        self.working_dir.clone().or_else(|| {
            program
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(Path::to_path_buf)
        })
    }

    /// Launch a server for `config_path` and wait out the start grace period.
    ///
    /// Success means the process was still alive after the grace period, not
    /// that it is ready to accept connections.
    ///
    /// # Errors
    ///
    /// `Error::AlreadyRunning` if an instance with the same key is tracked,
    /// `Error::Process` if the child cannot be spawned or exits during the
    /// grace period.
    pub async fn start(&mut self, config_path: &Path, level: LogLevel) -> Result<u32> {
        let key = Self::instance_key(config_path);
        if self.instances.contains_key(&key) {
            return Err(Error::AlreadyRunning(key));
        }

        let config_path = std::path::absolute(config_path)?;
        let program = self.program_path()?;
        let working_dir = self.working_dir_for_child(&program);

        let mut command = Command::new(&program);
        command
            .arg(format!("--config-file={}", config_path.display()))
            .arg(format!("--verbose={}", level.verbosity()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &working_dir {
            command.current_dir(dir);
        }

        debug!(
            "[{key}] Spawning {} --config-file={} --verbose={}",
            program.display(),
            config_path.display(),
            level.verbosity()
        );

        let mut child = command.spawn().map_err(|e| {
            error!("Server process error: {}", ProcessErrorKind::FailedToStart);
            Error::Process(format!("failed to spawn {}: {e}", program.display()))
        })?;

        let Some(pid) = child.id() else {
            error!("Server process error: {}", ProcessErrorKind::Crashed);
            return Err(Error::Process("server exited before it was tracked".into()));
        };

        let mut open_streams = 0;
        if let Some(stdout) = child.stdout.take() {
            spawn_output_pump(&key, pid, OutputStream::Stdout, stdout, self.output_tx.clone());
            open_streams += 1;
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_output_pump(&key, pid, OutputStream::Stderr, stderr, self.output_tx.clone());
            open_streams += 1;
        }

        self.instances.insert(
            key.clone(),
            ServerInstance {
                key: key.clone(),
                config_path,
                child,
                pid,
                working_dir: working_dir.unwrap_or_default(),
                log_level: level,
                state: InstanceState::Starting,
                ready: false,
                stdout: LineFramer::new(),
                stderr: LineFramer::new(),
                open_streams,
                exited_at: None,
            },
        );

        let grace = self.policy.start_grace;
        let early_exit = match self.instances.get_mut(&key) {
            Some(instance) => timeout(grace, instance.child.wait()).await,
            None => return Err(Error::Process("server instance vanished during start".into())),
        };

        match early_exit {
            Err(_elapsed) => {
                if let Some(instance) = self.instances.get_mut(&key) {
                    instance.state = InstanceState::Running;
                }
                info!("[{key}] Server started (pid {pid})");
                Ok(pid)
            }
            Ok(status) => {
                self.instances.remove(&key);
                error!("Server process error: {}", ProcessErrorKind::Crashed);
                let detail = match status {
                    Ok(status) => format!("server exited during startup ({status})"),
                    Err(e) => format!("failed to wait for server: {e}"),
                };
                Err(Error::Process(detail))
            }
        }
    }

    /// Stop the instance tracked under `key`. The instance is always removed.
    pub async fn stop(&mut self, key: &str) -> StopOutcome {
        let Some(mut instance) = self.instances.remove(key) else {
            debug!("[{key}] Stop requested but no server is running");
            return StopOutcome::NotRunning;
        };

        instance.state = InstanceState::Stopping;
        info!("[{key}] Stopping server (pid {})", instance.pid);

        let outcome = shutdown::terminate(&mut instance.child, instance.pid, &self.policy).await;
        match outcome {
            StopOutcome::Forced => warn!("[{key}] Server did not shut down cleanly"),
            _ => info!("[{key}] Server stopped"),
        }
        outcome
    }

    /// Stop every tracked instance, in key order.
    pub async fn shutdown_all(&mut self) -> Vec<(String, StopOutcome)> {
        let mut outcomes = Vec::new();
        for key in self.keys() {
            let outcome = self.stop(&key).await;
            outcomes.push((key, outcome));
        }
        outcomes
    }

    /// Frame a chunk of output. Returns the completed lines, or nothing if
    /// the chunk belongs to a process that is no longer tracked.
    pub fn take_lines(&mut self, output: &ProcessOutput) -> Vec<String> {
        let Some(instance) = self.instances.get_mut(&output.key) else {
            return Vec::new();
        };
        if instance.pid != output.pid {
            debug!(
                "[{}] Dropping output from stale pid {}",
                output.key, output.pid
            );
            return Vec::new();
        }

        match &output.data {
            OutputData::Chunk(bytes) => instance.framer(output.stream).push(bytes),
            OutputData::Closed => {
                instance.open_streams = instance.open_streams.saturating_sub(1);
                instance.framer(output.stream).flush().into_iter().collect()
            }
        }
    }

    /// Collect instances whose process has exited without a stop request.
    ///
    /// An exited instance is kept until its output pipes are drained (or a
    /// short grace passes) so its last lines are not lost.
    pub fn reap_exited(&mut self) -> Vec<ExitedServer> {
        let now = Instant::now();
        let mut reaped = Vec::new();

        for (key, instance) in &mut self.instances {
            if instance.exited_at.is_none() {
                match instance.child.try_wait() {
                    Ok(Some(status)) => instance.exited_at = Some((now, status.code())),
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("[{key}] Failed to poll server process: {e}");
                        continue;
                    }
                }
            }

            if let Some((exited, _)) = instance.exited_at
                && (instance.open_streams == 0 || now.duration_since(exited) >= DRAIN_GRACE)
            {
                reaped.push(key.clone());
            }
        }

        reaped
            .into_iter()
            .filter_map(|key| self.instances.remove(&key))
            .map(|mut instance| {
                let code = instance.exited_at.and_then(|(_, code)| code);
                match code {
                    Some(0) => info!("Server process terminated."),
                    Some(code) => error!("Server stopped unexpectedly. Return code: {code}"),
                    None => error!("Server stopped unexpectedly. Return code: unknown"),
                }
                ExitedServer {
                    trailing_lines: instance.drain_framers(),
                    key: instance.key,
                    code,
                }
            })
            .collect()
    }

    /// Record that the instance reported all servers running.
    pub fn mark_ready(&mut self, key: &str) -> bool {
        match self.instances.get_mut(key) {
            Some(instance) if !instance.ready => {
                instance.ready = true;
                info!("[{key}] Server reports ready");
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ServerInstance> {
        self.instances.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.instances.contains_key(key)
    }

    /// Tracked keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.instances.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Keys of instances that reported ready, sorted.
    #[must_use]
    pub fn ready_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .instances
            .values()
            .filter(|instance| instance.ready)
            .map(|instance| instance.key.clone())
            .collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }
}

fn spawn_output_pump<R>(
    key: &str,
    pid: u32,
    stream: OutputStream,
    mut reader: R,
    tx: mpsc::UnboundedSender<ProcessOutput>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let key = key.to_string();
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let output = ProcessOutput {
                        key: key.clone(),
                        pid,
                        stream,
                        data: OutputData::Chunk(buf[..n].to_vec()),
                    };
                    if tx.send(output).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    debug!("[{key}] Output read error on {stream:?}: {e}");
                    break;
                }
            }
        }
        let _ = tx.send(ProcessOutput {
            key,
            pid,
            stream,
            data: OutputData::Closed,
        });
    });
}
