//! Launcher state behind the command handlers.
//!
//! Owns the supervisor, the config store and the local connection. Anything
//! that must be announced to clients goes through the [`Notifier`] passed in
//! by the caller.

use std::path::Path;

use pilot_core::config::Settings;
use pilot_core::device_set::{DeviceSetSummary, discover_endpoints, format_endpoints};
use pilot_core::log::{StatusSignal, StatusSuffix, parse_line, sniff};
use pilot_core::{ConfigStore, LogLevel, ProcessOutput, Result, StopOutcome, Supervisor};
use tracing::{debug, error, info, warn};

use crate::logging::{LogControl, emit_server_record};
use crate::notifier::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Started, waiting for the running status line
    Connecting,
    Connected,
}

/// The operator's own server connection
#[derive(Debug, Default)]
pub struct LocalConnection {
    config: Option<String>,
    state: ConnectionState,
    suffix: StatusSuffix,
}

impl LocalConnection {
    #[must_use]
    pub fn config(&self) -> Option<&str> {
        self.config.as_deref()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Status text gathered from the server's log.
    #[must_use]
    pub fn status(&self) -> &str {
        self.suffix.as_str()
    }

    fn is(&self, key: &str) -> bool {
        self.config.as_deref() == Some(key)
    }

    fn reset(&mut self) {
        self.config = None;
        self.state = ConnectionState::Disconnected;
        self.suffix.clear();
    }
}

/// What a successful start reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedServer {
    pub name: String,
    pub level: LogLevel,
    /// Declared endpoints, `name:port` joined by `;`
    pub servers: String,
}

pub struct Launcher {
    supervisor: Supervisor,
    store: ConfigStore,
    local: LocalConnection,
    log_level: LogLevel,
    log_control: LogControl,
}

impl Launcher {
    #[must_use]
    pub fn new(
        supervisor: Supervisor,
        store: ConfigStore,
        log_level: LogLevel,
        log_control: LogControl,
    ) -> Self {
        Self {
            supervisor,
            store,
            local: LocalConnection::default(),
            log_level: launcher_level(log_level),
            log_control,
        }
    }

    #[must_use]
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    #[must_use]
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    #[must_use]
    pub fn local(&self) -> &LocalConnection {
        &self.local
    }

    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    /// Launch the server for a config file in the store and announce it.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or the process does not start.
    pub async fn start_server(
        &mut self,
        notifier: &Notifier,
        name: &str,
        requested: LogLevel,
    ) -> Result<StartedServer> {
        let path = self.store.path_of(name)?;
        let content = self.store.read(name)?;
        let key = Supervisor::instance_key(&path);
        let level = Supervisor::effective_level(requested, self.log_level);

        self.supervisor.start(&path, level).await?;

        let servers = match discover_endpoints(&content) {
            Ok(endpoints) => format_endpoints(&endpoints),
            Err(e) => {
                warn!("Unable to read server endpoints from {key}: {e}");
                String::new()
            }
        };

        match DeviceSetSummary::parse(&content) {
            Ok(summary) => info!(
                "Device set \"{}\" started: {}",
                summary.display_name(&key),
                summary.description.as_deref().unwrap_or("no description")
            ),
            Err(e) => debug!("No device set summary for {key}: {e}"),
        }

        notifier.server_started(&key, level, &content, &servers);
        Ok(StartedServer {
            name: key,
            level,
            servers,
        })
    }

    /// Stop the server for `name`; `ServerStopped` goes out if one was running.
    pub async fn stop_server(&mut self, notifier: &Notifier, name: &str) -> StopOutcome {
        let key = Supervisor::instance_key(Path::new(name));
        let outcome = self.supervisor.stop(&key).await;

        if outcome != StopOutcome::NotRunning {
            notifier.server_stopped(&key);
        }
        if self.local.is(&key) {
            self.local.reset();
        }
        outcome
    }

    /// Switch the local connection to `config`, or disconnect with `None`.
    pub async fn connect_local(&mut self, notifier: &Notifier, config: Option<String>) -> bool {
        if let Some(current) = self.local.config.take() {
            self.stop_server(notifier, &current).await;
        }
        self.local.reset();

        let Some(name) = config else {
            info!("Local connection closed");
            return true;
        };

        match self.start_server(notifier, &name, LogLevel::Undefined).await {
            Ok(started) => {
                info!("Connecting to local server {}", started.name);
                self.local.config = Some(started.name);
                self.local.state = ConnectionState::Connecting;
                true
            }
            Err(e) => {
                error!("Failed to start local server {name}: {e}");
                false
            }
        }
    }

    /// Frame, log, forward and sniff a chunk of server output.
    pub fn handle_output(&mut self, notifier: &Notifier, output: &ProcessOutput) {
        for line in self.supervisor.take_lines(output) {
            self.handle_line(notifier, &output.key, &line);
        }
    }

    fn handle_line(&mut self, notifier: &Notifier, key: &str, line: &str) {
        let record = match parse_line(line) {
            Ok(record) => record,
            Err(e) => {
                error!("{e}");
                return;
            }
        };

        if record.level.is_within(self.log_level) {
            emit_server_record(record.level, &record.message);
            notifier.forward_log(&record.to_entry());
        }

        if !record.is_sniffable() {
            return;
        }
        let Some(signal) = sniff(&record.message) else {
            return;
        };

        if self.local.is(key) && self.local.suffix.apply(&signal) {
            self.local.state = ConnectionState::Connected;
        }
        if signal == StatusSignal::Running {
            self.supervisor.mark_ready(key);
        }
    }

    /// Clean up servers that exited on their own.
    pub fn reap(&mut self, notifier: &Notifier) -> usize {
        let exited = self.supervisor.reap_exited();
        for server in &exited {
            for line in &server.trailing_lines {
                self.handle_line(notifier, &server.key, line);
            }
            notifier.server_stopped(&server.key);
            if self.local.is(&server.key) {
                warn!("Local server {} exited, disconnecting", server.key);
                self.local.reset();
            }
        }
        exited.len()
    }

    /// Stop every server; used on daemon shutdown.
    pub async fn shutdown(&mut self, notifier: &Notifier) {
        self.local.reset();
        for (key, outcome) in self.supervisor.shutdown_all().await {
            if outcome != StopOutcome::NotRunning {
                notifier.server_stopped(&key);
            }
        }
    }

    /// Change the launcher log level. Refused while any server runs, since
    /// running servers keep the verbosity they were started with.
    pub fn set_log_level(&mut self, level: LogLevel) -> bool {
        let level = launcher_level(level);
        if level == self.log_level {
            return true;
        }
        if !self.supervisor.is_empty() {
            warn!("Log level change to {level} rejected while servers are running");
            return false;
        }
        if !self.log_control.apply_level(level) {
            return false;
        }
        info!("Log level changed from {} to {level}", self.log_level);
        self.log_level = level;
        true
    }

    /// Apply hot-reloadable settings.
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.store.set_permissions(settings.permissions());
        self.supervisor.set_policy(settings.process.policy());
        self.set_log_level(settings.log_level);
    }
}

/// `Undefined` would filter out every server record; the launcher runs at
/// INFO instead.
fn launcher_level(level: LogLevel) -> LogLevel {
    if level == LogLevel::Undefined {
        LogLevel::Info
    } else {
        level
    }
}
