//! Remote control server for the pilot daemon.
//!
//! Accepts TCP connections, dispatches commands to the launcher and runs the
//! background tasks that feed server output, exits and launcher log events
//! back to clients.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pilot_core::config::Settings;
use pilot_core::{ConfigStore, LogEntry, ProcessOutput, Supervisor};
use pilot_rpc::commands::{CommandResponse, metadata_from_params};
use pilot_rpc::protocol::{Message, Response, RpcError};
use pilot_rpc::transport::JsonRpcCodec;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

use crate::config_watcher::spawn_config_watcher;
use crate::error::{DaemonError, Result};
use crate::handlers::{self, HandlerContext};
use crate::launcher::Launcher;
use crate::logging::LogControl;
use crate::notifier::Notifier;
use crate::session::{ClientId, ClientIds};

const REAP_INTERVAL: Duration = Duration::from_millis(250);
const CONFIG_RELOAD_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DaemonState {
    pub launcher: Launcher,
    pub notifier: Notifier,
    pub client_ids: ClientIds,
    pub shutdown: bool,
}

impl DaemonState {
    #[must_use]
    pub fn new(launcher: Launcher, notifier: Notifier) -> Self {
        Self {
            launcher,
            notifier,
            client_ids: ClientIds::default(),
            shutdown: false,
        }
    }

    pub fn connect_client(&mut self, tx: mpsc::UnboundedSender<Message>) -> ClientId {
        let id = self.client_ids.next_id();
        self.notifier.register(id, tx);
        id
    }

    pub fn remove_client(&mut self, id: ClientId) {
        self.notifier.unregister(id);
    }

    pub(crate) fn create_handler_context(&mut self, client_id: ClientId) -> HandlerContext<'_> {
        HandlerContext {
            launcher: &mut self.launcher,
            notifier: &mut self.notifier,
            client_id,
        }
    }
}

/// Command-line switches that win over `config.json`, also after a reload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagOverrides {
    pub allow_write: bool,
    pub allow_overwrite: bool,
}

impl FlagOverrides {
    pub fn apply(self, settings: &mut Settings) {
        settings.allow_remote_write |= self.allow_write;
        settings.allow_overwrite |= self.allow_overwrite;
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Effective settings, overrides already applied
    pub settings: Settings,
    /// Watched for hot reload when set
    pub settings_path: Option<PathBuf>,
    pub overrides: FlagOverrides,
    pub device_set_dir: PathBuf,
    /// Config file to connect the local server to at startup
    pub connect: Option<String>,
}

pub struct Daemon {
    listener: TcpListener,
    state: Arc<RwLock<DaemonState>>,
    output_rx: mpsc::UnboundedReceiver<ProcessOutput>,
    log_entries: Option<mpsc::UnboundedReceiver<LogEntry>>,
    settings_path: Option<PathBuf>,
    overrides: FlagOverrides,
    connect: Option<String>,
}

impl Daemon {
    /// Bind the listen address and set up the launcher.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::AddrInUse` if another launcher holds the address,
    /// or an I/O error if binding or creating the device-set directory fails.
    pub async fn bind(config: DaemonConfig, mut log: LogControl) -> Result<Self> {
        let DaemonConfig {
            settings,
            settings_path,
            overrides,
            device_set_dir,
            connect,
        } = config;

        let listener = TcpListener::bind(&settings.listen_address)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AddrInUse => {
                    DaemonError::AddrInUse(settings.listen_address.clone())
                }
                _ => DaemonError::Io(e),
            })?;
        info!("Daemon listening on {}", listener.local_addr()?);

        std::fs::create_dir_all(&device_set_dir)?;
        info!("Device set directory: {}", device_set_dir.display());

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(&settings.server_executable, output_tx)
            .with_policy(settings.process.policy())
            .with_working_dir(settings.server_working_dir.clone());
        let store = ConfigStore::new(device_set_dir, settings.permissions());

        let log_entries = log.take_entries();
        let notifier = Notifier::new(log.forward().clone());
        let launcher = Launcher::new(supervisor, store, settings.log_level, log);

        Ok(Self {
            listener,
            state: Arc::new(RwLock::new(DaemonState::new(launcher, notifier))),
            output_rx,
            log_entries,
            settings_path,
            overrides,
            connect,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    #[must_use]
    pub fn state(&self) -> Arc<RwLock<DaemonState>> {
        self.state.clone()
    }

    /// Serve until ctrl-c.
    ///
    /// # Errors
    ///
    /// See [`Daemon::serve_until`].
    pub async fn serve(self) -> Result<()> {
        self.serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `shutdown` completes, then stop every server.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`; accept errors are logged and skipped.
    pub async fn serve_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            listener,
            state,
            output_rx,
            log_entries,
            settings_path,
            overrides,
            connect,
        } = self;

        let mut tasks: Vec<JoinHandle<()>> = vec![
            tokio::spawn(output_pump(state.clone(), output_rx)),
            tokio::spawn(exit_reaper(state.clone())),
        ];
        if let Some(entries) = log_entries {
            tasks.push(tokio::spawn(log_forwarder(state.clone(), entries)));
        }
        if let Some(path) = settings_path {
            tasks.push(tokio::spawn(spawn_config_watcher_task(
                path,
                overrides,
                state.clone(),
            )));
        }

        if let Some(config) = connect {
            let mut state_guard = state.write().await;
            let state_ref = &mut *state_guard;
            state_ref
                .launcher
                .connect_local(&state_ref.notifier, Some(config))
                .await;
        }

        tokio::pin!(shutdown);
        info!("Ready to accept connections");
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested, stopping server");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("Accepted connection from {addr}");
                        let state = state.clone();
                        tokio::spawn(handle_connection(stream, state));
                    }
                    Err(e) => error!("Accept error: {e}"),
                },
            }
        }

        {
            let mut state_guard = state.write().await;
            state_guard.shutdown = true;
            let state_ref = &mut *state_guard;
            state_ref.launcher.shutdown(&state_ref.notifier).await;
        }

        for task in tasks {
            task.abort();
        }
        Ok(())
    }
}

/// Bind and serve until ctrl-c.
///
/// # Errors
///
/// Returns an error if the daemon cannot bind its address.
pub async fn run(config: DaemonConfig, log: LogControl) -> Result<()> {
    Daemon::bind(config, log).await?.serve().await
}

async fn spawn_config_watcher_task(
    settings_path: PathBuf,
    overrides: FlagOverrides,
    state: Arc<RwLock<DaemonState>>,
) {
    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel::<()>();

    let _watcher = spawn_config_watcher(settings_path.clone(), reload_tx);

    while reload_rx.recv().await.is_some() {
        debug!("Settings reload event received");

        let mut settings = match Settings::load(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                error!("Failed to reload settings: {e}");
                continue;
            }
        };
        overrides.apply(&mut settings);

        let state_guard = tokio::time::timeout(CONFIG_RELOAD_LOCK_TIMEOUT, state.write()).await;
        let Ok(mut state_guard) = state_guard else {
            error!("Settings reload timed out waiting for write lock");
            continue;
        };
        state_guard.launcher.apply_settings(&settings);
        info!("Settings reloaded");
    }

    debug!("Config watcher task ended");
}

async fn output_pump(
    state: Arc<RwLock<DaemonState>>,
    mut output_rx: mpsc::UnboundedReceiver<ProcessOutput>,
) {
    while let Some(output) = output_rx.recv().await {
        let mut state_guard = state.write().await;
        let state_ref = &mut *state_guard;
        state_ref
            .launcher
            .handle_output(&state_ref.notifier, &output);
    }
    debug!("Output pump stopped");
}

async fn exit_reaper(state: Arc<RwLock<DaemonState>>) {
    let mut interval = tokio::time::interval(REAP_INTERVAL);

    loop {
        interval.tick().await;

        let mut state_guard = state.write().await;
        if state_guard.shutdown {
            break;
        }
        let state_ref = &mut *state_guard;
        state_ref.launcher.reap(&state_ref.notifier);
    }

    debug!("Exit reaper stopped");
}

async fn log_forwarder(
    state: Arc<RwLock<DaemonState>>,
    mut entries: mpsc::UnboundedReceiver<LogEntry>,
) {
    while let Some(entry) = entries.recv().await {
        let state_guard = state.read().await;
        state_guard.notifier.forward_log(&entry);
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<RwLock<DaemonState>>) {
    let framed = Framed::new(stream, JsonRpcCodec::new());
    let (mut sink, mut stream) = framed.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let client_id = {
        let mut state_guard = state.write().await;
        state_guard.connect_client(tx)
    };
    info!("Client connected: {client_id}");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            trace!("[{client_id}] sending {:?}", msg.method());
            if let Err(e) = sink.send(msg).await {
                warn!("Failed to send to {client_id}: {e}");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(msg) => {
                let Some(response) = process_message(client_id, msg, &state).await else {
                    continue;
                };
                let state_guard = state.read().await;
                if !state_guard.notifier.respond(client_id, response) {
                    break;
                }
            }
            Err(e) => {
                warn!("Read error from {client_id}: {e}");
                break;
            }
        }
    }

    info!("Client disconnected: {client_id}");
    {
        let mut state_guard = state.write().await;
        state_guard.remove_client(client_id);
    }
    send_task.abort();
}

async fn process_message(
    client_id: ClientId,
    msg: Message,
    state: &Arc<RwLock<DaemonState>>,
) -> Option<Message> {
    match msg {
        Message::Request(request) => {
            if let Err(e) = check_params(request.params.as_ref()) {
                warn!("Rejecting {} from {client_id}: {e}", request.method);
                return request
                    .id
                    .map(|id| Message::Response(Response::error(id, RpcError::from(e))));
            }
            let response =
                run_command(client_id, &request.method, request.params.as_ref(), state).await;
            match (request.id, response) {
                (Some(id), Some(response)) => {
                    Some(Message::Response(Response::success(id, response.to_value())))
                }
                (Some(id), None) => Some(Message::Response(Response::error(
                    id,
                    DaemonError::MethodNotFound(request.method).into(),
                ))),
                (None, Some(response)) => {
                    debug!(
                        "Dropping response to non-blocking {} from {client_id} (successful: {})",
                        request.method, response.successful
                    );
                    None
                }
                (None, None) => None,
            }
        }

        Message::Notification(notification) => {
            if let Err(e) = check_params(notification.params.as_ref()) {
                warn!("Ignoring {} from {client_id}: {e}", notification.method);
                return None;
            }
            run_command(client_id, &notification.method, notification.params.as_ref(), state)
                .await;
            None
        }

        Message::Response(response) => {
            warn!("Unexpected response from {client_id}: id={}", response.id);
            None
        }
    }
}

/// Command metadata travels as a JSON object, or is omitted.
fn check_params(params: Option<&Value>) -> Result<()> {
    match params {
        None | Some(Value::Object(_) | Value::Null) => Ok(()),
        Some(_) => Err(DaemonError::InvalidParams(
            "Command metadata must be an object".to_string(),
        )),
    }
}

async fn run_command(
    client_id: ClientId,
    method: &str,
    params: Option<&Value>,
    state: &Arc<RwLock<DaemonState>>,
) -> Option<CommandResponse> {
    let metadata = metadata_from_params(params);
    let mut state_guard = state.write().await;
    let mut ctx = state_guard.create_handler_context(client_id);
    handlers::dispatch(&mut ctx, method, &metadata).await
}
