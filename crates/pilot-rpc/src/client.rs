//! Remote control client for the pilot daemon.
//!
//! Wraps a framed TCP connection, correlates command responses by request id
//! and hands everything else (`ServerStarted`, `LogMessage`, ...) to
//! [`RpcClient::recv`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::codec::Framed;

use crate::commands::{CommandName, CommandResponse, Metadata, metadata_to_params};
use crate::protocol::{Message, Request, RequestId, Response, RpcError};
use crate::transport::{CodecError, JsonRpcCodec};

/// Default remote control address of the launcher.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:18904";

/// Environment variable that overrides [`DEFAULT_ADDRESS`].
pub const ADDRESS_ENV: &str = "PILOT_ADDRESS";

/// Starting a server can legitimately take the full stop timeout of a
/// previous instance plus the start grace period.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Daemon address, honouring `$PILOT_ADDRESS`.
#[must_use]
pub fn daemon_address() -> String {
    std::env::var(ADDRESS_ENV).unwrap_or_else(|_| DEFAULT_ADDRESS.to_string())
}

/// Errors that can occur with the RPC client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC error: {code} - {message}")]
    Rpc { code: i32, message: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Request timeout")]
    Timeout,

    #[error("Unexpected response type")]
    UnexpectedResponse,
}

impl From<RpcError> for ClientError {
    fn from(e: RpcError) -> Self {
        ClientError::Rpc {
            code: e.code,
            message: e.message,
        }
    }
}

type PendingRequest = oneshot::Sender<Result<Response, ClientError>>;
type FramedSink = futures_util::stream::SplitSink<Framed<TcpStream, JsonRpcCodec>, Message>;

/// Client for the launcher's remote control channel
pub struct RpcClient {
    sender: Arc<Mutex<FramedSink>>,
    incoming_rx: mpsc::Receiver<Message>,
    pending: Arc<Mutex<HashMap<RequestId, PendingRequest>>>,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Connect to the daemon at [`daemon_address`].
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Io` if the connection fails.
    pub async fn connect() -> Result<Self, ClientError> {
        Self::connect_to(&daemon_address()).await
    }

    /// Connect to the daemon at a specific `host:port`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Io` if the connection fails.
    pub async fn connect_to(address: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        let (sink, mut stream) = Framed::new(stream, JsonRpcCodec::new()).split();

        let pending: Arc<Mutex<HashMap<RequestId, PendingRequest>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let pending_clone = pending.clone();

        let (incoming_tx, incoming_rx) = mpsc::channel(256);

        tokio::spawn(async move {
            while let Some(result) = stream.next().await {
                match result {
                    Ok(Message::Response(resp)) => {
                        if let Some(tx) = pending_clone.lock().await.remove(&resp.id) {
                            let _ = tx.send(Ok(resp));
                        }
                    }
                    Ok(msg) => {
                        if incoming_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!("Client read error: {e}");
                        break;
                    }
                }
            }
            for (_, tx) in pending_clone.lock().await.drain() {
                let _ = tx.send(Err(ClientError::ConnectionClosed));
            }
        });

        Ok(Self {
            sender: Arc::new(Mutex::new(sink)),
            incoming_rx,
            pending,
            next_id: AtomicU64::new(1),
        })
    }

    /// Send a blocking command and wait for its response.
    ///
    /// A response with `Successful: false` is still `Ok`; only transport and
    /// protocol failures are errors.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails, the connection closes, the daemon
    /// answers with a JSON-RPC error, or the request times out.
    pub async fn command(
        &self,
        name: &str,
        metadata: &Metadata,
    ) -> Result<CommandResponse, ClientError> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let request = Request::new(name, Some(metadata_to_params(metadata)), id.clone());

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if let Err(e) = self.sender.lock().await.send(Message::Request(request)).await {
            self.pending.lock().await.remove(&id);
            return Err(e.into());
        }

        let response = match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => response?,
            Ok(Err(_)) => return Err(ClientError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(ClientError::Timeout);
            }
        };

        if let Some(error) = response.error {
            return Err(error.into());
        }

        let result = response.result.ok_or(ClientError::UnexpectedResponse)?;
        Ok(serde_json::from_value(result)?)
    }

    /// Typed shorthand for [`RpcClient::command`].
    ///
    /// # Errors
    ///
    /// See [`RpcClient::command`].
    pub async fn send(
        &self,
        name: CommandName,
        metadata: &Metadata,
    ) -> Result<CommandResponse, ClientError> {
        self.command(name.as_str(), metadata).await
    }

    /// Send a non-blocking command; the daemon's response is discarded.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Codec` if sending fails.
    pub async fn notify(&self, name: &str, metadata: &Metadata) -> Result<(), ClientError> {
        let request = Request::notification(name, Some(metadata_to_params(metadata)));
        self.sender
            .lock()
            .await
            .send(Message::Request(request))
            .await?;
        Ok(())
    }

    /// Next unsolicited message from the daemon, `None` once disconnected.
    pub async fn recv(&mut self) -> Option<Message> {
        self.incoming_rx.recv().await
    }
}
