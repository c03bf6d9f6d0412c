//! Remote control protocol for the pilot server launcher.
//!
//! This crate provides the message types, transport codec, command
//! vocabulary and client helper used between the launcher daemon and its
//! remote clients.
//!
//! # Architecture
//!
//! - [`protocol`]: JSON-RPC 2.0 envelope (Request, Response, Notification)
//! - [`commands`]: command names, metadata keys, [`CommandResponse`] and notification builders
//! - [`transport`]: Length-prefixed codec for message framing
//! - [`client`]: RPC client for connecting to the daemon
//! - [`error`]: Result type alias
//!
//! # Example
//!
//! ```no_run
//! use pilot_rpc::{CommandName, Metadata, RpcClient, keys};
//!
//! # async fn example() -> Result<(), pilot_rpc::ClientError> {
//! let client = RpcClient::connect().await?;
//!
//! let mut metadata = Metadata::new();
//! metadata.insert(keys::CONFIG_FILE_NAME.to_string(), "setup.xml".to_string());
//! let response = client.send(CommandName::StartServer, &metadata).await?;
//!
//! println!("started: {} ({:?})", response.successful, response.get(keys::SERVERS));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod commands;
pub mod error;
pub mod protocol;
pub mod transport;

pub use client::{ADDRESS_ENV, ClientError, DEFAULT_ADDRESS, RpcClient, daemon_address};

pub use commands::{
    CommandName, CommandResponse, LIST_SEPARATOR, Metadata, events, keys, log_message_notification,
    metadata_from_params, metadata_to_params, server_started_notification,
    server_stopped_notification, split_list,
};

pub use error::{Error, Result};

pub use protocol::{
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, METHOD_NOT_FOUND, Message,
    Notification, PARSE_ERROR, Request, RequestId, Response, RpcError,
};

pub use transport::{CodecError, DEFAULT_MAX_FRAME, JsonRpcCodec};

pub use pilot_types::{LogEntry, LogLevel, LogOrigin};
