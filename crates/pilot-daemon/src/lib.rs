//! Pilot daemon library: server supervision behind a remote control socket.
//!
//! Clients connect over TCP and speak length-prefixed JSON-RPC. Commands list
//! and upload device-set files and start or stop server processes; server
//! lifecycle events and log output are pushed back as notifications.

pub(crate) mod config_watcher;
pub mod error;
pub(crate) mod handlers;
pub mod launcher;
pub mod logging;
pub mod notifier;
pub mod server;
pub mod session;
pub mod subscriptions;

pub use error::{DaemonError, Result};
pub use launcher::{ConnectionState, Launcher, LocalConnection, StartedServer};
pub use logging::{ForwardHandle, ForwardLayer, LogControl, PauseGuard, forward_layer};
pub use notifier::Notifier;
pub use server::{Daemon, DaemonConfig, DaemonState, FlagOverrides, run};
pub use session::ClientId;
pub use subscriptions::SubscriptionRegistry;
