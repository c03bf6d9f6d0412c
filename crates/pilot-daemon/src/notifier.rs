//! Outbound traffic to connected clients: responses, broadcasts and log
//! forwarding.

use std::collections::HashMap;

use pilot_rpc::commands::{
    log_message_notification, server_started_notification, server_stopped_notification,
};
use pilot_rpc::protocol::{Message, Notification};
use pilot_types::{LogEntry, LogLevel};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::logging::ForwardHandle;
use crate::session::ClientId;
use crate::subscriptions::SubscriptionRegistry;

pub struct Notifier {
    senders: HashMap<ClientId, mpsc::UnboundedSender<Message>>,
    subscriptions: SubscriptionRegistry,
    forward: ForwardHandle,
}

impl Notifier {
    #[must_use]
    pub fn new(forward: ForwardHandle) -> Self {
        Self {
            senders: HashMap::new(),
            subscriptions: SubscriptionRegistry::new(),
            forward,
        }
    }

    pub fn register(&mut self, client: ClientId, tx: mpsc::UnboundedSender<Message>) {
        self.senders.insert(client, tx);
    }

    /// Drop a disconnected client and prune it from the subscriptions.
    pub fn unregister(&mut self, client: ClientId) {
        self.senders.remove(&client);
        let connected = self.connected_ids();
        for pruned in self.subscriptions.retain_connected(&connected) {
            debug!("Removed log subscription of disconnected {pruned}");
        }
        self.sync_forwarding();
    }

    /// Connected clients, sorted.
    #[must_use]
    pub fn connected_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.senders.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn subscribe(&mut self, client: ClientId) -> bool {
        let added = self.subscriptions.subscribe(client);
        self.sync_forwarding();
        added
    }

    pub fn unsubscribe(&mut self, client: ClientId) -> bool {
        let removed = self.subscriptions.unsubscribe(client);
        self.sync_forwarding();
        removed
    }

    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    fn sync_forwarding(&self) {
        self.forward.set_enabled(!self.subscriptions.is_empty());
    }

    /// Send a response to one client. Failures are logged, never retried.
    pub fn respond(&self, client: ClientId, message: Message) -> bool {
        let sent = self
            .senders
            .get(&client)
            .is_some_and(|tx| tx.send(message).is_ok());
        if !sent {
            warn!("Unable to send command response to client {client}");
        }
        sent
    }

    /// Send a notification to every connected client.
    pub fn broadcast(&self, notification: &Notification) {
        for (client, tx) in &self.senders {
            if tx
                .send(Message::Notification(notification.clone()))
                .is_err()
            {
                warn!(
                    "Unable to send {} notification to client {client}",
                    notification.method
                );
            }
        }
    }

    pub fn server_started(&self, name: &str, level: LogLevel, content: &str, servers: &str) {
        self.broadcast(&server_started_notification(name, level, content, servers));
    }

    pub fn server_stopped(&self, name: &str) {
        self.broadcast(&server_stopped_notification(name));
    }

    /// Send a log entry to the current subscribers.
    ///
    /// The log observer is paused meanwhile, so anything logged while sending
    /// is not forwarded again.
    pub fn forward_log(&self, entry: &LogEntry) {
        if self.subscriptions.is_empty() {
            return;
        }

        let _guard = self.forward.pause();
        let notification = log_message_notification(entry);
        for client in self.subscriptions.snapshot() {
            let Some(tx) = self.senders.get(&client) else {
                continue;
            };
            if tx
                .send(Message::Notification(notification.clone()))
                .is_err()
            {
                warn!("Unable to send log message to client {client}");
            }
        }
    }
}
