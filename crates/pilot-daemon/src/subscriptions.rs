//! Clients that opted in to live log forwarding.

use std::collections::BTreeSet;

use tracing::debug;

use crate::session::ClientId;

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    clients: BTreeSet<ClientId>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the client was already subscribed.
    pub fn subscribe(&mut self, client: ClientId) -> bool {
        self.clients.insert(client)
    }

    /// Returns false if the client was not subscribed.
    pub fn unsubscribe(&mut self, client: ClientId) -> bool {
        self.clients.remove(&client)
    }

    /// Drop every subscriber that is not in `connected`.
    pub fn retain_connected(&mut self, connected: &[ClientId]) -> Vec<ClientId> {
        let stale: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|id| !connected.contains(id))
            .copied()
            .collect();
        for id in &stale {
            self.clients.remove(id);
            debug!("[{id}] Log subscription dropped, client disconnected");
        }
        stale
    }

    #[must_use]
    pub fn contains(&self, client: ClientId) -> bool {
        self.clients.contains(&client)
    }

    /// Current subscribers, copied so the set can change while sending.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ClientId> {
        self.clients.iter().copied().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }
}
