//! Identity of remote control connections.

use std::fmt;

/// Identifier of one accepted connection. Ids start at 1 and are never
/// reused while the daemon runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl ClientId {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

impl From<u64> for ClientId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Hands out connection ids in accept order.
#[derive(Debug)]
pub struct ClientIds {
    next: u64,
}

impl Default for ClientIds {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl ClientIds {
    pub fn next_id(&mut self) -> ClientId {
        let id = ClientId(self.next);
        self.next += 1;
        id
    }
}
