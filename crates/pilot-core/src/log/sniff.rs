//! Detection of server lifecycle phrases in log messages.

pub const LISTENING_TRIGGER: &str = "server listening on IPs:";
pub const RUNNING_STATUS: &str = "Server status: Server(s) are running.";
pub const STATUS_PREFIX: &str = "Server status: ";

/// What a log message says about the server's state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusSignal {
    /// Listening addresses announced; the whole message is kept
    Listening(String),
    /// All servers in the device set are up
    Running,
    /// Any other status line
    Status(String),
}

/// Match a message against the known status phrases (case-sensitive substrings).
#[must_use]
pub fn sniff(message: &str) -> Option<StatusSignal> {
    if message.contains(LISTENING_TRIGGER) {
        Some(StatusSignal::Listening(message.to_string()))
    } else if message.contains(RUNNING_STATUS) {
        Some(StatusSignal::Running)
    } else if message.contains(STATUS_PREFIX) {
        Some(StatusSignal::Status(message.to_string()))
    } else {
        None
    }
}

/// Human-readable state text built from status signals.
///
/// Listening announcements accumulate, one per line; any other status line
/// replaces the whole text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSuffix(String);

impl StatusSuffix {
    /// Apply a signal; returns true if it reported the servers as running.
    pub fn apply(&mut self, signal: &StatusSignal) -> bool {
        match signal {
            StatusSignal::Listening(message) => {
                self.0.push_str(message);
                self.0.push('\n');
                false
            }
            StatusSignal::Running => true,
            StatusSignal::Status(message) => {
                self.0.clone_from(message);
                false
            }
        }
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
