//! Shared types for Pilot launcher components.
//!
//! This crate provides the value types used across pilot-core, pilot-rpc,
//! pilot-daemon, and pilot-cli. All types are serializable for RPC transport.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Log severity shared by the launcher and the supervised server.
///
/// Variants are declared in verbosity order, so `Ord` compares by verbosity:
/// `Error < Warning < Info < Debug < Trace`. `Undefined` sorts below
/// everything and means "no explicit level requested".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Undefined,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// All levels that can appear as a severity token in a server log line.
    pub const KNOWN: [LogLevel; 5] = [
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    /// Integer verbosity passed to the server on its command line.
    #[must_use]
    pub fn verbosity(self) -> i32 {
        match self {
            LogLevel::Undefined => -1,
            LogLevel::Error => 1,
            LogLevel::Warning => 2,
            LogLevel::Info => 3,
            LogLevel::Debug => 4,
            LogLevel::Trace => 5,
        }
    }

    #[must_use]
    pub fn from_verbosity(value: i32) -> Option<Self> {
        match value {
            -1 => Some(LogLevel::Undefined),
            1 => Some(LogLevel::Error),
            2 => Some(LogLevel::Warning),
            3 => Some(LogLevel::Info),
            4 => Some(LogLevel::Debug),
            5 => Some(LogLevel::Trace),
            _ => None,
        }
    }

    /// Match a severity token as written by the server (`INFO`, ` warning `, ...).
    ///
    /// Only the five known severities match; `UNDEFINED` is not a valid token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim();
        Self::KNOWN
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(token))
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Undefined => "UNDEFINED",
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    /// Whether a record at `self` passes a threshold of `max`.
    #[must_use]
    pub fn is_within(self, max: LogLevel) -> bool {
        self <= max
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a log level string is neither a name nor a verbosity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLogLevelError(pub String);

impl fmt::Display for ParseLogLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown log level: {}", self.0)
    }
}

impl std::error::Error for ParseLogLevelError {}

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    /// Accepts a level name (case-insensitive) or an integer verbosity.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("UNDEFINED") {
            return Ok(LogLevel::Undefined);
        }
        if let Some(level) = LogLevel::from_token(trimmed) {
            return Ok(level);
        }
        trimmed
            .parse::<i32>()
            .ok()
            .and_then(LogLevel::from_verbosity)
            .ok_or_else(|| ParseLogLevelError(s.to_string()))
    }
}

/// Where a log record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogOrigin {
    /// Emitted by the launcher itself
    Launcher,
    /// Parsed from a supervised server's output
    Server,
}

impl LogOrigin {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogOrigin::Launcher => "LAUNCHER",
            LogOrigin::Server => "SERVER",
        }
    }
}

impl fmt::Display for LogOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A log line ready to be forwarded to subscribed clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub origin: LogOrigin,
    pub message: String,
}

impl LogEntry {
    #[must_use]
    pub fn new(level: LogLevel, origin: LogOrigin, message: impl Into<String>) -> Self {
        Self {
            level,
            origin,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn server(level: LogLevel, message: impl Into<String>) -> Self {
        Self::new(level, LogOrigin::Server, message)
    }

    #[must_use]
    pub fn launcher(level: LogLevel, message: impl Into<String>) -> Self {
        Self::new(level, LogOrigin::Launcher, message)
    }
}
