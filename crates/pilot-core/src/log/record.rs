//! Parsing of server log lines into structured records.
//!
//! Server lines look like `|INFO|002.417000|Message text|in /src/File.cxx(123)`.
//! Anything that does not start with a known severity is kept as free text.

use pilot_types::{LogEntry, LogLevel, LogOrigin};
use thiserror::Error;

pub const FIELD_SEPARATOR: char = '|';
pub const TIME_PLACEHOLDER: &str = "time???";
pub const MESSAGE_PLACEHOLDER: &str = "message???";
pub const LOCATION_PLACEHOLDER: &str = "location???";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineParseError {
    #[error("Incorrectly formatted message received from server. Cannot parse.")]
    NoTokens,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

/// How a line was understood
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Severity, timestamp, message and a well-formed location
    Structured,
    /// Known severity but the location bracketing is broken; not sniffed
    MalformedLocation,
    /// No separator or unknown severity; the whole line is the message
    FreeForm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub timestamp: String,
    pub message: String,
    pub location: Option<SourceLocation>,
    pub origin: LogOrigin,
    pub kind: RecordKind,
}

impl LogRecord {
    /// Whether status sniffing may look at this record's message.
    #[must_use]
    pub fn is_sniffable(&self) -> bool {
        self.kind != RecordKind::MalformedLocation
    }

    #[must_use]
    pub fn to_entry(&self) -> LogEntry {
        LogEntry::new(self.level, self.origin, self.message.clone())
    }

    fn free_form(line: &str) -> Self {
        Self {
            level: LogLevel::Info,
            timestamp: TIME_PLACEHOLDER.to_string(),
            message: line.trim_end().to_string(),
            location: None,
            origin: LogOrigin::Server,
            kind: RecordKind::FreeForm,
        }
    }
}

/// Parse one complete line of server output.
///
/// # Errors
///
/// Returns [`LineParseError::NoTokens`] when the line contains separators but
/// only whitespace between them.
pub fn parse_line(line: &str) -> Result<LogRecord, LineParseError> {
    if !line.contains(FIELD_SEPARATOR) {
        return Ok(LogRecord::free_form(line));
    }

    let tokens: Vec<&str> = line
        .split(FIELD_SEPARATOR)
        .filter(|token| !token.trim().is_empty())
        .collect();

    let Some(first) = tokens.first() else {
        return Err(LineParseError::NoTokens);
    };

    let Some(level) = LogLevel::from_token(first) else {
        return Ok(LogRecord::free_form(line));
    };

    let timestamp = tokens.get(1).map_or(TIME_PLACEHOLDER, |t| t.trim());
    let message = tokens.get(2).map_or(MESSAGE_PLACEHOLDER, |t| t.trim());
    let raw_location = tokens.get(3).copied().unwrap_or(LOCATION_PLACEHOLDER);

    let location = parse_location(raw_location);
    let kind = if location.is_some() {
        RecordKind::Structured
    } else {
        RecordKind::MalformedLocation
    };

    Ok(LogRecord {
        level,
        timestamp: timestamp.to_string(),
        message: message.to_string(),
        location,
        origin: LogOrigin::Server,
        kind,
    })
}

/// Extract `file` and `line` from `in /path/File.cxx(123)`.
///
/// The line number sits inside the last parenthesized segment; everything
/// before it is the file. A non-numeric line number becomes 0.
#[must_use]
pub fn parse_location(raw: &str) -> Option<SourceLocation> {
    let raw = raw.trim();
    let open = raw.rfind('(')?;
    let close = raw.rfind(')')?;
    if close < open {
        return None;
    }

    let line = raw[open + 1..close].trim().parse().unwrap_or(0);

    let file = raw[..open].trim();
    let file = file.strip_prefix("in ").unwrap_or(file).trim();
    let file = file
        .strip_prefix('(')
        .and_then(|f| f.strip_suffix(')'))
        .unwrap_or(file);

    Some(SourceLocation {
        file: file.to_string(),
        line,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_structured_line() {
        let record =
            parse_line("|INFO|002.417000| Server status: Server(s) are running.|in /src/PlusServer.cxx(311)")
                .unwrap();
        assert_eq!(record.level, LogLevel::Info);
        assert_eq!(record.timestamp, "002.417000");
        assert_eq!(record.message, "Server status: Server(s) are running.");
        assert_eq!(
            record.location,
            Some(SourceLocation {
                file: "/src/PlusServer.cxx".to_string(),
                line: 311
            })
        );
        assert_eq!(record.origin, LogOrigin::Server);
        assert_eq!(record.kind, RecordKind::Structured);
        assert!(record.is_sniffable());
    }

    #[test]
    fn test_missing_fields_use_placeholders() {
        let record = parse_line("WARNING|").unwrap();
        assert_eq!(record.level, LogLevel::Warning);
        assert_eq!(record.timestamp, "time???");
        assert_eq!(record.message, "message???");
        assert_eq!(record.location, None);

        let record = parse_line("ERROR|001.5|device lost").unwrap();
        assert_eq!(record.timestamp, "001.5");
        assert_eq!(record.message, "device lost");
        assert_eq!(record.kind, RecordKind::MalformedLocation);
    }

    #[test]
    fn test_malformed_location_not_sniffable() {
        let record = parse_line("DEBUG|1.0|Server status: stopped|in file.cxx)12(").unwrap();
        assert_eq!(record.kind, RecordKind::MalformedLocation);
        assert_eq!(record.message, "Server status: stopped");
        assert!(!record.is_sniffable());
    }

    #[test]
    fn test_line_without_separator_is_info_free_form() {
        let record = parse_line("Plus OpenIGTLink server listening on IPs: 10.0.0.2").unwrap();
        assert_eq!(record.level, LogLevel::Info);
        assert_eq!(record.origin, LogOrigin::Server);
        assert_eq!(record.kind, RecordKind::FreeForm);
        assert_eq!(
            record.message,
            "Plus OpenIGTLink server listening on IPs: 10.0.0.2"
        );
        assert!(record.is_sniffable());
    }

    #[test]
    fn test_unknown_severity_is_free_form() {
        let record = parse_line("NOTICE|1.0|hello|in a.cxx(1)").unwrap();
        assert_eq!(record.kind, RecordKind::FreeForm);
        assert_eq!(record.level, LogLevel::Info);
        assert_eq!(record.message, "NOTICE|1.0|hello|in a.cxx(1)");
    }

    #[test]
    fn test_only_separators_is_parse_error() {
        assert_eq!(parse_line("|||"), Err(LineParseError::NoTokens));
        assert_eq!(parse_line("| | |"), Err(LineParseError::NoTokens));
        assert_eq!(parse_line(" |\t| "), Err(LineParseError::NoTokens));
        assert_eq!(
            LineParseError::NoTokens.to_string(),
            "Incorrectly formatted message received from server. Cannot parse."
        );
    }

    #[test]
    fn test_blank_tokens_are_skipped() {
        let record =
            parse_line("INFO| |Server status: Server(s) are running.|in a.cxx(1)").unwrap();
        assert_eq!(record.timestamp, "Server status: Server(s) are running.");
        assert_eq!(record.message, "in a.cxx(1)");
        assert_eq!(record.kind, RecordKind::MalformedLocation);

        let record = parse_line("WARNING|  |1.5|  |device lost|  |in a.cxx(7)").unwrap();
        assert_eq!(record.timestamp, "1.5");
        assert_eq!(record.message, "device lost");
        assert_eq!(record.kind, RecordKind::Structured);
    }

    #[test]
    fn test_severity_match_is_case_insensitive() {
        let record = parse_line("trace|0.1|tick|in a.cxx(9)").unwrap();
        assert_eq!(record.level, LogLevel::Trace);
    }

    #[test]
    fn test_parse_location_variants() {
        assert_eq!(
            parse_location("in C:\\Plus\\vtkPlusDevice.cxx(87)"),
            Some(SourceLocation {
                file: "C:\\Plus\\vtkPlusDevice.cxx".to_string(),
                line: 87
            })
        );
        assert_eq!(
            parse_location("prefix(File.cxx)(42)"),
            Some(SourceLocation {
                file: "prefix(File.cxx)".to_string(),
                line: 42
            })
        );
        assert_eq!(
            parse_location("(File.cxx)(42)"),
            Some(SourceLocation {
                file: "File.cxx".to_string(),
                line: 42
            })
        );
        assert_eq!(parse_location("in a.cxx(abc)").map(|l| l.line), Some(0));
        assert_eq!(parse_location("location???"), None);
        assert_eq!(parse_location("in a.cxx(12"), None);
    }

    #[test]
    fn test_to_entry_keeps_level_and_origin() {
        let entry = parse_line("ERROR|1|boom|in a.cxx(1)").unwrap().to_entry();
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.origin, LogOrigin::Server);
        assert_eq!(entry.message, "boom");
    }
}
