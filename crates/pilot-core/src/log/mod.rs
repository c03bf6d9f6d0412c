//! Server output handling: framing, record parsing and status sniffing.

mod framer;
mod record;
mod sniff;

pub use framer::{LineFramer, MAX_PENDING_LINE};
pub use record::{
    FIELD_SEPARATOR, LOCATION_PLACEHOLDER, LineParseError, LogRecord, MESSAGE_PLACEHOLDER,
    RecordKind, SourceLocation, TIME_PLACEHOLDER, parse_line, parse_location,
};
pub use sniff::{
    LISTENING_TRIGGER, RUNNING_STATUS, STATUS_PREFIX, StatusSignal, StatusSuffix, sniff,
};
