//! Remote command vocabulary.
//!
//! A command is a name plus a flat `key -> string` metadata map. Every
//! command gets exactly one [`CommandResponse`]; lifecycle and log events are
//! pushed to clients as notifications built by the `*_notification` helpers.

use std::collections::BTreeMap;
use std::fmt;

use pilot_types::{LogEntry, LogLevel};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::Error;
use crate::protocol::Notification;

/// Command metadata. Keys are unique; ordering is only for stable output.
pub type Metadata = BTreeMap<String, String>;

/// Metadata keys used by commands, responses and notifications
pub mod keys {
    pub const CONFIG_FILE_NAME: &str = "ConfigFileName";
    pub const CONFIG_FILE_CONTENT: &str = "ConfigFileContent";
    pub const CONFIG_FILES: &str = "ConfigFiles";
    pub const LOG_LEVEL: &str = "LogLevel";
    pub const SERVERS: &str = "Servers";
    pub const SEPARATOR: &str = "Separator";
    pub const MESSAGE: &str = "Message";
    pub const ORIGIN: &str = "Origin";
    pub const RUNNING_SERVERS: &str = "RunningServers";
    pub const READY_SERVERS: &str = "ReadyServers";
}

/// Separator used for every list-valued metadata entry
pub const LIST_SEPARATOR: &str = ";";

/// Inbound commands understood by the launcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandName {
    GetConfigFiles,
    AddConfigFile,
    StartServer,
    StopServer,
    LogSubscribe,
    LogUnsubscribe,
    GetRunningServers,
}

impl CommandName {
    pub const ALL: [CommandName; 7] = [
        CommandName::GetConfigFiles,
        CommandName::AddConfigFile,
        CommandName::StartServer,
        CommandName::StopServer,
        CommandName::LogSubscribe,
        CommandName::LogUnsubscribe,
        CommandName::GetRunningServers,
    ];

    /// Case-insensitive exact match against the known command names.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|command| command.as_str().eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CommandName::GetConfigFiles => "GetConfigFiles",
            CommandName::AddConfigFile => "AddConfigFile",
            CommandName::StartServer => "StartServer",
            CommandName::StopServer => "StopServer",
            CommandName::LogSubscribe => "LogSubscribe",
            CommandName::LogUnsubscribe => "LogUnsubscribe",
            CommandName::GetRunningServers => "GetRunningServers",
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound notification names
pub mod events {
    pub const SERVER_STARTED: &str = "ServerStarted";
    pub const SERVER_STOPPED: &str = "ServerStopped";
    pub const LOG_MESSAGE: &str = "LogMessage";
}

/// Result of one remote command.
///
/// Serializes flat: `{"Successful": true, "ConfigFileName": "setup.xml"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(rename = "Successful")]
    pub successful: bool,
    #[serde(rename = "ErrorMessage", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub metadata: Metadata,
}

impl CommandResponse {
    #[must_use]
    pub fn success() -> Self {
        Self {
            successful: true,
            error_message: None,
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            successful: false,
            error_message: Some(message.into()),
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Split a `;`-joined metadata value into its items.
    #[must_use]
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key).map(split_list).unwrap_or_default()
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Turn an unsuccessful response into [`Error::CommandFailed`].
    ///
    /// # Errors
    ///
    /// Returns `Error::CommandFailed` when `successful` is false.
    pub fn into_result(self, command: &str) -> crate::Result<Self> {
        if self.successful {
            return Ok(self);
        }
        Err(Error::CommandFailed {
            command: command.to_string(),
            message: self
                .error_message
                .unwrap_or_else(|| "no error message".to_string()),
        })
    }
}

/// Split a `;`-joined list, ignoring empty items.
#[must_use]
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(LIST_SEPARATOR)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read command metadata from JSON-RPC params.
///
/// Strings are taken verbatim, numbers and booleans are stringified, anything
/// else is dropped with a warning.
#[must_use]
pub fn metadata_from_params(params: Option<&Value>) -> Metadata {
    let mut metadata = Metadata::new();
    let Some(params) = params else {
        return metadata;
    };
    let Value::Object(map) = params else {
        if !params.is_null() {
            warn!("Command params are not an object, ignoring: {params}");
        }
        return metadata;
    };
    for (key, value) in map {
        match value {
            Value::String(s) => {
                metadata.insert(key.clone(), s.clone());
            }
            Value::Number(n) => {
                metadata.insert(key.clone(), n.to_string());
            }
            Value::Bool(b) => {
                metadata.insert(key.clone(), b.to_string());
            }
            other => warn!("Ignoring non-scalar metadata '{key}': {other}"),
        }
    }
    metadata
}

#[must_use]
pub fn metadata_to_params(metadata: &Metadata) -> Value {
    Value::Object(
        metadata
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

#[must_use]
pub fn server_started_notification(
    config_file_name: &str,
    log_level: LogLevel,
    config_file_content: &str,
    servers: &str,
) -> Notification {
    let mut metadata = Metadata::new();
    metadata.insert(keys::CONFIG_FILE_NAME.into(), config_file_name.into());
    metadata.insert(keys::LOG_LEVEL.into(), log_level.verbosity().to_string());
    metadata.insert(keys::CONFIG_FILE_CONTENT.into(), config_file_content.into());
    metadata.insert(keys::SERVERS.into(), servers.into());
    Notification::new(events::SERVER_STARTED, Some(metadata_to_params(&metadata)))
}

#[must_use]
pub fn server_stopped_notification(config_file_name: &str) -> Notification {
    let mut metadata = Metadata::new();
    metadata.insert(keys::CONFIG_FILE_NAME.into(), config_file_name.into());
    Notification::new(events::SERVER_STOPPED, Some(metadata_to_params(&metadata)))
}

#[must_use]
pub fn log_message_notification(entry: &LogEntry) -> Notification {
    let mut metadata = Metadata::new();
    metadata.insert(keys::MESSAGE.into(), entry.message.clone());
    metadata.insert(keys::LOG_LEVEL.into(), entry.level.as_str().into());
    metadata.insert(keys::ORIGIN.into(), entry.origin.as_str().into());
    Notification::new(events::LOG_MESSAGE, Some(metadata_to_params(&metadata)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_types::LogOrigin;
    use serde_json::json;

    #[test]
    fn test_command_name_is_case_insensitive() {
        assert_eq!(
            CommandName::parse("startserver"),
            Some(CommandName::StartServer)
        );
        assert_eq!(
            CommandName::parse("LOGSUBSCRIBE"),
            Some(CommandName::LogSubscribe)
        );
        assert_eq!(
            CommandName::parse("GetConfigFiles"),
            Some(CommandName::GetConfigFiles)
        );
    }

    #[test]
    fn test_command_name_requires_exact_match() {
        assert_eq!(CommandName::parse("StartServers"), None);
        assert_eq!(CommandName::parse(" StartServer"), None);
        assert_eq!(CommandName::parse(""), None);
    }

    #[test]
    fn test_response_serializes_flat() {
        let response = CommandResponse::success()
            .with(keys::CONFIG_FILE_NAME, "setup.xml")
            .with(keys::SERVERS, "OutputA:18944");
        assert_eq!(
            response.to_value(),
            json!({
                "Successful": true,
                "ConfigFileName": "setup.xml",
                "Servers": "OutputA:18944"
            })
        );
    }

    #[test]
    fn test_failure_response_carries_message() {
        let response = CommandResponse::failure("Config file not specified.");
        assert_eq!(
            response.to_value(),
            json!({"Successful": false, "ErrorMessage": "Config file not specified."})
        );
    }

    #[test]
    fn test_response_deserializes_metadata() {
        let response: CommandResponse = serde_json::from_value(json!({
            "Successful": true,
            "ConfigFiles": "a.xml;b.xml",
            "Separator": ";"
        }))
        .unwrap();
        assert!(response.successful);
        assert_eq!(response.error_message, None);
        assert_eq!(response.list(keys::CONFIG_FILES), vec!["a.xml", "b.xml"]);
        assert_eq!(response.get(keys::SEPARATOR), Some(";"));
    }

    #[test]
    fn test_into_result() {
        assert!(CommandResponse::success().into_result("StopServer").is_ok());

        let err = CommandResponse::failure("Write permission denied.")
            .into_result("AddConfigFile")
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { ref command, .. } if command == "AddConfigFile"));
        assert!(err.to_string().contains("Write permission denied."));
    }

    #[test]
    fn test_split_list_skips_empty_items() {
        assert_eq!(split_list("a:1;;b:2;"), vec!["a:1", "b:2"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_metadata_from_params_stringifies_scalars() {
        let params = json!({
            "ConfigFileName": "setup.xml",
            "LogLevel": 4,
            "Force": true,
            "Nested": {"x": 1}
        });
        let metadata = metadata_from_params(Some(&params));
        assert_eq!(metadata.get("ConfigFileName").unwrap(), "setup.xml");
        assert_eq!(metadata.get("LogLevel").unwrap(), "4");
        assert_eq!(metadata.get("Force").unwrap(), "true");
        assert!(!metadata.contains_key("Nested"));
    }

    #[test]
    fn test_metadata_from_non_object_params_is_empty() {
        assert!(metadata_from_params(None).is_empty());
        assert!(metadata_from_params(Some(&json!([1, 2]))).is_empty());
        assert!(metadata_from_params(Some(&Value::Null)).is_empty());
    }

    #[test]
    fn test_server_started_notification() {
        let n = server_started_notification(
            "setup.xml",
            LogLevel::Debug,
            "<PlusConfiguration/>",
            "OutputA:18944",
        );
        assert_eq!(n.method, "ServerStarted");
        let params = n.params.unwrap();
        assert_eq!(params["ConfigFileName"], "setup.xml");
        assert_eq!(params["LogLevel"], "4");
        assert_eq!(params["ConfigFileContent"], "<PlusConfiguration/>");
        assert_eq!(params["Servers"], "OutputA:18944");
    }

    #[test]
    fn test_server_stopped_notification_only_has_name() {
        let n = server_stopped_notification("setup.xml");
        assert_eq!(n.method, "ServerStopped");
        assert_eq!(n.params.unwrap(), json!({"ConfigFileName": "setup.xml"}));
    }

    #[test]
    fn test_log_message_notification() {
        let entry = LogEntry::new(LogLevel::Warning, LogOrigin::Server, "low battery");
        let n = log_message_notification(&entry);
        assert_eq!(n.method, "LogMessage");
        assert_eq!(
            n.params.unwrap(),
            json!({"Message": "low battery", "LogLevel": "WARNING", "Origin": "SERVER"})
        );
    }
}
