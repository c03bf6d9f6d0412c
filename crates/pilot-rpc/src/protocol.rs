//! JSON-RPC 2.0 envelope types.
//!
//! Remote commands travel as requests (method = command name, params =
//! metadata object). Lifecycle and log events travel as notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// JSON-RPC 2.0 Request ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

/// JSON-RPC 2.0 Request. Without an `id` it is a fire-and-forget command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl Request {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: Some(id),
        }
    }

    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: None,
        }
    }

    /// A blocking command expects exactly one correlated response.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.id.is_some()
    }
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: RequestId,
}

impl Response {
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    #[must_use]
    pub fn error(id: RequestId, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// JSON-RPC 2.0 Notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 Error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn unknown_command(name: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Unknown command: {name}"))
    }

    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// Incoming message that could be a request, response, or notification.
///
/// Untagged, so a request without `id` always decodes as `Request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

impl Message {
    /// Parse a JSON string into a `Message`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or doesn't match any message type.
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Method name for requests and notifications.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request(r) => Some(&r.method),
            Message::Notification(n) => Some(&n.method),
            Message::Response(_) => None,
        }
    }

    #[must_use]
    pub fn is_request(&self) -> bool {
        matches!(self, Message::Request(r) if r.id.is_some())
    }

    #[must_use]
    pub fn is_notification(&self) -> bool {
        matches!(self, Message::Request(r) if r.id.is_none())
            || matches!(self, Message::Notification(_))
    }

    #[must_use]
    pub fn is_response(&self) -> bool {
        matches!(self, Message::Response(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_request_serialization() {
        let req = Request::new(
            "StartServer",
            Some(serde_json::json!({"ConfigFileName": "setup.xml"})),
            1.into(),
        );
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"StartServer\""));
        assert!(json.contains("\"ConfigFileName\":\"setup.xml\""));
        assert!(json.contains("\"id\":1"));
    }

    #[test]
    fn test_request_without_params_omits_field() {
        let req = Request::new("GetConfigFiles", None, 1.into());
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("\"params\""));
    }

    #[test]
    fn test_blocking_flag_follows_id() {
        assert!(Request::new("LogSubscribe", None, 3.into()).is_blocking());
        assert!(!Request::notification("LogSubscribe", None).is_blocking());
    }

    #[test]
    fn test_notification_has_no_id() {
        let notif = Notification::new("ServerStopped", Some(serde_json::json!({})));
        let json = serde_json::to_string(&notif).unwrap();
        assert!(json.contains("\"method\":\"ServerStopped\""));
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn test_response_success_and_error_are_exclusive() {
        let ok = serde_json::to_string(&Response::success(
            1.into(),
            serde_json::json!({"Successful": true}),
        ))
        .unwrap();
        assert!(ok.contains("\"result\""));
        assert!(!ok.contains("\"error\""));

        let err = serde_json::to_string(&Response::error(
            1.into(),
            RpcError::unknown_command("Reboot"),
        ))
        .unwrap();
        assert!(!err.contains("\"result\""));
        assert!(err.contains("-32601"));
        assert!(err.contains("Reboot"));
    }

    #[test]
    fn test_request_id_serialization() {
        assert_eq!(serde_json::to_string(&RequestId::Number(7)).unwrap(), "7");
        assert_eq!(
            serde_json::to_string(&RequestId::from("abc")).unwrap(),
            "\"abc\""
        );
        let id: RequestId = serde_json::from_str("456").unwrap();
        assert_eq!(id, RequestId::Number(456));
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(RpcError::unknown_command("Reboot").code, METHOD_NOT_FOUND);
        assert_eq!(RpcError::invalid_params("bad").code, INVALID_PARAMS);
        assert_eq!(
            RpcError::new(INTERNAL_ERROR, "boom").to_string(),
            "RPC error -32603: boom"
        );
    }

    #[test]
    fn test_message_parse_kinds() {
        let msg = Message::parse(
            r#"{"jsonrpc":"2.0","method":"StopServer","params":{"ConfigFileName":"a.xml"},"id":4}"#,
        )
        .unwrap();
        assert!(msg.is_request());
        assert_eq!(msg.method(), Some("StopServer"));

        let msg = Message::parse(r#"{"jsonrpc":"2.0","method":"LogSubscribe"}"#).unwrap();
        assert!(msg.is_notification());
        assert!(!msg.is_request());

        let msg = Message::parse(r#"{"jsonrpc":"2.0","result":{"Successful":true},"id":4}"#)
            .unwrap();
        assert!(msg.is_response());
        assert_eq!(msg.method(), None);
    }
}
