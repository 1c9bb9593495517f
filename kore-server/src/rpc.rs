//! JSON-RPC 2.0 envelope and method-name constants. Grounded on the
//! teacher's `a2a/rpc.rs`: same request/response/error shape, new Kore
//! method table in place of the A2A task-lifecycle methods.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const METHOD_CREATE_SESSION: &str = "session/create";
pub const METHOD_GET_SESSION: &str = "session/get";
pub const METHOD_LIST_SESSIONS: &str = "session/list";
pub const METHOD_CLOSE_SESSION: &str = "session/close";
pub const METHOD_SEND_MESSAGE: &str = "session/sendMessage";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(result: Value, id: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), result: Some(result), error: None, id }
    }

    pub fn error(error: JsonRpcError, id: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), result: None, error: Some(error), id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const NOT_FOUND: i32 = -32001;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(Self::METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAMS, message.into())
    }

    pub fn from_kore_error(err: &kore_commons::error::KoreError) -> Self {
        use kore_commons::error::KoreError;
        let code = match err {
            KoreError::NotFound { .. } => Self::NOT_FOUND,
            KoreError::Validation(_) => Self::INVALID_PARAMS,
            _ => Self::INTERNAL_ERROR,
        };
        Self::new(code, err.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandOutputType {
    Stdout,
    Stderr,
    Exit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    #[serde(rename = "type")]
    pub kind: CommandOutputType,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_round_trips_success_and_error() {
        let success = JsonRpcResponse::success(json!({"ok": true}), json!(1));
        assert!(success.error.is_none());
        let failure = JsonRpcResponse::error(JsonRpcError::method_not_found("bogus"), json!(1));
        assert_eq!(failure.error.unwrap().code, JsonRpcError::METHOD_NOT_FOUND);
    }

    #[test]
    fn command_output_type_serializes_uppercase() {
        let output = CommandOutput { kind: CommandOutputType::Exit, data: String::new(), exit_code: Some(0) };
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"EXIT\""));
    }
}
