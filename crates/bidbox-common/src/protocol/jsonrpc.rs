//! JSON-RPC 2.0 Protocol Types
//!
//! Standard JSON-RPC 2.0 request, response and error objects, plus the
//! encoding of the bidbox status taxonomy into the server-error code range.
//!
//! # Error Codes
//!
//! Standard codes:
//! - `-32700`: Parse error
//! - `-32600`: Invalid request
//! - `-32601`: Method not found
//! - `-32602`: Invalid params
//! - `-32603`: Internal error
//!
//! Application statuses occupy the server-error range as `-32000 - code`
//! (e.g. NOT_FOUND, canonical code 5, becomes `-32005`). The status name is
//! duplicated in `data.status` so the mapping is self-describing.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::status::{Status, StatusKind};

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Name of the method to invoke.
    pub method: String,
    /// Parameter values.
    pub params: Value,
    /// Request identifier (number, string, or null).
    pub id: Value,
}

impl JsonRpcRequest {
    /// Builds a well-formed request for the given method.
    pub fn new(method: impl Into<String>, params: Value, id: Value) -> Self {
        Self { jsonrpc: "2.0".into(), method: method.into(), params, id }
    }
}

/// JSON-RPC 2.0 response. Exactly one of `result` and `error` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

/// Invalid JSON was received by the server.
pub const PARSE_ERROR: i32 = -32700;
/// The JSON sent is not a valid Request object.
pub const INVALID_REQUEST: i32 = -32600;
/// The method does not exist.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameter(s).
pub const INVALID_PARAMS: i32 = -32602;
/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i32 = -32603;
/// Request entity too large.
pub const REQUEST_TOO_LARGE: i32 = -32001;

/// Base of the application status encoding: `code = STATUS_BASE - canonical`.
const STATUS_BASE: i32 = -32000;

impl JsonRpcError {
    pub fn parse_error() -> Self {
        Self { code: PARSE_ERROR, message: "Parse error".into(), data: None }
    }

    pub fn invalid_request() -> Self {
        Self { code: INVALID_REQUEST, message: "Invalid Request".into(), data: None }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }

    pub fn invalid_params(msg: &str) -> Self {
        Self { code: INVALID_PARAMS, message: msg.into(), data: None }
    }

    pub fn internal_error(msg: &str) -> Self {
        Self { code: INTERNAL_ERROR, message: msg.into(), data: None }
    }

    pub fn request_too_large(limit: usize) -> Self {
        Self {
            code: REQUEST_TOO_LARGE,
            message: format!("Request body too large (max {} bytes)", limit),
            data: None,
        }
    }

    /// Encodes an application status into the server-error range.
    pub fn from_status(status: &Status) -> Self {
        Self {
            code: STATUS_BASE - status.kind().canonical_code(),
            message: status.message().to_string(),
            data: Some(json!({ "status": status.kind().as_str_name() })),
        }
    }

    /// Recovers the application status from an error produced by
    /// [`JsonRpcError::from_status`]. Prefers `data.status`; falls back to
    /// decoding the numeric code. Returns `None` for plain protocol errors.
    pub fn to_status(&self) -> Option<Status> {
        let kind = self
            .data
            .as_ref()
            .and_then(|data| data.get("status"))
            .and_then(Value::as_str)
            .and_then(StatusKind::from_str_name)
            .or_else(|| StatusKind::from_canonical_code(STATUS_BASE - self.code))?;
        Some(Status::new(kind, self.message.clone()))
    }
}

impl JsonRpcResponse {
    /// Creates a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0".into(), result: Some(result), error: None, id }
    }

    /// Creates an error response.
    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self { jsonrpc: "2.0".into(), result: None, error: Some(error), id }
    }
}
