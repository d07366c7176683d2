//! HTTP / JSON-RPC Conversion Utilities
//!
//! Small helpers for moving JSON-RPC messages in and out of hyper bodies.
//! JSON-RPC errors always travel with HTTP status 200; the HTTP layer only
//! reports its own failures (unreadable body, oversized payload) through
//! protocol-level error objects.

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::{header, Request, Response, StatusCode};

use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::status::{Result, Status};

/// Maximum request payload size (10 MB). Bodies above this limit are
/// rejected before being parsed.
pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Type alias for hyper incoming requests.
pub type HyperRequest = Request<Incoming>;

/// Type alias for hyper responses with a buffered body.
pub type HyperResponse = Response<Full<Bytes>>;

/// HTTP transport utility functions.
pub struct HttpTransport;

impl HttpTransport {
    /// Parses a JSON-RPC request from a request body.
    ///
    /// # Errors
    ///
    /// Returns invalid-argument when the body exceeds [`MAX_PAYLOAD_SIZE`]
    /// or is not a valid JSON-RPC request object.
    pub fn parse_jsonrpc(body: &Bytes) -> Result<JsonRpcRequest> {
        if body.len() > MAX_PAYLOAD_SIZE {
            return Err(Status::invalid_argument(format!(
                "Request body of {} bytes exceeds the {} byte limit",
                body.len(),
                MAX_PAYLOAD_SIZE
            )));
        }
        serde_json::from_slice(body)
            .map_err(|e| Status::invalid_argument(format!("Unparseable JSON-RPC request: {e}")))
    }

    /// Converts a JSON-RPC response into an HTTP response.
    pub fn to_http_response(jsonrpc: &JsonRpcResponse) -> HyperResponse {
        let body = serde_json::to_vec(jsonrpc).unwrap_or_default();
        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = StatusCode::OK;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        response
    }

    /// Shorthand for an error response.
    pub fn to_http_error(
        id: serde_json::Value,
        error: crate::protocol::JsonRpcError,
    ) -> HyperResponse {
        Self::to_http_response(&JsonRpcResponse::error(id, error))
    }
}
