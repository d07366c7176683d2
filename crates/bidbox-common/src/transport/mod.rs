//! HTTP transport helpers shared by the server and the client.

pub mod http;

pub use http::{HttpTransport, HyperRequest, HyperResponse, MAX_PAYLOAD_SIZE};
