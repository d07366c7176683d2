//! HTTP shell: JSON-RPC over HTTP/1.1.
//!
//! The server accepts POSTed JSON-RPC requests, forwards them to the
//! [`RpcRouter`] and returns the JSON-RPC response with HTTP status 200.
//! Each connection runs in its own tokio task. Transport-level problems
//! (wrong HTTP method, unreadable body, oversized payload) are reported as
//! protocol error objects, not as application statuses.

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;

use bidbox_common::protocol::JsonRpcError;
use bidbox_common::status::{Result, Status};
use bidbox_common::transport::{HttpTransport, HyperRequest, HyperResponse, MAX_PAYLOAD_SIZE};

use crate::auction::AuctionService;
use crate::http_router::RpcRouter;

/// HTTP server for the auction service.
pub struct HttpServer {
    router: Arc<RpcRouter>,
}

impl HttpServer {
    pub fn new(service: Arc<AuctionService>) -> Self {
        Self { router: Arc::new(RpcRouter::new(service)) }
    }

    /// Binds `addr` and serves until the task is dropped.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Status::internal(format!("Failed to bind to {addr}: {e}")))?;
        if let Ok(local) = listener.local_addr() {
            tracing::info!(address = %local, "auction server listening");
        }
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener. Tests bind their
    /// own listener to learn the ephemeral port first.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|e| Status::internal(format!("Failed to accept a connection: {e}")))?;
            let io = TokioIo::new(stream);
            let router = Arc::clone(&self.router);

            tokio::task::spawn(async move {
                let service = service_fn(move |request| {
                    let router = Arc::clone(&router);
                    async move { Ok::<_, std::convert::Infallible>(handle(router, request).await) }
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::debug!(error = %e, "connection ended with an error");
                }
            });
        }
    }
}

async fn handle(router: Arc<RpcRouter>, request: HyperRequest) -> HyperResponse {
    if request.method() != hyper::Method::POST {
        return HttpTransport::to_http_error(json!(null), JsonRpcError::invalid_request());
    }

    let body = match request.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::debug!(error = %e, "failed to read a request body");
            return HttpTransport::to_http_error(
                json!(null),
                JsonRpcError::internal_error("Failed to read the request body"),
            );
        }
    };

    if body.len() > MAX_PAYLOAD_SIZE {
        return HttpTransport::to_http_error(
            json!(null),
            JsonRpcError::request_too_large(MAX_PAYLOAD_SIZE),
        );
    }

    let rpc_request = match HttpTransport::parse_jsonrpc(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable JSON-RPC request");
            return HttpTransport::to_http_error(json!(null), JsonRpcError::parse_error());
        }
    };

    let response = router.handle(rpc_request).await;
    HttpTransport::to_http_response(&response)
}
