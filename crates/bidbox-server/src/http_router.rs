//! JSON-RPC method dispatch for the auction service.
//!
//! Two methods are routed by name; anything else is a method-not-found.
//! Script execution is CPU-bound and synchronous, so each call runs under
//! `spawn_blocking` to keep connection tasks responsive.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use bidbox_common::protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, COMPUTE_BID_METHOD, RUN_AD_AUCTION_METHOD,
};
use bidbox_common::status::{Result, Status};

use crate::auction::AuctionService;

/// Routes JSON-RPC requests to the auction service.
pub struct RpcRouter {
    service: Arc<AuctionService>,
}

impl RpcRouter {
    pub fn new(service: Arc<AuctionService>) -> Self {
        Self { service }
    }

    /// Handles one request, always producing a response with its id.
    pub async fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        match request.method.as_str() {
            COMPUTE_BID_METHOD => {
                self.dispatch(id, request.params, |service, params| service.compute_bid(&params))
                    .await
            }
            RUN_AD_AUCTION_METHOD => {
                self.dispatch(id, request.params, |service, params| {
                    service.run_ad_auction(&params)
                })
                .await
            }
            other => JsonRpcResponse::error(id, JsonRpcError::method_not_found(other)),
        }
    }

    /// Parses params, runs the operation on the blocking pool and encodes
    /// the outcome.
    async fn dispatch<P, T, F>(&self, id: Value, params: Value, operation: F) -> JsonRpcResponse
    where
        P: DeserializeOwned + Send + 'static,
        T: Serialize + Send + 'static,
        F: FnOnce(&AuctionService, P) -> Result<T> + Send + 'static,
    {
        let parsed: P = match serde_json::from_value(params) {
            Ok(parsed) => parsed,
            Err(e) => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params(&format!("Unparseable request parameters: {e}")),
                );
            }
        };

        let service = Arc::clone(&self.service);
        let outcome = tokio::task::spawn_blocking(move || operation(&service, parsed))
            .await
            .unwrap_or_else(|e| {
                Err(Status::internal(format!("Request execution was aborted: {e}")))
            });

        match outcome.and_then(encode_result) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(status) => {
                tracing::debug!(error = %status, "request failed");
                JsonRpcResponse::error(id, JsonRpcError::from_status(&status))
            }
        }
    }
}

fn encode_result<T: Serialize>(result: T) -> Result<Value> {
    serde_json::to_value(result)
        .map_err(|e| Status::internal(format!("Unable to encode the response: {e}")))
}
