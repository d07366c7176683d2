//! HTTP JSON-RPC client for the two auction methods.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use bidbox_common::fledge::BiddingFunctionOutput;
use bidbox_common::protocol::{
    ComputeBidRequest, JsonRpcRequest, JsonRpcResponse, RunAdAuctionRequest, RunAdAuctionResponse,
    COMPUTE_BID_METHOD, RUN_AD_AUCTION_METHOD,
};
use bidbox_common::status::{Result, Status};

/// Client for one auction server endpoint.
///
/// Transport failures surface as internal statuses; application errors are
/// decoded back into the status the server raised.
pub struct AuctionClient {
    http: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl AuctionClient {
    /// Creates a client for `endpoint`, e.g. `http://127.0.0.1:50051`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), endpoint: endpoint.into(), next_id: AtomicU64::new(1) }
    }

    /// Evaluates one bidding function against one input.
    pub async fn compute_bid(&self, request: &ComputeBidRequest) -> Result<BiddingFunctionOutput> {
        self.call(COMPUTE_BID_METHOD, request).await
    }

    /// Runs a full auction.
    pub async fn run_ad_auction(
        &self,
        request: &RunAdAuctionRequest,
    ) -> Result<RunAdAuctionResponse> {
        self.call(RUN_AD_AUCTION_METHOD, request).await
    }

    async fn call<P: Serialize, T: DeserializeOwned>(&self, method: &str, params: &P) -> Result<T> {
        let params = serde_json::to_value(params)
            .map_err(|e| Status::internal(format!("Unable to encode the request: {e}")))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(method, params, json!(id));

        tracing::debug!(method, id, "sending request");
        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Status::internal(format!("Transport failure: {e}")))?;
        let response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| Status::internal(format!("Unparseable response: {e}")))?;

        if let Some(error) = response.error {
            return Err(error
                .to_status()
                .unwrap_or_else(|| Status::internal(error.message.clone())));
        }
        let result = response
            .result
            .ok_or_else(|| Status::internal("Response carried neither result nor error."))?;
        serde_json::from_value(result)
            .map_err(|e| Status::internal(format!("Unexpected response shape: {e}")))
    }
}
