//! Typed request shapes for the two RPC methods.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fledge::{AuctionConfiguration, BiddingFunctionInput, InterestGroupAuctionState};

/// Request for `ComputeBid`: evaluate one configured bidding function
/// against one input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComputeBidRequest {
    /// URI of the bidding function to invoke, as configured.
    pub bidding_function_name: String,
    /// The five FLEDGE arguments for the invocation.
    pub input: BiddingFunctionInput,
}

/// Request for `RunAdAuction`: a sealed-bid auction over the given interest
/// groups, scored by the seller's decision logic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunAdAuctionRequest {
    pub interest_groups: Vec<InterestGroupAuctionState>,
    pub auction_configuration: AuctionConfiguration,
    /// Seller-provided signals keyed by render URL, forwarded to the scoring
    /// function for the matching creative.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub trusted_scoring_signals: BTreeMap<String, Value>,
}
