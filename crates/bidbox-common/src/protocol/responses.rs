//! Typed response shapes for the two RPC methods.
//!
//! `ComputeBid` answers with a bare
//! [`BiddingFunctionOutput`](crate::fledge::BiddingFunctionOutput);
//! `RunAdAuction` answers with [`RunAdAuctionResponse`].

use serde::{Deserialize, Serialize};

use crate::fledge::ScoredBid;

/// Outcome of an auction: at most one winner and the remaining ranked bids.
///
/// `losing_bids` is ordered by descending desirability score. When no bid
/// scored strictly above zero there is no winner and every scored candidate
/// appears among the losers. An auction with no eligible candidates succeeds
/// with both fields empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunAdAuctionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_bid: Option<ScoredBid>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub losing_bids: Vec<ScoredBid>,
}
