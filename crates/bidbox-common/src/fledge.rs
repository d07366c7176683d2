//! FLEDGE Auction Data Model
//!
//! Types mirroring the on-device FLEDGE auction contract, used both on the
//! wire (camelCase JSON) and as inputs/outputs of the sandboxed JavaScript
//! functions. Absent message-typed fields are omitted during serialization,
//! matching the convention that unset fields do not appear in JSON; all
//! fields are defaulted during deserialization so partial objects parse.
//!
//! Output types are strict: unknown keys in a script's return value are a
//! shape mismatch, reported by the engine as a failed precondition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single ad within an interest group. The render URL is the canonical
/// identity of the creative and the key into trusted scoring signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ad {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub render_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_metadata: Option<Value>,
}

/// Interest group projection passed to a bidding function as its first
/// argument. Trusted bidding signals and browser signals are not part of the
/// projection; they travel as separate top-level input fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InterestGroup {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub owner: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub bidding_logic_url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ads: Vec<Ad>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_bidding_signals: Option<Value>,
}

/// Per-candidate auction state as submitted in a `RunAdAuction` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InterestGroupAuctionState {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub owner: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub bidding_logic_url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ads: Vec<Ad>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_bidding_signals: Option<Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub trusted_bidding_signals: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_signals: Option<Value>,
}

/// Seller-side auction parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuctionConfiguration {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub seller: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub decision_logic_url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interest_group_buyers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_signals: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_signals: Option<Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub per_buyer_signals: BTreeMap<String, Value>,
}

/// The five FLEDGE arguments of a bidding function (`generateBid`), in
/// declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BiddingFunctionInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_group: Option<InterestGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_signals: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_buyer_signals: Option<Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub trusted_bidding_signals: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_signals: Option<Value>,
}

/// Return value of a bidding function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct BiddingFunctionOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad: Option<Value>,
    pub bid: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub render_url: String,
}

/// The arguments of an ad scoring function (`scoreAd`), in declaration
/// order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdScoringFunctionInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_metadata: Option<Value>,
    pub bid: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_config: Option<AuctionConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_scoring_signals: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_signals: Option<Value>,
}

/// Return value of an ad scoring function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct AdScoringFunctionOutput {
    pub desirability_score: f64,
}

/// One ranked auction participant: the bid it produced and the score the
/// seller assigned to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoredBid {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub owner: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub render_url: String,
    pub bid_price: f64,
    pub desirability_score: f64,
}
