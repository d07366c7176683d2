//! Engine bindings for the FLEDGE input and output shapes.
//!
//! Each input type spells out its flattened calling convention once, in
//! field declaration order. Message-typed fields that are unset flatten to
//! empty objects so positional arguments never shift.

use serde_json::{json, Value};

use bidbox_common::fledge::{
    AdScoringFunctionInput, AdScoringFunctionOutput, BiddingFunctionInput, BiddingFunctionOutput,
};
use bidbox_common::status::{Result, Status};

use crate::function::{CompiledFunction, FlatArg, FunctionInput, FunctionOutput};

/// A compiled buyer-side bidding function.
pub type FledgeBiddingFunction = dyn CompiledFunction<BiddingFunctionInput, BiddingFunctionOutput>;

/// A compiled seller-side ad scoring function.
pub type FledgeAdScoringFunction =
    dyn CompiledFunction<AdScoringFunctionInput, AdScoringFunctionOutput>;

fn message<T: serde::Serialize>(field: &Option<T>) -> Result<Value> {
    match field {
        Some(value) => serde_json::to_value(value)
            .map_err(|e| Status::internal(format!("Unable to convert a bidding function input: {e}"))),
        None => Ok(json!({})),
    }
}

impl FunctionInput for BiddingFunctionInput {
    fn flat_args(&self) -> Result<Vec<FlatArg>> {
        Ok(vec![
            FlatArg::Message(message(&self.interest_group)?),
            FlatArg::Message(message(&self.auction_signals)?),
            FlatArg::Message(message(&self.per_buyer_signals)?),
            FlatArg::Map(self.trusted_bidding_signals.clone()),
            FlatArg::Message(message(&self.browser_signals)?),
        ])
    }
}

impl FunctionInput for AdScoringFunctionInput {
    fn flat_args(&self) -> Result<Vec<FlatArg>> {
        Ok(vec![
            FlatArg::Message(message(&self.ad_metadata)?),
            FlatArg::Number(self.bid),
            FlatArg::Message(message(&self.auction_config)?),
            FlatArg::Message(message(&self.trusted_scoring_signals)?),
            FlatArg::Message(message(&self.browser_signals)?),
        ])
    }
}

impl FunctionOutput for BiddingFunctionOutput {}
impl FunctionOutput for AdScoringFunctionOutput {}
