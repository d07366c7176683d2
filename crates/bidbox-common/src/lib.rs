//! Bidbox Common Types
//!
//! This crate provides the shared vocabulary of the bidbox auction server:
//!
//! - **[`status`]**: the status taxonomy used for error reporting across
//!   every component, together with its canonical numeric encoding.
//! - **[`fledge`]**: the FLEDGE auction data model (interest groups, auction
//!   configuration, bidding and scoring function inputs/outputs).
//! - **[`protocol`]**: JSON-RPC 2.0 types and the typed request/response
//!   shapes of the two RPC methods.
//! - **[`transport`]**: HTTP helpers shared by the server and the client.
//!
//! Signals values crossing the JavaScript boundary are plain
//! `serde_json::Value`s; everything on the wire is camelCase JSON.

pub mod fledge;
pub mod protocol;
pub mod status;
pub mod transport;

pub use fledge::{
    Ad, AdScoringFunctionInput, AdScoringFunctionOutput, AuctionConfiguration,
    BiddingFunctionInput, BiddingFunctionOutput, InterestGroup, InterestGroupAuctionState,
    ScoredBid,
};
pub use status::{Status, StatusKind};
