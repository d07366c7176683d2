//! Bidbox RPC Protocol
//!
//! The auction server speaks JSON-RPC 2.0 over HTTP with two unary methods:
//!
//! - `ComputeBid`: evaluate one bidding function against one input.
//! - `RunAdAuction`: run a sealed-bid auction over a set of interest groups.
//!
//! Application errors are encoded as JSON-RPC server errors whose code is
//! `-32000 - <canonical status code>` and whose `data.status` carries the
//! status name, so a client can reconstruct the original [`Status`] exactly.
//!
//! [`Status`]: crate::status::Status

pub mod jsonrpc;
pub mod requests;
pub mod responses;

pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use requests::{ComputeBidRequest, RunAdAuctionRequest};
pub use responses::RunAdAuctionResponse;

/// JSON-RPC method name for single-function evaluation.
pub const COMPUTE_BID_METHOD: &str = "ComputeBid";
/// JSON-RPC method name for full auctions.
pub const RUN_AD_AUCTION_METHOD: &str = "RunAdAuction";
