//! Bidbox Client
//!
//! Async JSON-RPC client for the auction server. Application errors arrive
//! as JSON-RPC server errors carrying an encoded status; the client decodes
//! them back into [`bidbox_common::status::Status`] values, so callers see
//! the same status kinds the server produced.

pub mod client;

pub use client::AuctionClient;
