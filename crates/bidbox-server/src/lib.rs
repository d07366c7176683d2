//! Bidbox Auction Server
//!
//! This crate orchestrates FLEDGE auctions against a repository of compiled
//! bidding and scoring functions.
//!
//! # Architecture
//!
//! At startup the configured scripts are fetched ([`source`]), compiled
//! through the engine and published as an immutable repository snapshot
//! ([`repository`]). A background refresher ([`periodic`]) rebuilds the
//! snapshot on an interval and swaps it in atomically; requests capture one
//! snapshot at entry and never observe a partial rebuild. The auction
//! driver ([`auction`]) implements the two RPC operations, and the HTTP
//! shell ([`http_server`], [`http_router`]) exposes them as JSON-RPC.
//!
//! # Partial failure
//!
//! Scripts that fail to compile degrade to unavailable repository entries
//! instead of taking the server down; a refresh that fails outright leaves
//! the previous snapshot serving. During an auction, a broken bidder only
//! costs its own candidate, while a broken scorer fails the request.

pub mod auction;
pub mod config;
pub mod http_router;
pub mod http_server;
pub mod periodic;
pub mod repository;
pub mod source;

pub use auction::{AuctionService, RefreshSchedule};
pub use config::{Configuration, FunctionSpec};
pub use http_server::HttpServer;
pub use repository::{EngineSettings, ExecutionMode, FunctionRepository};
pub use source::{HttpScriptSource, ScriptSource};
