//! The auction driver: ComputeBid and RunAdAuction against the current
//! repository snapshot.
//!
//! Each request clones the published snapshot reference once at entry and
//! performs every lookup against that clone, so a refresh landing mid-flight
//! is invisible to it. Only the refresher writes; the snapshot slot is a
//! read-mostly lock held just long enough to clone or replace the `Arc`.
//!
//! Failure semantics during an auction: a candidate whose bidder is
//! missing, unavailable or failing is dropped silently (a routine
//! availability matter on the buyer side), while a missing or failing
//! scorer fails the whole request (the seller's decision logic is a
//! per-request configuration requirement).

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bidbox_common::fledge::{
    AdScoringFunctionInput, AdScoringFunctionOutput, BiddingFunctionInput, BiddingFunctionOutput,
    InterestGroup, InterestGroupAuctionState, ScoredBid,
};
use bidbox_common::protocol::{ComputeBidRequest, RunAdAuctionRequest, RunAdAuctionResponse};
use bidbox_common::status::{Result, Status};
use bidbox_engine::CompiledFunction;

use crate::config::Configuration;
use crate::periodic::{PeriodicCallback, PeriodicHandle, PeriodicTaskFactory};
use crate::repository::{build_repository, EngineSettings, FunctionRepository};
use crate::source::ScriptSource;

/// Refresher timing: first rebuild after `first_delay`, then every
/// `interval` measured from the end of one rebuild.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshSchedule {
    pub first_delay: Duration,
    pub interval: Duration,
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self { first_delay: Duration::from_secs(60), interval: Duration::from_secs(60) }
    }
}

/// The published snapshot slot shared between requests and the refresher.
struct SnapshotSlot {
    repository: RwLock<Arc<FunctionRepository>>,
}

impl SnapshotSlot {
    fn snapshot(&self) -> Result<Arc<FunctionRepository>> {
        self.repository
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| Status::internal("Function repository lock is poisoned."))
    }

    fn publish(&self, repository: Arc<FunctionRepository>) {
        if let Ok(mut guard) = self.repository.write() {
            *guard = repository;
        }
    }
}

/// The auction service: owns the snapshot slot and the refresher handle.
pub struct AuctionService {
    slot: Arc<SnapshotSlot>,
    // Held for its Drop: stops the refresh timer with the service.
    _refresh: Box<dyn PeriodicHandle>,
}

impl AuctionService {
    /// Builds the initial repository from `configuration` and schedules
    /// periodic rebuilds through `factory`.
    ///
    /// # Errors
    ///
    /// Fails when the initial build fails wholesale (duplicate URIs, a
    /// failing fetch). Individual scripts that do not compile degrade to
    /// unavailable entries and do not block startup.
    pub fn create(
        configuration: Configuration,
        source: Arc<dyn ScriptSource>,
        engine: EngineSettings,
        schedule: RefreshSchedule,
        factory: &PeriodicTaskFactory,
    ) -> Result<Self> {
        let initial = build_repository(&configuration, source.as_ref(), &engine)?;
        let slot = Arc::new(SnapshotSlot { repository: RwLock::new(Arc::new(initial)) });

        let refresh_slot = Arc::clone(&slot);
        let callback: PeriodicCallback = Arc::new(move || {
            refresh_repository(&refresh_slot, &configuration, source.as_ref(), &engine);
        });
        let refresh = factory(callback, schedule.first_delay, schedule.interval);

        Ok(Self { slot, _refresh: refresh })
    }

    /// Convenience constructor reading the configuration from a YAML file.
    pub fn from_config_file(
        path: impl AsRef<std::path::Path>,
        source: Arc<dyn ScriptSource>,
        engine: EngineSettings,
        schedule: RefreshSchedule,
        factory: &PeriodicTaskFactory,
    ) -> Result<Self> {
        let configuration = Configuration::from_file(path)?;
        Self::create(configuration, source, engine, schedule, factory)
    }

    /// Evaluates one bidding function against one input.
    pub fn compute_bid(&self, request: &ComputeBidRequest) -> Result<BiddingFunctionOutput> {
        let snapshot = self.slot.snapshot()?;
        run_bidding_function(&snapshot, &request.bidding_function_name, &request.input)
    }

    /// Runs a sealed-bid auction over the request's interest groups.
    pub fn run_ad_auction(&self, request: &RunAdAuctionRequest) -> Result<RunAdAuctionResponse> {
        // One snapshot for the whole request.
        let snapshot = self.slot.snapshot()?;
        let configuration = &request.auction_configuration;
        let allowed_buyers: HashSet<&str> =
            configuration.interest_group_buyers.iter().map(String::as_str).collect();

        let mut scored_bids: Vec<ScoredBid> = Vec::new();
        for interest_group in &request.interest_groups {
            if !allowed_buyers.contains(interest_group.owner.as_str()) {
                // Disallowed owners are dropped without a trace; clients may
                // pre-filter, double-checking costs nothing.
                continue;
            }
            let input = build_bidding_input(interest_group, configuration);
            let bid = match run_bidding_function(
                &snapshot,
                &interest_group.bidding_logic_url,
                &input,
            ) {
                Ok(bid) => bid,
                Err(status) => {
                    tracing::debug!(
                        owner = %interest_group.owner,
                        name = %interest_group.name,
                        error = %status,
                        "candidate skipped: bidding function did not produce a bid"
                    );
                    continue;
                }
            };

            let scoring_input = build_scoring_input(&bid, interest_group, request);
            let scored_ad = run_ad_scoring_function(
                &snapshot,
                &configuration.decision_logic_url,
                &scoring_input,
            )?;

            scored_bids.push(ScoredBid {
                owner: interest_group.owner.clone(),
                name: interest_group.name.clone(),
                render_url: bid.render_url.clone(),
                bid_price: bid.bid,
                desirability_score: scored_ad.desirability_score,
            });
        }

        // Stable sort: candidates with equal scores keep insertion order.
        scored_bids.sort_by(|a, b| {
            b.desirability_score
                .partial_cmp(&a.desirability_score)
                .unwrap_or(Ordering::Equal)
        });

        let mut response = RunAdAuctionResponse::default();
        if scored_bids.first().is_some_and(|top| top.desirability_score > 0.0) {
            response.winning_bid = Some(scored_bids.remove(0));
        }
        response.losing_bids = scored_bids;
        Ok(response)
    }
}

/// Invokes one bidding function with one input and unwraps the single
/// output. One input in, exactly one output back out.
fn run_bidding_function(
    snapshot: &FunctionRepository,
    uri: &str,
    input: &BiddingFunctionInput,
) -> Result<BiddingFunctionOutput> {
    let function = snapshot.bidding_function(uri)?;
    let outputs = function.batch_invoke(std::slice::from_ref(input))?;
    single_output(outputs)
}

fn run_ad_scoring_function(
    snapshot: &FunctionRepository,
    uri: &str,
    input: &AdScoringFunctionInput,
) -> Result<AdScoringFunctionOutput> {
    let function = snapshot.ad_scoring_function(uri)?;
    let outputs = function.batch_invoke(std::slice::from_ref(input))?;
    single_output(outputs)
}

fn single_output<T>(mut outputs: Vec<T>) -> Result<T> {
    match (outputs.len(), outputs.pop()) {
        (1, Some(output)) => Ok(output),
        (count, _) => Err(Status::internal(format!(
            "Expected exactly one function output for one input, got {count}"
        ))),
    }
}

/// Projects a candidate and the auction configuration into the five FLEDGE
/// bidding arguments. Per-buyer signals without an entry for this owner are
/// omitted entirely.
fn build_bidding_input(
    interest_group: &InterestGroupAuctionState,
    configuration: &bidbox_common::fledge::AuctionConfiguration,
) -> BiddingFunctionInput {
    BiddingFunctionInput {
        interest_group: Some(InterestGroup {
            name: interest_group.name.clone(),
            owner: interest_group.owner.clone(),
            bidding_logic_url: interest_group.bidding_logic_url.clone(),
            ads: interest_group.ads.clone(),
            user_bidding_signals: interest_group.user_bidding_signals.clone(),
        }),
        auction_signals: configuration.auction_signals.clone(),
        per_buyer_signals: configuration.per_buyer_signals.get(&interest_group.owner).cloned(),
        trusted_bidding_signals: interest_group.trusted_bidding_signals.clone(),
        browser_signals: interest_group.browser_signals.clone(),
    }
}

/// Assembles the scoring input for one produced bid. Trusted scoring
/// signals are selected by the bid's render URL; the candidate's browser
/// signals ride along.
fn build_scoring_input(
    bid: &BiddingFunctionOutput,
    interest_group: &InterestGroupAuctionState,
    request: &RunAdAuctionRequest,
) -> AdScoringFunctionInput {
    AdScoringFunctionInput {
        ad_metadata: bid.ad.clone(),
        bid: bid.bid,
        auction_config: Some(request.auction_configuration.clone()),
        trusted_scoring_signals: request.trusted_scoring_signals.get(&bid.render_url).cloned(),
        browser_signals: interest_group.browser_signals.clone(),
    }
}

/// One refresher tick: rebuild and swap, or keep the previous snapshot on
/// failure.
fn refresh_repository(
    slot: &SnapshotSlot,
    configuration: &Configuration,
    source: &dyn ScriptSource,
    engine: &EngineSettings,
) {
    match build_repository(configuration, source, engine) {
        Ok(repository) => {
            slot.publish(Arc::new(repository));
            tracing::info!("function repository refreshed");
        }
        Err(status) => {
            tracing::warn!(error = %status, "function repository refresh failed; retaining the previous snapshot");
        }
    }
}
