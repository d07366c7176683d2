//! End-to-end tests of the auction service against in-memory script
//! sources and a manually driven refresher.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use bidbox_common::fledge::{Ad, AuctionConfiguration, InterestGroupAuctionState};
use bidbox_common::protocol::{ComputeBidRequest, RunAdAuctionRequest};
use bidbox_common::status::{Result, Status, StatusKind};
use bidbox_server::periodic::testing::ManualPeriodicTasks;
use bidbox_server::repository::EngineSettings;
use bidbox_server::{AuctionService, Configuration, FunctionSpec, RefreshSchedule, ScriptSource};

const DOUBLING_BIDDER: &str = r#"
(interestGroup, auctionSignals, perBuyerSignals, trustedBiddingSignals, browserSignals) => ({
    bid: perBuyerSignals.foo * 2,
    renderUrl: interestGroup.ads[0].renderUrl,
    ad: interestGroup.ads[0].adMetadata })"#;

const TRIPLING_BIDDER: &str = r#"
(interestGroup, auctionSignals, perBuyerSignals, trustedBiddingSignals, browserSignals) => ({
    bid: perBuyerSignals.foo * 3,
    renderUrl: interestGroup.ads[0].renderUrl,
    ad: interestGroup.ads[0].adMetadata })"#;

const ENGAGEMENT_BIDDER: &str = r#"
(interestGroup, auctionSignals, perBuyerSignals, trustedBiddingSignals, browserSignals) => ({
    bid: perBuyerSignals.foo * interestGroup.userBiddingSignals.engagement,
    renderUrl: interestGroup.ads[0].renderUrl,
    ad: interestGroup.ads[0].adMetadata })"#;

const FAILING_BIDDER: &str = r#"
(interestGroup, auctionSignals, perBuyerSignals, trustedBiddingSignals, browserSignals) => ({
    bid: 1000 + perBuyerSignals.foo.bar.baz,
    renderUrl: interestGroup.ads[0].renderUrl })"#;

const PREFER_FUNNY_SCORER: &str = r#"
(adMetadata, bid, auctionConfig, trustedScoringSignals, browserSignals) =>
    ({ desirabilityScore: adMetadata && adMetadata.funny ? bid * 2 : bid })"#;

const PREFER_FUNNY_LESS_SCORER: &str = r#"
(adMetadata, bid, auctionConfig, trustedScoringSignals, browserSignals) =>
    ({ desirabilityScore: adMetadata && adMetadata.funny ? bid * 1.5 : bid })"#;

const REJECT_EVERYTHING_SCORER: &str = r#"
(adMetadata, bid, auctionConfig, trustedScoringSignals, browserSignals) =>
    ({ desirabilityScore: 0 })"#;

const FAILING_SCORER: &str = r#"
(adMetadata, bid, auctionConfig, trustedScoringSignals, browserSignals) =>
    ({ desirabilityScore: adMetadata.funny.bar.baz * 5 })"#;

/// In-memory stand-in for remote script servers, shared with the service
/// so tests can change a body and trigger a refresh.
#[derive(Clone, Default)]
struct TestScriptSource {
    store: Arc<Mutex<HashMap<String, String>>>,
}

impl TestScriptSource {
    fn new() -> Self {
        Self::default()
    }

    fn add_remote(&self, uri: &str, body: &str) -> &Self {
        self.store.lock().unwrap().insert(uri.to_string(), body.to_string());
        self
    }
}

impl ScriptSource for TestScriptSource {
    fn fetch(&self, spec: &FunctionSpec) -> Result<String> {
        if let Some(body) = &spec.source {
            return Ok(body.clone());
        }
        self.store
            .lock()
            .unwrap()
            .get(&spec.uri)
            .cloned()
            .ok_or_else(|| Status::not_found("Resource not found"))
    }
}

struct Fixture {
    service: AuctionService,
    source: TestScriptSource,
    refresher: ManualPeriodicTasks,
}

impl Fixture {
    fn create(configuration: Configuration, source: TestScriptSource) -> Result<Self> {
        let refresher = ManualPeriodicTasks::new();
        let factory = refresher.factory();
        let service = AuctionService::create(
            configuration,
            Arc::new(source.clone()),
            EngineSettings::default(),
            RefreshSchedule::default(),
            &factory,
        )?;
        Ok(Self { service, source, refresher })
    }

    /// The standard corpus used by the auction scenarios.
    fn standard() -> Self {
        let source = TestScriptSource::new();
        source
            .add_remote("https://adnetwork.example/bidding/double.js", DOUBLING_BIDDER)
            .add_remote("https://adnetwork.example/bidding/triple.js", TRIPLING_BIDDER)
            .add_remote("https://dsp.example/bidding/multiply.js", ENGAGEMENT_BIDDER)
            .add_remote("https://dsp.example/bidding/failing.js", FAILING_BIDDER)
            .add_remote("https://ssp.example/auction/preferFunnyAds.js", PREFER_FUNNY_SCORER)
            .add_remote("https://ssp.example/auction/rejectEverything.js", REJECT_EVERYTHING_SCORER)
            .add_remote("https://ssp.example/auction/failing.js", FAILING_SCORER);
        let configuration = Configuration {
            bidding_functions: vec![
                FunctionSpec::remote("https://adnetwork.example/bidding/double.js"),
                FunctionSpec::remote("https://adnetwork.example/bidding/triple.js"),
                FunctionSpec::remote("https://dsp.example/bidding/multiply.js"),
                FunctionSpec::remote("https://dsp.example/bidding/failing.js"),
            ],
            ad_scoring_functions: vec![
                FunctionSpec::remote("https://ssp.example/auction/preferFunnyAds.js"),
                FunctionSpec::remote("https://ssp.example/auction/rejectEverything.js"),
                FunctionSpec::remote("https://ssp.example/auction/failing.js"),
            ],
        };
        Self::create(configuration, source).unwrap()
    }
}

fn compute_bid_request(name: &str, per_buyer_signals: Value) -> ComputeBidRequest {
    let mut request = ComputeBidRequest {
        bidding_function_name: name.into(),
        ..Default::default()
    };
    request.input.per_buyer_signals = Some(per_buyer_signals);
    request
}

fn funnytoons() -> InterestGroupAuctionState {
    InterestGroupAuctionState {
        owner: "adnetwork.example".into(),
        name: "funnytoons".into(),
        bidding_logic_url: "https://adnetwork.example/bidding/double.js".into(),
        ads: vec![Ad {
            render_url: "https://adnetwork.example/funny".into(),
            ad_metadata: Some(json!({"funny": true})),
        }],
        ..Default::default()
    }
}

fn ufoconspiracies() -> InterestGroupAuctionState {
    InterestGroupAuctionState {
        owner: "dsp.example".into(),
        name: "ufoconspiracies".into(),
        bidding_logic_url: "https://dsp.example/bidding/multiply.js".into(),
        ads: vec![Ad {
            render_url: "https://dsp.example/ufoconspiracies".into(),
            ad_metadata: None,
        }],
        user_bidding_signals: Some(json!({"engagement": 3.5})),
        ..Default::default()
    }
}

fn standard_auction_configuration(decision_logic_url: &str) -> AuctionConfiguration {
    AuctionConfiguration {
        decision_logic_url: decision_logic_url.into(),
        interest_group_buyers: vec!["dsp.example".into(), "adnetwork.example".into()],
        per_buyer_signals: BTreeMap::from([
            ("adnetwork.example".to_string(), json!({"foo": 21})),
            ("dsp.example".to_string(), json!({"foo": 20})),
        ]),
        ..Default::default()
    }
}

fn standard_auction_request(decision_logic_url: &str) -> RunAdAuctionRequest {
    RunAdAuctionRequest {
        interest_groups: vec![funnytoons(), ufoconspiracies()],
        auction_configuration: standard_auction_configuration(decision_logic_url),
        ..Default::default()
    }
}

#[test]
fn compute_bid_doubles_the_signal() {
    let fixture = Fixture::create(
        Configuration {
            bidding_functions: vec![
                FunctionSpec::local("local://double", DOUBLING_BIDDER),
                FunctionSpec::local("local://triple", TRIPLING_BIDDER),
            ],
            ad_scoring_functions: vec![],
        },
        TestScriptSource::new(),
    )
    .unwrap();

    // An input without ads makes the renderUrl lookup throw, so give the
    // bidder one ad to project.
    let mut request = compute_bid_request("local://double", json!({"foo": 21}));
    request.input.interest_group = Some(bidbox_common::fledge::InterestGroup {
        ads: vec![Ad { render_url: "https://cdn.example/ad".into(), ad_metadata: None }],
        ..Default::default()
    });
    let output = fixture.service.compute_bid(&request).unwrap();
    assert_eq!(output.bid, 42.0);

    // Dispatch: the same input through the other function.
    request.bidding_function_name = "local://triple".into();
    let output = fixture.service.compute_bid(&request).unwrap();
    assert_eq!(output.bid, 63.0);
}

#[test]
fn compute_bid_unknown_function_is_not_found() {
    let fixture = Fixture::create(
        Configuration {
            bidding_functions: vec![FunctionSpec::local("local://one", DOUBLING_BIDDER)],
            ad_scoring_functions: vec![],
        },
        TestScriptSource::new(),
    )
    .unwrap();
    let error = fixture
        .service
        .compute_bid(&compute_bid_request("local://two", json!({"foo": 21})))
        .unwrap_err();
    assert_eq!(error.kind(), StatusKind::NotFound);
}

#[test]
fn compute_bid_broken_function_is_unavailable() {
    let fixture = Fixture::create(
        Configuration {
            bidding_functions: vec![FunctionSpec::local(
                "local://broken",
                "input => input.perBuyerSignals.",
            )],
            ad_scoring_functions: vec![],
        },
        TestScriptSource::new(),
    )
    .unwrap();
    let error = fixture
        .service
        .compute_bid(&compute_bid_request("local://broken", json!({"foo": 21})))
        .unwrap_err();
    assert_eq!(error.kind(), StatusKind::Unavailable);
}

#[test]
fn compute_bid_invocation_error_is_internal() {
    let fixture = Fixture::create(
        Configuration {
            bidding_functions: vec![FunctionSpec::local("local://failing", FAILING_BIDDER)],
            ad_scoring_functions: vec![],
        },
        TestScriptSource::new(),
    )
    .unwrap();
    // perBuyerSignals.foo is a number, so .bar.baz throws inside the script.
    let error = fixture
        .service
        .compute_bid(&compute_bid_request("local://failing", json!({"foo": 21})))
        .unwrap_err();
    assert_eq!(error.kind(), StatusKind::Internal);
}

#[test]
fn duplicate_configuration_entries_fail_startup() {
    let error = Fixture::create(
        Configuration {
            bidding_functions: vec![
                FunctionSpec::local("local://double", DOUBLING_BIDDER),
                FunctionSpec::local("local://double", TRIPLING_BIDDER),
            ],
            ad_scoring_functions: vec![],
        },
        TestScriptSource::new(),
    )
    .map(|_| ())
    .unwrap_err();
    assert_eq!(error.kind(), StatusKind::InvalidArgument);
    assert!(error.message().contains("defined more than once"));
}

#[test]
fn funny_ads_win_the_auction() {
    let fixture = Fixture::standard();
    let response = fixture
        .service
        .run_ad_auction(&standard_auction_request("https://ssp.example/auction/preferFunnyAds.js"))
        .unwrap();

    let winner = response.winning_bid.expect("expected a winner");
    assert_eq!(winner.owner, "adnetwork.example");
    assert_eq!(winner.name, "funnytoons");
    assert_eq!(winner.render_url, "https://adnetwork.example/funny");
    assert_eq!(winner.bid_price, 42.0);
    assert_eq!(winner.desirability_score, 84.0);

    assert_eq!(response.losing_bids.len(), 1);
    let loser = &response.losing_bids[0];
    assert_eq!(loser.name, "ufoconspiracies");
    assert_eq!(loser.bid_price, 70.0);
    assert_eq!(loser.desirability_score, 70.0);
}

#[test]
fn refresh_swaps_the_scorer() {
    let fixture = Fixture::standard();
    let request = standard_auction_request("https://ssp.example/auction/preferFunnyAds.js");

    let before = fixture.service.run_ad_auction(&request).unwrap();
    assert_eq!(before.winning_bid.as_ref().unwrap().desirability_score, 84.0);

    // The remote body changes, but the running snapshot must not.
    fixture
        .source
        .add_remote("https://ssp.example/auction/preferFunnyAds.js", PREFER_FUNNY_LESS_SCORER);
    let unchanged = fixture.service.run_ad_auction(&request).unwrap();
    assert_eq!(unchanged.winning_bid.as_ref().unwrap().desirability_score, 84.0);

    fixture.refresher.run_all_now();
    let after = fixture.service.run_ad_auction(&request).unwrap();
    let winner = after.winning_bid.expect("expected a winner");
    assert_eq!(winner.name, "ufoconspiracies");
    assert_eq!(winner.desirability_score, 70.0);
    assert_eq!(after.losing_bids.len(), 1);
    assert_eq!(after.losing_bids[0].name, "funnytoons");
    assert_eq!(after.losing_bids[0].desirability_score, 63.0);
}

#[test]
fn refresh_without_change_is_a_no_op() {
    let fixture = Fixture::standard();
    let request = standard_auction_request("https://ssp.example/auction/preferFunnyAds.js");
    let before = fixture.service.run_ad_auction(&request).unwrap();

    // Two rebuilds over identical source bytes must not change responses.
    fixture.refresher.run_all_now();
    fixture.refresher.run_all_now();
    let after = fixture.service.run_ad_auction(&request).unwrap();
    assert_eq!(after, before);
}

#[test]
fn failed_refresh_retains_the_previous_snapshot() {
    let fixture = Fixture::standard();
    let request = standard_auction_request("https://ssp.example/auction/preferFunnyAds.js");
    assert!(fixture.service.run_ad_auction(&request).unwrap().winning_bid.is_some());

    // Remove one remote body: the rebuild's fetch fails wholesale.
    fixture.source.store.lock().unwrap().remove("https://dsp.example/bidding/multiply.js");
    fixture.refresher.run_all_now();

    let response = fixture.service.run_ad_auction(&request).unwrap();
    assert!(response.winning_bid.is_some(), "previous snapshot should keep serving");
}

#[test]
fn failing_bidder_is_skipped_silently() {
    let fixture = Fixture::standard();
    let mut request =
        standard_auction_request("https://ssp.example/auction/preferFunnyAds.js");
    // Candidate A throws inside its bidder; candidate B stays healthy.
    request.interest_groups[0].bidding_logic_url = "https://dsp.example/bidding/failing.js".into();

    let response = fixture.service.run_ad_auction(&request).unwrap();
    let winner = response.winning_bid.expect("expected a winner");
    assert_eq!(winner.name, "ufoconspiracies");
    assert_eq!(winner.bid_price, 70.0);
    assert_eq!(winner.desirability_score, 70.0);
    assert!(response.losing_bids.is_empty());
}

#[test]
fn missing_bidder_is_skipped_silently() {
    let fixture = Fixture::standard();
    let mut request =
        standard_auction_request("https://ssp.example/auction/preferFunnyAds.js");
    request.interest_groups[0].bidding_logic_url =
        "https://adnetwork.example/bidding/quadruple.js".into();

    let response = fixture.service.run_ad_auction(&request).unwrap();
    assert_eq!(response.winning_bid.expect("expected a winner").name, "ufoconspiracies");
    assert!(response.losing_bids.is_empty());
}

#[test]
fn disallowed_owner_is_dropped_entirely() {
    let fixture = Fixture::standard();
    let mut request =
        standard_auction_request("https://ssp.example/auction/preferFunnyAds.js");
    request.auction_configuration.interest_group_buyers = vec!["dsp.example".into()];

    let response = fixture.service.run_ad_auction(&request).unwrap();
    assert_eq!(response.winning_bid.expect("expected a winner").name, "ufoconspiracies");
    // funnytoons must appear nowhere, not even among the losers.
    assert!(response.losing_bids.is_empty());
}

#[test]
fn missing_scorer_fails_the_auction() {
    let fixture = Fixture::standard();
    let request = standard_auction_request("https://ssp.example/auction/unknownScorer.js");
    let error = fixture.service.run_ad_auction(&request).unwrap_err();
    assert_eq!(error.kind(), StatusKind::NotFound);
}

#[test]
fn failing_scorer_fails_the_auction() {
    let fixture = Fixture::standard();
    let request = standard_auction_request("https://ssp.example/auction/failing.js");
    let error = fixture.service.run_ad_auction(&request).unwrap_err();
    assert_eq!(error.kind(), StatusKind::Internal);
}

#[test]
fn all_candidates_scored_zero_means_no_winner() {
    let fixture = Fixture::standard();
    let request =
        standard_auction_request("https://ssp.example/auction/rejectEverything.js");
    let response = fixture.service.run_ad_auction(&request).unwrap();
    assert!(response.winning_bid.is_none());
    assert_eq!(response.losing_bids.len(), 2);
    for loser in &response.losing_bids {
        assert_eq!(loser.desirability_score, 0.0);
    }
    let names: Vec<&str> =
        response.losing_bids.iter().map(|bid| bid.name.as_str()).collect();
    assert!(names.contains(&"funnytoons"));
    assert!(names.contains(&"ufoconspiracies"));
}

#[test]
fn auction_without_eligible_candidates_is_empty_and_ok() {
    let fixture = Fixture::standard();
    let mut request =
        standard_auction_request("https://ssp.example/auction/preferFunnyAds.js");
    request.auction_configuration.interest_group_buyers = vec!["nobody.example".into()];
    let response = fixture.service.run_ad_auction(&request).unwrap();
    assert!(response.winning_bid.is_none());
    assert!(response.losing_bids.is_empty());
}

#[test]
fn trusted_scoring_signals_reach_the_scorer() {
    let fixture = Fixture::standard();
    fixture.source.add_remote(
        "https://ssp.example/auction/filterByTrustedSignals.js",
        r#"(adMetadata, bid, auctionConfig, trustedScoringSignals, browserSignals) =>
            ({ desirabilityScore: trustedScoringSignals.categories.includes("jokes") ? 0 : bid })"#,
    );
    let configuration = Configuration {
        bidding_functions: vec![
            FunctionSpec::remote("https://adnetwork.example/bidding/double.js"),
            FunctionSpec::remote("https://dsp.example/bidding/multiply.js"),
        ],
        ad_scoring_functions: vec![FunctionSpec::remote(
            "https://ssp.example/auction/filterByTrustedSignals.js",
        )],
    };
    let fixture = Fixture::create(configuration, fixture.source.clone()).unwrap();

    let mut request =
        standard_auction_request("https://ssp.example/auction/filterByTrustedSignals.js");
    request.trusted_scoring_signals = BTreeMap::from([
        (
            "https://adnetwork.example/funny".to_string(),
            json!({"categories": ["jokes"]}),
        ),
        (
            "https://dsp.example/ufoconspiracies".to_string(),
            json!({"categories": ["sci-fi"]}),
        ),
    ]);

    let response = fixture.service.run_ad_auction(&request).unwrap();
    let winner = response.winning_bid.expect("expected a winner");
    assert_eq!(winner.name, "ufoconspiracies");
    assert_eq!(winner.desirability_score, 70.0);
    assert_eq!(response.losing_bids.len(), 1);
    assert_eq!(response.losing_bids[0].name, "funnytoons");
    assert_eq!(response.losing_bids[0].desirability_score, 0.0);
}

#[test]
fn trusted_bidding_signals_reach_the_bidder() {
    let source = TestScriptSource::new();
    source
        .add_remote(
            "https://dsp.example/bidding/ctr.js",
            r#"(interestGroup, auctionSignals, perBuyerSignals, trustedBiddingSignals, browserSignals) => ({
                bid: perBuyerSignals.foo * trustedBiddingSignals.ctr,
                renderUrl: interestGroup.ads[0].renderUrl })"#,
        )
        .add_remote(
            "https://ssp.example/auction/standardScoring.js",
            r#"(adMetadata, bid, auctionConfig, trustedScoringSignals, browserSignals) =>
                ({ desirabilityScore: bid })"#,
        );
    let fixture = Fixture::create(
        Configuration {
            bidding_functions: vec![FunctionSpec::remote("https://dsp.example/bidding/ctr.js")],
            ad_scoring_functions: vec![FunctionSpec::remote(
                "https://ssp.example/auction/standardScoring.js",
            )],
        },
        source,
    )
    .unwrap();

    let mut candidate = ufoconspiracies();
    candidate.bidding_logic_url = "https://dsp.example/bidding/ctr.js".into();
    candidate.trusted_bidding_signals = BTreeMap::from([("ctr".to_string(), json!(3.5))]);
    let request = RunAdAuctionRequest {
        interest_groups: vec![candidate],
        auction_configuration: standard_auction_configuration(
            "https://ssp.example/auction/standardScoring.js",
        ),
        ..Default::default()
    };

    let response = fixture.service.run_ad_auction(&request).unwrap();
    assert_eq!(response.winning_bid.expect("expected a winner").bid_price, 70.0);
}

#[test]
fn equal_scores_preserve_insertion_order() {
    let source = TestScriptSource::new();
    source
        .add_remote("https://dsp.example/bidding/multiply.js", ENGAGEMENT_BIDDER)
        .add_remote(
            "https://ssp.example/auction/constant.js",
            r#"(adMetadata, bid, auctionConfig, trustedScoringSignals, browserSignals) =>
                ({ desirabilityScore: 5 })"#,
        );
    let fixture = Fixture::create(
        Configuration {
            bidding_functions: vec![FunctionSpec::remote(
                "https://dsp.example/bidding/multiply.js",
            )],
            ad_scoring_functions: vec![FunctionSpec::remote(
                "https://ssp.example/auction/constant.js",
            )],
        },
        source,
    )
    .unwrap();

    let mut first = ufoconspiracies();
    first.name = "first".into();
    let mut second = ufoconspiracies();
    second.name = "second".into();
    let mut third = ufoconspiracies();
    third.name = "third".into();

    let request = RunAdAuctionRequest {
        interest_groups: vec![first, second, third],
        auction_configuration: standard_auction_configuration(
            "https://ssp.example/auction/constant.js",
        ),
        ..Default::default()
    };
    let response = fixture.service.run_ad_auction(&request).unwrap();
    assert_eq!(response.winning_bid.expect("expected a winner").name, "first");
    let order: Vec<&str> = response.losing_bids.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(order, vec!["second", "third"]);
}
