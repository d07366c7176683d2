//! The function repository: an immutable snapshot of compiled scripts.
//!
//! A snapshot maps every configured URI to either a compiled function or an
//! unavailable marker, in two role-separated namespaces. Entries are
//! tri-state on lookup: unknown URIs are not-found, configured-but-broken
//! URIs are unavailable, and healthy URIs yield a shared handle. Snapshots
//! never change after publication; readers hold them by `Arc` and a
//! compiled function is dropped with the last snapshot that references it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use bidbox_common::status::{Result, Status};
use bidbox_engine::function::{FunctionOptions, FunctionRole};
use bidbox_engine::sandbox::{SandboxLimits, SandboxedFunction, WorkerCommand};
use bidbox_engine::{FledgeAdScoringFunction, FledgeBiddingFunction, ScriptFunction};

use crate::config::{Configuration, FunctionSpec};
use crate::source::ScriptSource;

/// Where compiled functions execute.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionMode {
    /// Scripts run inside the server process.
    InProcess,
    /// Each script runs in its own sandboxed worker process.
    Sandboxed { worker: WorkerCommand, limits: SandboxLimits },
}

/// How the repository turns source text into compiled functions.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub mode: ExecutionMode,
    /// How long an invocation waits for a returned promise to settle.
    pub async_wait: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { mode: ExecutionMode::InProcess, async_wait: Duration::from_millis(50) }
    }
}

impl EngineSettings {
    /// Repository functions always take flattened arguments, per the FLEDGE
    /// positional calling convention.
    fn options(&self) -> FunctionOptions {
        FunctionOptions { flatten_arguments: true, async_wait: self.async_wait }
    }

    fn create_bidding_function(&self, source: &str) -> Result<Arc<FledgeBiddingFunction>> {
        let options = self.options();
        match &self.mode {
            ExecutionMode::InProcess => {
                Ok(Arc::new(ScriptFunction::create(source, FunctionRole::Bidder, options)?))
            }
            ExecutionMode::Sandboxed { worker, limits } => Ok(Arc::new(SandboxedFunction::create(
                worker,
                source,
                FunctionRole::Bidder,
                &options,
                *limits,
            )?)),
        }
    }

    fn create_ad_scoring_function(&self, source: &str) -> Result<Arc<FledgeAdScoringFunction>> {
        let options = self.options();
        match &self.mode {
            ExecutionMode::InProcess => {
                Ok(Arc::new(ScriptFunction::create(source, FunctionRole::Scorer, options)?))
            }
            ExecutionMode::Sandboxed { worker, limits } => Ok(Arc::new(SandboxedFunction::create(
                worker,
                source,
                FunctionRole::Scorer,
                &options,
                *limits,
            )?)),
        }
    }
}

/// A configured entry: compiled, or present only as a marker because its
/// last compilation failed.
enum FunctionEntry<F: ?Sized> {
    Present(Arc<F>),
    Unavailable,
}

/// Immutable snapshot of every configured function.
pub struct FunctionRepository {
    bidding_functions: HashMap<String, FunctionEntry<FledgeBiddingFunction>>,
    ad_scoring_functions: HashMap<String, FunctionEntry<FledgeAdScoringFunction>>,
}

impl FunctionRepository {
    /// Looks up a bidding function by URI.
    pub fn bidding_function(&self, uri: &str) -> Result<Arc<FledgeBiddingFunction>> {
        match self.bidding_functions.get(uri) {
            None => Err(Status::not_found(format!("Bidding function {uri} not found"))),
            Some(FunctionEntry::Unavailable) => {
                Err(Status::unavailable(format!("Bidding function {uri} is not available")))
            }
            Some(FunctionEntry::Present(function)) => Ok(Arc::clone(function)),
        }
    }

    /// Looks up an ad scoring function by URI.
    pub fn ad_scoring_function(&self, uri: &str) -> Result<Arc<FledgeAdScoringFunction>> {
        match self.ad_scoring_functions.get(uri) {
            None => Err(Status::not_found(format!("Ad scoring function {uri} not found"))),
            Some(FunctionEntry::Unavailable) => {
                Err(Status::unavailable(format!("Ad scoring function {uri} is not available")))
            }
            Some(FunctionEntry::Present(function)) => Ok(Arc::clone(function)),
        }
    }
}

/// Runs the full construction pipeline: fetch every configured source, then
/// compile each one.
///
/// Configuration-level problems (a duplicate URI, a failing fetch) fail the
/// whole build; the caller decides whether that kills startup or merely
/// retains the previous snapshot. A script that fetches but does not
/// compile degrades to an unavailable entry so the rest of the corpus keeps
/// serving.
pub fn build_repository(
    configuration: &Configuration,
    source: &dyn ScriptSource,
    engine: &EngineSettings,
) -> Result<FunctionRepository> {
    let bidding_sources = collect_sources(&configuration.bidding_functions, source)?;
    let ad_scoring_sources = collect_sources(&configuration.ad_scoring_functions, source)?;

    let mut bidding_functions = HashMap::with_capacity(bidding_sources.len());
    for (uri, text) in &bidding_sources {
        let entry = match engine.create_bidding_function(text) {
            Ok(function) => FunctionEntry::Present(function),
            Err(status) => {
                tracing::warn!(uri = %uri, error = %status, "bidding function marked unavailable");
                FunctionEntry::Unavailable
            }
        };
        bidding_functions.insert(uri.clone(), entry);
    }

    let mut ad_scoring_functions = HashMap::with_capacity(ad_scoring_sources.len());
    for (uri, text) in &ad_scoring_sources {
        let entry = match engine.create_ad_scoring_function(text) {
            Ok(function) => FunctionEntry::Present(function),
            Err(status) => {
                tracing::warn!(uri = %uri, error = %status, "ad scoring function marked unavailable");
                FunctionEntry::Unavailable
            }
        };
        ad_scoring_functions.insert(uri.clone(), entry);
    }

    Ok(FunctionRepository { bidding_functions, ad_scoring_functions })
}

/// Fetches every spec, enforcing URI uniqueness within the list.
fn collect_sources(
    specs: &[FunctionSpec],
    source: &dyn ScriptSource,
) -> Result<BTreeMap<String, String>> {
    let mut bodies = BTreeMap::new();
    for spec in specs {
        let body = source.fetch(spec)?;
        if bodies.insert(spec.uri.clone(), body).is_some() {
            return Err(Status::invalid_argument(format!(
                "Function '{}' defined more than once in the configuration file.",
                spec.uri
            )));
        }
    }
    Ok(bodies)
}
