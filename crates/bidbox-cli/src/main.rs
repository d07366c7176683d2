//! # Bidbox CLI Entry Point
//!
//! The `bidbox` binary hosts three modes:
//!
//! ```bash
//! # Serve auctions from a YAML function configuration
//! bidbox serve -b 0.0.0.0:50051 -c functions.yaml
//!
//! # Same, with each script isolated in its own sandboxed worker process
//! bidbox serve -b 0.0.0.0:50051 -c functions.yaml --use-sandbox
//!
//! # One-shot RPC call, raw JSON on stdout for scripting
//! bidbox call http://127.0.0.1:50051 ComputeBid \
//!     --params '{"biddingFunctionName":"local://double","input":{"perBuyerSignals":{"foo":21}}}'
//! ```
//!
//! The third mode, `sandbox-worker`, is not meant to be invoked by hand: it
//! is the entry the server re-executes itself with to host one sandboxed
//! function, speaking frames over stdio.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use argh::FromArgs;

use bidbox_server::periodic::default_factory;
use bidbox_server::repository::{EngineSettings, ExecutionMode};
use bidbox_server::{AuctionService, HttpScriptSource, HttpServer, RefreshSchedule};

/// bidbox, a server-side FLEDGE auction engine
#[derive(FromArgs)]
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
    SandboxWorker(SandboxWorkerArgs),
}

/// start the auction server
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
struct ServeArgs {
    /// address to bind the JSON-RPC server to
    #[argh(option, short = 'b', long = "bind-address", default = "\"0.0.0.0:50051\".into()")]
    bind_address: String,

    /// path to the YAML file listing bidding and ad scoring functions
    #[argh(option, short = 'c', long = "configuration-file")]
    configuration_file: String,

    /// run each compiled function in its own sandboxed worker process
    #[argh(switch, long = "use-sandbox")]
    use_sandbox: bool,

    /// seconds between repository refreshes, measured from the end of one
    /// rebuild to the start of the next
    #[argh(option, long = "function-refresh-interval-secs", default = "60")]
    function_refresh_interval_secs: u64,

    /// milliseconds to wait for an async bidding function to resolve
    #[argh(option, long = "bidding-function-async-wait-ms", default = "50")]
    bidding_function_async_wait_ms: u64,
}

/// call an RPC method on a running server (raw JSON output)
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
struct CallArgs {
    /// server endpoint, e.g. http://127.0.0.1:50051
    #[argh(positional)]
    endpoint: String,

    /// method name: ComputeBid or RunAdAuction
    #[argh(positional)]
    method: String,

    /// JSON request parameters
    #[argh(option, short = 'p', long = "params", default = "\"{}\".into()")]
    params: String,
}

/// internal: host one sandboxed function over stdio
#[derive(FromArgs)]
#[argh(subcommand, name = "sandbox-worker")]
struct SandboxWorkerArgs {}

fn main() -> Result<()> {
    let cli: Cli = argh::from_env();
    match cli.command {
        Commands::Serve(args) => serve(args),
        Commands::Call(args) => call(args),
        // No subscriber and no stdout logging here: stdout carries frames.
        Commands::SandboxWorker(_) => {
            std::process::exit(bidbox_engine::sandbox::worker::run())
        }
    }
}

fn serve(args: ServeArgs) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let bind_address: SocketAddr = args
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address '{}'", args.bind_address))?;

    let mode = if args.use_sandbox {
        tracing::info!("sandboxed execution enabled");
        ExecutionMode::Sandboxed {
            worker: bidbox_engine::sandbox::WorkerCommand::current_exe(vec![
                "sandbox-worker".into()
            ])?,
            limits: Default::default(),
        }
    } else {
        ExecutionMode::InProcess
    };
    let engine = EngineSettings {
        mode,
        async_wait: Duration::from_millis(args.bidding_function_async_wait_ms),
    };
    let refresh_interval = Duration::from_secs(args.function_refresh_interval_secs);
    let schedule =
        RefreshSchedule { first_delay: refresh_interval, interval: refresh_interval };

    // Construction fetches remote scripts with blocking I/O, so it happens
    // before the async runtime starts.
    tracing::info!(configuration = %args.configuration_file, "loading function configuration");
    let source = Arc::new(HttpScriptSource::new()?);
    let factory = default_factory();
    let service = AuctionService::from_config_file(
        &args.configuration_file,
        source,
        engine,
        schedule,
        &factory,
    )?;
    tracing::info!("function repository ready");

    let runtime = tokio::runtime::Runtime::new().context("failed to start the runtime")?;
    runtime.block_on(HttpServer::new(Arc::new(service)).run(bind_address))?;
    Ok(())
}

fn call(args: CallArgs) -> Result<()> {
    // Logging stays off so stdout remains pipeable.
    let params: serde_json::Value =
        serde_json::from_str(&args.params).context("params must be valid JSON")?;
    let client = bidbox_client::AuctionClient::new(args.endpoint);

    let runtime = tokio::runtime::Runtime::new().context("failed to start the runtime")?;
    let result = runtime.block_on(async move {
        match args.method.as_str() {
            "ComputeBid" => {
                let request = serde_json::from_value(params)
                    .map_err(|e| anyhow::anyhow!("invalid ComputeBid params: {e}"))?;
                let output = client.compute_bid(&request).await?;
                Ok::<_, anyhow::Error>(serde_json::to_value(output)?)
            }
            "RunAdAuction" => {
                let request = serde_json::from_value(params)
                    .map_err(|e| anyhow::anyhow!("invalid RunAdAuction params: {e}"))?;
                let response = client.run_ad_auction(&request).await?;
                Ok(serde_json::to_value(response)?)
            }
            other => anyhow::bail!("unknown method '{other}'; expected ComputeBid or RunAdAuction"),
        }
    })?;
    println!("{result}");
    Ok(())
}
