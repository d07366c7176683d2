//! The sandbox worker: a single-function request loop over stdio.
//!
//! The worker hosts exactly one compiled function for its whole lifetime and
//! moves through two states: empty, then ready once `Compile` succeeds.
//! `Compile` is legal only while empty (a second attempt is a failed
//! precondition) and `BatchExecute` only once ready. Compilation and
//! execution themselves are transient phases of handling one request; the
//! host enforces their wall-clock limits from outside by killing the
//! process, so nothing here needs a timer.

use std::io::{Read, Write};
use std::time::Duration;

use serde::de::DeserializeOwned;

use bidbox_common::fledge::{
    AdScoringFunctionInput, AdScoringFunctionOutput, BiddingFunctionInput, BiddingFunctionOutput,
};
use bidbox_common::status::{Result, Status};

use crate::function::{
    CompiledFunction, FunctionInput, FunctionOptions, FunctionOutput, FunctionRole, ScriptFunction,
};
use crate::sandbox::ipc::{
    read_frame, write_frame, CompileSpec, WireStatus, WorkerRequest, WorkerResponse,
};
use crate::sandbox::policy;

/// The one function a worker hosts, tagged by role.
enum LoadedFunction {
    Bidder(ScriptFunction<BiddingFunctionInput, BiddingFunctionOutput>),
    Scorer(ScriptFunction<AdScoringFunctionInput, AdScoringFunctionOutput>),
}

impl LoadedFunction {
    fn compile(spec: &CompileSpec) -> Result<Self> {
        let options = FunctionOptions {
            flatten_arguments: spec.flatten_arguments,
            async_wait: Duration::from_millis(spec.async_wait_ms),
        };
        match spec.role {
            FunctionRole::Bidder => {
                ScriptFunction::create(&spec.source, spec.role, options).map(Self::Bidder)
            }
            FunctionRole::Scorer => {
                ScriptFunction::create(&spec.source, spec.role, options).map(Self::Scorer)
            }
        }
    }

    fn invoke_json(&self, inputs: &[String]) -> Result<Vec<String>> {
        match self {
            Self::Bidder(function) => run_json(function, inputs),
            Self::Scorer(function) => run_json(function, inputs),
        }
    }
}

fn run_json<I, O>(function: &ScriptFunction<I, O>, inputs: &[String]) -> Result<Vec<String>>
where
    I: FunctionInput + DeserializeOwned,
    O: FunctionOutput,
{
    let parsed: Vec<I> = inputs
        .iter()
        .map(|text| {
            serde_json::from_str(text)
                .map_err(|e| Status::invalid_argument(format!("Unable to unpack inputs: {e}")))
        })
        .collect::<Result<_>>()?;
    let outputs = function.batch_invoke(&parsed)?;
    outputs
        .iter()
        .map(|output| {
            serde_json::to_string(output)
                .map_err(|e| Status::internal(format!("Unable to pack the function outputs: {e}")))
        })
        .collect()
}

/// Request handler holding the worker's state. Pure with respect to I/O so
/// the state machine is testable without pipes.
#[derive(Default)]
pub struct WorkerSession {
    function: Option<LoadedFunction>,
}

impl WorkerSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles one request. The boolean is true when the loop should stop.
    pub fn handle(&mut self, request: WorkerRequest) -> (WorkerResponse, bool) {
        match request {
            WorkerRequest::Compile(spec) => {
                if self.function.is_some() {
                    return (
                        WorkerResponse::Failure(WireStatus::encode(&Status::failed_precondition(
                            "Function has already been initialized within the sandbox.",
                        ))),
                        false,
                    );
                }
                match LoadedFunction::compile(&spec) {
                    Ok(function) => {
                        self.function = Some(function);
                        (WorkerResponse::Compiled, false)
                    }
                    Err(status) => (WorkerResponse::Failure(WireStatus::encode(&status)), false),
                }
            }
            WorkerRequest::BatchExecute { inputs } => {
                let response = match &self.function {
                    None => WorkerResponse::Failure(WireStatus::encode(
                        &Status::failed_precondition(
                            "Function has not been initialized within the sandbox.",
                        ),
                    )),
                    Some(function) => match function.invoke_json(&inputs) {
                        Ok(outputs) => WorkerResponse::Outputs(outputs),
                        Err(status) => WorkerResponse::Failure(WireStatus::encode(&status)),
                    },
                };
                (response, false)
            }
            WorkerRequest::Exit => (WorkerResponse::Exiting, true),
        }
    }
}

/// Serves requests from `reader` until `Exit` or a transport failure.
pub fn serve<R: Read, W: Write>(mut reader: R, mut writer: W) -> Result<()> {
    let mut session = WorkerSession::new();
    loop {
        let request: WorkerRequest = read_frame(&mut reader)?;
        let (response, done) = session.handle(request);
        write_frame(&mut writer, &response)?;
        if done {
            return Ok(());
        }
    }
}

/// Process entry point: install the syscall policy, then serve stdio.
///
/// Returns the process exit code. Diagnostics go to stderr; stdout carries
/// only protocol frames.
pub fn run() -> i32 {
    if let Err(status) = policy::apply() {
        eprintln!("sandbox worker: cannot apply the syscall policy: {status}");
        return 2;
    }
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    match serve(stdin.lock(), stdout.lock()) {
        Ok(()) => 0,
        Err(status) => {
            eprintln!("sandbox worker: {status}");
            1
        }
    }
}
