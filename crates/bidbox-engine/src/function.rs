//! In-process execution of one FLEDGE script.
//!
//! A [`ScriptFunction`] is created once per configured script and invoked
//! from any request thread. The type holds no JavaScript state at all, only
//! the validated source, its role and its options; every invocation builds a
//! fresh Boa context, re-materializes the callable and tears the context
//! down again. This is what keeps the handle `Send + Sync` while the engine
//! underneath is single-threaded, and it guarantees that scripts cannot
//! smuggle state between requests through globals.
//!
//! # Construction
//!
//! `create` runs the script once in a scratch context and resolves the
//! callable by the FLEDGE convention: the script's completion value if it is
//! itself callable, otherwise the global named after the role (`generateBid`
//! for bidders, `scoreAd` for scorers). The callable is then installed under
//! a private global name and invoked [`WARMUP_ITERATIONS`] times with an
//! empty input, errors ignored. A script that throws on an empty input is
//! still valid once given real input; the warmup exists to populate the
//! engine's inline caches for large scripts.
//!
//! # Invocation
//!
//! Inputs are processed strictly in order and the first failure aborts the
//! batch with no partial results. A synchronous throw reports as internal;
//! promise rejections and async timeouts report as invalid arguments, since
//! they originate in the script's own logic.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use boa_engine::builtins::promise::PromiseState;
use boa_engine::object::builtins::JsPromise;
use boa_engine::object::JsObject;
use boa_engine::value::JsValue;
use boa_engine::{js_string, Context, Source};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use bidbox_common::status::{Result, Status};

use crate::conversions::{js_to_json, json_to_js};

/// Number of times a freshly compiled function is invoked with an empty
/// input before it is published.
pub const WARMUP_ITERATIONS: usize = 10;

/// Global under which the resolved callable is installed inside each
/// evaluation context.
const INTERNAL_FUNCTION_NAME: &str = "__bidbox_invoke_target__";

/// Which calling convention a script follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionRole {
    /// Buyer-supplied bidding logic (`generateBid`).
    Bidder,
    /// Seller-supplied scoring logic (`scoreAd`).
    Scorer,
}

impl FunctionRole {
    /// Conventional global name looked up when the script's completion value
    /// is not itself a function.
    pub fn declared_name(self) -> &'static str {
        match self {
            FunctionRole::Bidder => "generateBid",
            FunctionRole::Scorer => "scoreAd",
        }
    }
}

/// Per-function engine options, fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionOptions {
    /// Pass each top-level input field as its own positional argument
    /// instead of one input object.
    pub flatten_arguments: bool,
    /// How long to drain the microtask queue waiting for a returned promise
    /// to settle.
    pub async_wait: Duration,
}

impl Default for FunctionOptions {
    fn default() -> Self {
        Self { flatten_arguments: false, async_wait: Duration::from_millis(50) }
    }
}

/// One positional argument of a flattened invocation.
///
/// Only these shapes exist in the FLEDGE inputs; an input type with any
/// other top-level field kind cannot implement [`FunctionInput`] and would
/// be a failed precondition by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum FlatArg {
    /// A message-typed field, passed as a JSON object.
    Message(Value),
    /// A double field, passed as a plain number.
    Number(f64),
    /// A map field, passed as a plain object keyed by the map keys.
    Map(BTreeMap<String, Value>),
}

/// An input shape the engine can hand to a script.
pub trait FunctionInput: Serialize + Default + Send + Sync + 'static {
    /// The input's top-level fields in declaration order, for flattened
    /// invocation.
    fn flat_args(&self) -> Result<Vec<FlatArg>>;
}

/// An output shape the engine can read back from a script.
pub trait FunctionOutput: Serialize + DeserializeOwned + Send + 'static {}

/// A compiled bidding or scoring function, invocable from any thread.
///
/// Implemented by [`ScriptFunction`] (in-process) and
/// [`SandboxedFunction`](crate::sandbox::SandboxedFunction) (separate
/// process). Invocation is sequential: any failing input short-circuits the
/// batch and no partial outputs are returned.
pub trait CompiledFunction<I: FunctionInput, O: FunctionOutput>: Send + Sync {
    fn batch_invoke(&self, inputs: &[I]) -> Result<Vec<O>>;
}

impl<I: FunctionInput, O: FunctionOutput> std::fmt::Debug for dyn CompiledFunction<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFunction").finish_non_exhaustive()
    }
}

/// In-process implementation of [`CompiledFunction`] on top of Boa.
#[derive(Debug)]
pub struct ScriptFunction<I, O> {
    source: Arc<str>,
    role: FunctionRole,
    options: FunctionOptions,
    _io: PhantomData<fn(&I) -> O>,
}

impl<I: FunctionInput, O: FunctionOutput> ScriptFunction<I, O> {
    /// Compiles and validates `source`, returning a reusable handle.
    ///
    /// # Errors
    ///
    /// Returns invalid-argument when the script does not parse, throws
    /// during top-level execution, or yields nothing callable under the
    /// FLEDGE conventions for `role`.
    pub fn create(source: &str, role: FunctionRole, options: FunctionOptions) -> Result<Self> {
        let function = Self { source: Arc::from(source), role, options, _io: PhantomData };
        let mut ctx = new_context()?;
        let target = function.instantiate(&mut ctx)?;
        function.warm_up(&mut ctx, &target);
        Ok(function)
    }

    /// Evaluates the source in `ctx`, resolves the callable and installs it
    /// under the internal global name.
    fn instantiate(&self, ctx: &mut Context) -> Result<JsObject> {
        let completion = ctx
            .eval(Source::from_bytes(self.source.as_bytes()))
            .map_err(|e| Status::invalid_argument(format!("Cannot run the script: {e}")))?;

        let function_value = if completion.as_callable().is_some() {
            completion
        } else {
            let declared = ctx
                .global_object()
                .get(js_string!(self.role.declared_name()), ctx)
                .map_err(|e| {
                    Status::invalid_argument(format!(
                        "Cannot get function named according to FLEDGE API conventions: {e}"
                    ))
                })?;
            if declared.as_callable().is_none() {
                return Err(Status::invalid_argument(
                    "Globally-declared object with the expected FLEDGE function name \
                     was not a function.",
                ));
            }
            declared
        };

        ctx.global_object()
            .set(js_string!(INTERNAL_FUNCTION_NAME), function_value.clone(), false, ctx)
            .map_err(|e| Status::internal(format!("Could not install the function: {e}")))?;

        match function_value.as_callable() {
            Some(object) => Ok(object.clone()),
            None => Err(Status::internal("Script did not return a function.")),
        }
    }

    /// Repeatedly invokes the function with an empty input, ignoring
    /// errors. Failures here say nothing about real inputs.
    fn warm_up(&self, ctx: &mut Context, target: &JsObject) {
        let empty = I::default();
        for _ in 0..WARMUP_ITERATIONS {
            let _ = self.invoke_in(ctx, target, &empty);
        }
    }

    /// Runs one invocation inside an existing context.
    fn invoke_in(&self, ctx: &mut Context, target: &JsObject, input: &I) -> Result<O> {
        let arguments = self.build_arguments(ctx, input)?;

        let returned = target
            .call(&JsValue::undefined(), &arguments, ctx)
            .map_err(|e| Status::internal(format!("Function execution failed: {e}")))?;

        let settled = match returned.as_object().cloned() {
            Some(object) => match JsPromise::from_object(object) {
                Ok(promise) => wait_for_promise(promise, self.options.async_wait, ctx)?,
                Err(_) => returned,
            },
            None => returned,
        };

        let json = js_to_json(settled, ctx)?;
        serde_json::from_value(json).map_err(|e| {
            Status::failed_precondition(format!(
                "Unable to convert the bidding function output from JSON: {e}"
            ))
        })
    }

    fn build_arguments(&self, ctx: &mut Context, input: &I) -> Result<Vec<JsValue>> {
        if self.options.flatten_arguments {
            input
                .flat_args()?
                .into_iter()
                .map(|arg| match arg {
                    FlatArg::Message(value) => json_to_js(value, ctx),
                    FlatArg::Number(n) => Ok(JsValue::new(n)),
                    FlatArg::Map(map) => {
                        json_to_js(Value::Object(map.into_iter().collect()), ctx)
                    }
                })
                .collect()
        } else {
            let json = serde_json::to_value(input).map_err(|e| {
                Status::internal(format!("Unable to convert a bidding function input: {e}"))
            })?;
            Ok(vec![json_to_js(json, ctx)?])
        }
    }
}

impl<I: FunctionInput, O: FunctionOutput> CompiledFunction<I, O> for ScriptFunction<I, O> {
    fn batch_invoke(&self, inputs: &[I]) -> Result<Vec<O>> {
        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            // A context per input: per-request globals never leak.
            let mut ctx = new_context()?;
            let target = self.instantiate(&mut ctx)?;
            outputs.push(self.invoke_in(&mut ctx, &target, input)?);
        }
        Ok(outputs)
    }
}

fn new_context() -> Result<Context> {
    Context::builder()
        .build()
        .map_err(|e| Status::internal(format!("Failed to build a JavaScript context: {e}")))
}

/// Cooperatively drains the job queue until the promise settles or the
/// deadline passes. The deadline is the only signal the engine observes.
fn wait_for_promise(promise: JsPromise, wait: Duration, ctx: &mut Context) -> Result<JsValue> {
    let deadline = Instant::now() + wait;
    loop {
        let _ = ctx.run_jobs();
        match promise.state() {
            PromiseState::Fulfilled(value) => return Ok(value),
            PromiseState::Rejected(reason) => {
                // ToString of the reason, so Error objects read as
                // "TypeError: ..." rather than as property dumps.
                let text = reason
                    .to_string(ctx)
                    .ok()
                    .and_then(|s| s.to_std_string().ok())
                    .unwrap_or_else(|| reason.display().to_string());
                return Err(Status::invalid_argument(format!(
                    "Async javascript function failed: {text}"
                )));
            }
            PromiseState::Pending => {
                if Instant::now() >= deadline {
                    return Err(Status::invalid_argument("Async javascript function timed out."));
                }
            }
        }
    }
}
