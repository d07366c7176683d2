//! Bidbox Script Engine
//!
//! This crate executes untrusted FLEDGE bidding and scoring scripts inside
//! isolated JavaScript contexts, built on the Boa engine.
//!
//! # Architecture
//!
//! A [`ScriptFunction`] owns one validated script. Construction compiles and
//! runs the script in a scratch context, resolves the callable it defines
//! (either the script's completion value or the conventional global name for
//! its role), and warms it up. Every invocation afterwards runs in a fresh
//! context, so no global state survives from one request to the next.
//!
//! Boa bytecode is tied to the context that compiled it, so the retained
//! artifact is the validated source text rather than a binary snapshot. The
//! observable contract is the same: invocations never observe each other.
//!
//! # Isolation Modes
//!
//! Both execution modes implement [`CompiledFunction`]:
//!
//! - [`ScriptFunction`] runs the script in-process.
//! - [`sandbox::SandboxedFunction`] hosts the same engine in a separate
//!   worker process with a restrictive syscall policy and wall-clock limits,
//!   speaking a length-prefixed IPC protocol over the worker's stdio.
//!
//! # Calling Conventions
//!
//! Inputs cross the JavaScript boundary as JSON. In object mode the whole
//! input is one argument; in flattened mode each top-level input field
//! becomes a positional argument (see [`FlatArg`]).

pub mod conversions;
pub mod fledge_io;
pub mod function;
pub mod sandbox;

pub use fledge_io::{FledgeAdScoringFunction, FledgeBiddingFunction};
pub use function::{
    CompiledFunction, FlatArg, FunctionInput, FunctionOptions, FunctionOutput, FunctionRole,
    ScriptFunction,
};
