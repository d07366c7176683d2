//! Process-level isolation for compiled scripts.
//!
//! When sandboxing is enabled, every compiled function lives in its own
//! worker process for the lifetime of the function. The worker hosts exactly
//! one script: it accepts a single `Compile` request, then serves
//! `BatchExecute` requests until it is told to exit or its host kills it for
//! overrunning a wall-clock limit.
//!
//! # Wire protocol
//!
//! Messages travel over the worker's stdin/stdout as length-prefixed frames
//! (4-byte big-endian length, then a postcard-encoded message). Inputs and
//! outputs are carried as JSON text inside the frames, the same encoding
//! they use to cross the JavaScript boundary.
//!
//! # Syscall policy
//!
//! The worker installs a seccomp allow-list before serving: read, open,
//! stat and exit, page-protection flips for the engine, scheduling hints,
//! and the handful of calls the runtime itself needs. Everything else,
//! in particular filesystem write, networking and process creation, is
//! denied by default and kills the worker.

pub mod host;
pub mod ipc;
pub mod policy;
pub mod worker;

pub use host::{SandboxLimits, SandboxedFunction, WorkerCommand};
pub use worker::WorkerSession;
