//! Host side of the sandbox: one worker process per compiled function.
//!
//! The host serializes every exchange with its worker behind a mutex, so a
//! sandboxed function can be shared freely across request threads. Around
//! each exchange a watchdog is armed with a wall-clock limit and disarmed
//! again afterwards; a worker that overruns the limit is killed, and the
//! in-flight call reports an internal error. A killed worker is not
//! recycled: subsequent calls keep failing until a repository refresh
//! replaces the function.

use std::io::BufReader;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bidbox_common::status::{Result, Status};

use crate::function::{CompiledFunction, FunctionInput, FunctionOptions, FunctionOutput, FunctionRole};
use crate::sandbox::ipc::{read_frame, write_frame, CompileSpec, WorkerRequest, WorkerResponse};

/// How to launch a worker process.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    /// A command re-invoking the running binary with the given arguments.
    pub fn current_exe(args: Vec<String>) -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| Status::internal(format!("Cannot locate the worker binary: {e}")))?;
        Ok(Self { program, args })
    }

    fn spawn(&self) -> Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                Status::internal(format!(
                    "Unable to spawn the sandbox worker {}: {e}",
                    self.program.display()
                ))
            })
    }
}

/// Wall-clock limits enforced by killing the worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SandboxLimits {
    /// Limit for the initial compile exchange.
    pub compile_deadline: Duration,
    /// Limit per input of a batch execution.
    pub execute_deadline: Duration,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            compile_deadline: Duration::from_secs(5),
            execute_deadline: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
struct WorkerChannel {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl WorkerChannel {
    fn round_trip(&mut self, request: &WorkerRequest) -> Result<WorkerResponse> {
        write_frame(&mut self.stdin, request)?;
        read_frame(&mut self.stdout)
    }

    fn shutdown(&mut self) {
        let _ = write_frame(&mut self.stdin, &WorkerRequest::Exit);
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A compiled function hosted in a sandboxed worker process.
#[derive(Debug)]
pub struct SandboxedFunction<I, O> {
    channel: Mutex<WorkerChannel>,
    watchdog: Watchdog,
    limits: SandboxLimits,
    _io: PhantomData<fn(&I) -> O>,
}

impl<I: FunctionInput, O: FunctionOutput> SandboxedFunction<I, O> {
    /// Spawns a worker and compiles `source` inside it.
    ///
    /// # Errors
    ///
    /// Propagates the worker's compile status (invalid-argument for a bad
    /// script) and reports internal when the worker cannot be spawned,
    /// breaks the protocol, or overruns the compile deadline.
    pub fn create(
        worker: &WorkerCommand,
        source: &str,
        role: FunctionRole,
        options: &FunctionOptions,
        limits: SandboxLimits,
    ) -> Result<Self> {
        let mut child = worker.spawn()?;
        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Status::internal("Sandbox worker stdio was not captured."));
            }
        };
        tracing::debug!(pid = child.id(), role = ?role, "sandbox worker spawned");
        let watchdog = Watchdog::spawn(child.id());
        let mut channel = WorkerChannel { child, stdin, stdout: BufReader::new(stdout) };

        let spec = CompileSpec {
            source: source.to_string(),
            role,
            flatten_arguments: options.flatten_arguments,
            async_wait_ms: options.async_wait.as_millis() as u64,
        };
        watchdog.arm(limits.compile_deadline);
        let exchange = channel.round_trip(&WorkerRequest::Compile(spec));
        let fired = watchdog.disarm();

        let outcome = if fired {
            Err(Status::internal(
                "Sandboxed function compilation exceeded its wall-clock limit.",
            ))
        } else {
            match exchange {
                Ok(WorkerResponse::Compiled) => Ok(()),
                Ok(WorkerResponse::Failure(status)) => Err(status.decode()),
                Ok(other) => {
                    Err(Status::internal(format!("Unexpected sandbox response: {other:?}")))
                }
                Err(status) => Err(status),
            }
        };

        match outcome {
            Ok(()) => Ok(Self { channel: Mutex::new(channel), watchdog, limits, _io: PhantomData }),
            Err(status) => {
                channel.shutdown();
                Err(status)
            }
        }
    }
}

impl<I: FunctionInput, O: FunctionOutput> CompiledFunction<I, O> for SandboxedFunction<I, O> {
    fn batch_invoke(&self, inputs: &[I]) -> Result<Vec<O>> {
        let payloads: Vec<String> = inputs
            .iter()
            .map(|input| {
                serde_json::to_string(input).map_err(|e| {
                    Status::internal(format!("Unable to convert a bidding function input: {e}"))
                })
            })
            .collect::<Result<_>>()?;

        let mut channel = self
            .channel
            .lock()
            .map_err(|_| Status::internal("Sandbox channel lock is poisoned."))?;

        let deadline = self.limits.execute_deadline * inputs.len().max(1) as u32;
        self.watchdog.arm(deadline);
        let exchange = channel.round_trip(&WorkerRequest::BatchExecute { inputs: payloads });
        let fired = self.watchdog.disarm();
        if fired {
            tracing::warn!("sandbox worker killed after overrunning its execution deadline");
            return Err(Status::internal(
                "Sandboxed function execution exceeded its wall-clock limit.",
            ));
        }

        match exchange? {
            WorkerResponse::Outputs(outputs) => outputs
                .iter()
                .map(|text| {
                    serde_json::from_str(text).map_err(|e| {
                        Status::internal(format!("Unable to unpack the function outputs: {e}"))
                    })
                })
                .collect(),
            WorkerResponse::Failure(status) => Err(status.decode()),
            other => Err(Status::internal(format!("Unexpected sandbox response: {other:?}"))),
        }
    }
}

impl<I, O> Drop for SandboxedFunction<I, O> {
    fn drop(&mut self) {
        if let Ok(mut channel) = self.channel.lock() {
            channel.shutdown();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum WatchdogState {
    Disarmed,
    Armed(Instant),
    Fired,
    ShutDown,
}

#[derive(Debug)]
struct WatchdogShared {
    state: Mutex<WatchdogState>,
    signal: Condvar,
}

/// Kills the worker when an armed deadline expires. Disarmed between
/// exchanges, so an idle worker is never touched.
#[derive(Debug)]
struct Watchdog {
    shared: Arc<WatchdogShared>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    fn spawn(pid: u32) -> Self {
        let shared = Arc::new(WatchdogShared {
            state: Mutex::new(WatchdogState::Disarmed),
            signal: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::spawn(move || watch(thread_shared, pid));
        Self { shared, thread: Some(thread) }
    }

    fn arm(&self, timeout: Duration) {
        if let Ok(mut state) = self.shared.state.lock() {
            *state = WatchdogState::Armed(Instant::now() + timeout);
            self.shared.signal.notify_all();
        }
    }

    /// Returns whether the deadline fired while armed.
    fn disarm(&self) -> bool {
        match self.shared.state.lock() {
            Ok(mut state) => {
                let fired = *state == WatchdogState::Fired;
                *state = WatchdogState::Disarmed;
                self.shared.signal.notify_all();
                fired
            }
            Err(_) => false,
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            *state = WatchdogState::ShutDown;
            self.shared.signal.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn watch(shared: Arc<WatchdogShared>, pid: u32) {
    let Ok(mut state) = shared.state.lock() else { return };
    loop {
        match *state {
            WatchdogState::ShutDown => return,
            WatchdogState::Armed(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    kill_process(pid);
                    *state = WatchdogState::Fired;
                } else {
                    match shared.signal.wait_timeout(state, deadline - now) {
                        Ok((next, _)) => state = next,
                        Err(_) => return,
                    }
                }
            }
            WatchdogState::Disarmed | WatchdogState::Fired => match shared.signal.wait(state) {
                Ok(next) => state = next,
                Err(_) => return,
            },
        }
    }
}

#[cfg(unix)]
fn kill_process(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    // Refuse pid values that would address a process group.
    let Ok(pid) = i32::try_from(pid) else { return };
    if pid <= 0 {
        return;
    }
    let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_process(_pid: u32) {}
