//! Timer-driven background execution.
//!
//! [`PeriodicTask`] runs a callback on its own thread: once after a first
//! delay, then repeatedly with an interval measured from the end of one run
//! to the start of the next, so a slow run never overlaps itself. Dropping
//! the handle interrupts any pending sleep and joins the thread.
//!
//! Construction goes through a [`PeriodicTaskFactory`] so tests can swap in
//! handles that never fire on their own (see [`testing`]).

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// The work a periodic task runs.
pub type PeriodicCallback = Arc<dyn Fn() + Send + Sync>;

/// A scheduled task. `run_now` invokes the callback synchronously on the
/// calling thread, independent of the timer.
pub trait PeriodicHandle: Send + Sync {
    fn run_now(&self);
}

/// Produces periodic handles; the injection seam for deterministic tests.
pub type PeriodicTaskFactory =
    Arc<dyn Fn(PeriodicCallback, Duration, Duration) -> Box<dyn PeriodicHandle> + Send + Sync>;

/// The production factory, backed by [`PeriodicTask`].
pub fn default_factory() -> PeriodicTaskFactory {
    Arc::new(|callback, first_delay, interval| {
        Box::new(PeriodicTask::new(callback, first_delay, interval)) as Box<dyn PeriodicHandle>
    })
}

struct Shutdown {
    stopped: Mutex<bool>,
    signal: Condvar,
}

impl Shutdown {
    /// Sleeps up to `timeout`; returns true when shutdown was requested.
    fn sleep(&self, timeout: Duration) -> bool {
        let Ok(mut stopped) = self.stopped.lock() else { return true };
        let deadline = std::time::Instant::now() + timeout;
        while !*stopped {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            match self.signal.wait_timeout(stopped, deadline - now) {
                Ok((next, _)) => stopped = next,
                Err(_) => return true,
            }
        }
        true
    }

    fn request(&self) {
        if let Ok(mut stopped) = self.stopped.lock() {
            *stopped = true;
            self.signal.notify_all();
        }
    }
}

/// A callback executed on a dedicated thread on a fixed schedule.
pub struct PeriodicTask {
    callback: PeriodicCallback,
    shutdown: Arc<Shutdown>,
    thread: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Schedules `callback` to first run after `first_delay` and then every
    /// `interval`, measured between the end of one invocation and the start
    /// of the next.
    pub fn new(callback: PeriodicCallback, first_delay: Duration, interval: Duration) -> Self {
        let shutdown = Arc::new(Shutdown { stopped: Mutex::new(false), signal: Condvar::new() });
        let thread_shutdown = Arc::clone(&shutdown);
        let thread_callback = Arc::clone(&callback);
        let thread = std::thread::spawn(move || {
            if thread_shutdown.sleep(first_delay) {
                return;
            }
            loop {
                thread_callback();
                if thread_shutdown.sleep(interval) {
                    return;
                }
            }
        });
        Self { callback, shutdown, thread: Some(thread) }
    }
}

impl PeriodicHandle for PeriodicTask {
    fn run_now(&self) {
        (self.callback)();
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.shutdown.request();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Deterministic periodic tasks for tests.
pub mod testing {
    use super::*;

    /// Factory whose handles never fire on a timer. Tests call
    /// [`ManualPeriodicTasks::run_all_now`] to run every registered
    /// callback synchronously.
    #[derive(Default)]
    pub struct ManualPeriodicTasks {
        callbacks: Arc<Mutex<Vec<PeriodicCallback>>>,
    }

    struct ManualHandle {
        callback: PeriodicCallback,
    }

    impl PeriodicHandle for ManualHandle {
        fn run_now(&self) {
            (self.callback)();
        }
    }

    impl ManualPeriodicTasks {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn factory(&self) -> PeriodicTaskFactory {
            let callbacks = Arc::clone(&self.callbacks);
            Arc::new(move |callback, _first_delay, _interval| {
                if let Ok(mut registered) = callbacks.lock() {
                    registered.push(Arc::clone(&callback));
                }
                Box::new(ManualHandle { callback }) as Box<dyn PeriodicHandle>
            })
        }

        /// Invokes every registered callback on the calling thread.
        pub fn run_all_now(&self) {
            let callbacks = match self.callbacks.lock() {
                Ok(registered) => registered.clone(),
                Err(_) => return,
            };
            for callback in callbacks {
                callback();
            }
        }
    }
}
