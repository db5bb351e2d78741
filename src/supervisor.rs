//! Supervised periodic workers.
//!
//! Each background loop (monitor, poller, drain) runs on its own named
//! thread.  One iteration is the isolation boundary: an `Err` or a panic
//! inside it is logged and the loop carries on at the next period.
//!
//! ```text
//!   spawn ─▶ ┌──────────────────────────────────────────┐
//!            │ loop while !stop                         │
//!            │   catch_unwind(step) ─▶ Ok | Err | panic │──▶ log
//!            │   sleep(period) in short slices          │
//!            └──────────────────────────────────────────┘
//!   stop() ─▶ flag + join
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

/// Longest single sleep, so `stop()` returns promptly.
const STOP_POLL: Duration = Duration::from_millis(50);

#[derive(Default)]
struct TaskCounters {
    runs: AtomicU64,
    failures: AtomicU64,
    panics: AtomicU64,
}

/// Handle to a running periodic worker.
pub struct PeriodicTask {
    name: String,
    stop: Arc<AtomicBool>,
    counters: Arc<TaskCounters>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Run `step` every `period` until stopped.  The first run is immediate.
    pub fn spawn<F, E>(name: &str, period: Duration, mut step: F) -> std::io::Result<Self>
    where
        F: FnMut() -> Result<(), E> + Send + 'static,
        E: core::fmt::Display,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(TaskCounters::default());

        let thread_stop = Arc::clone(&stop);
        let thread_counters = Arc::clone(&counters);
        let thread_name = name.to_string();
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            info!("Worker '{thread_name}' started (every {period:?})");
            while !thread_stop.load(Ordering::SeqCst) {
                let started = Instant::now();
                thread_counters.runs.fetch_add(1, Ordering::Relaxed);
                match panic::catch_unwind(AssertUnwindSafe(&mut step)) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        thread_counters.failures.fetch_add(1, Ordering::Relaxed);
                        warn!("Worker '{thread_name}' iteration failed: {e}");
                    }
                    Err(payload) => {
                        thread_counters.panics.fetch_add(1, Ordering::Relaxed);
                        error!("Worker '{thread_name}' iteration panicked: {}", panic_message(&*payload));
                    }
                }
                sleep_unless_stopped(&thread_stop, period.saturating_sub(started.elapsed()));
            }
            debug!("Worker '{thread_name}' exiting");
        })?;

        Ok(Self {
            name: name.to_string(),
            stop,
            counters,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Iterations started so far.
    pub fn runs(&self) -> u64 {
        self.counters.runs.load(Ordering::Relaxed)
    }

    /// Iterations that returned `Err`.
    pub fn failures(&self) -> u64 {
        self.counters.failures.load(Ordering::Relaxed)
    }

    pub fn panics(&self) -> u64 {
        self.counters.panics.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the worker and wait for the current iteration to finish.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            reap(&self.name, handle);
            info!("Worker '{}' stopped", self.name);
        }
    }

    /// Block until the worker thread exits.  Never returns for a worker
    /// nobody stops.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            reap(&self.name, handle);
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Join `handle`, logging a thread that died.  Returns whether it exited
/// cleanly.
fn reap(name: &str, handle: JoinHandle<()>) -> bool {
    match handle.join() {
        Ok(()) => true,
        Err(payload) => {
            error!("Worker '{name}' thread died: {}", panic_message(&*payload));
            false
        }
    }
}

fn sleep_unless_stopped(stop: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while !stop.load(Ordering::SeqCst) {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            break;
        }
        thread::sleep(left.min(STOP_POLL));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".into()
    }
}
