//! Background task plumbing: named threads, cooperative cancellation, and
//! bounded-grace teardown.
//!
//! Every background loop in the crate (tachometer sampler, LED flasher,
//! simulated fan) runs on its own thread, driving a future with
//! `futures_lite::future::block_on`.  Sleeps go through
//! [`CancelToken::sleep`], which races an `async-io-mini` reactor timer
//! against the token's signal, so a cancel request wakes the loop
//! immediately instead of after the current interval.
//!
//! ```text
//!   owner ──cancel()──▶ CancelToken ──signal──▶ loop wakes, exits
//!     │                                            │
//!     └────── join_within(grace) ◀──── done ───────┘
//! ```
//!
//! # ESP-IDF threading model
//!
//! ESP-IDF implements `std::thread` via pthreads on top of FreeRTOS tasks.
//! `esp_pthread_set_cfg()` configures the *next* `pthread_create()` from
//! the calling thread, so the config→spawn pair must not be interleaved
//! with other thread creation on the same thread.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::Arc;
use std::thread::JoinHandle;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future;
use log::{debug, warn};

use crate::error::{HardwareFault, Resource, Result};

// ───────────────────────────────────────────────────────────────
// Cancellation
// ───────────────────────────────────────────────────────────────

/// Cooperative cancellation flag with an async wake-up.
///
/// One token serves one loop: the `Signal` inside wakes a single waiter.
/// The sticky `cancelled` flag means a loop that was not sleeping when
/// `cancel()` ran still observes it at its next check.
pub struct CancelToken {
    cancelled: AtomicBool,
    wake: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            wake: Signal::new(),
        }
    }

    /// Request cancellation.  Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.wake.signal(());
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Sleep for `period` unless cancelled first.
    ///
    /// Returns `true` if the full period elapsed, `false` if the sleep was
    /// cut short (or never started) because of cancellation.
    pub async fn sleep(&self, period: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let timer = async {
            async_io_mini::Timer::after(period).await;
            true
        };
        let cancelled = async {
            self.wake.wait().await;
            false
        };
        future::or(timer, cancelled).await && !self.is_cancelled()
    }
}

// ───────────────────────────────────────────────────────────────
// Task handle
// ───────────────────────────────────────────────────────────────

/// Owner's handle to a spawned background task.
///
/// Dropping the handle detaches the thread; call [`join_within`] to wait
/// for it with an upper bound.
///
/// [`join_within`]: TaskHandle::join_within
pub struct TaskHandle<T> {
    name: &'static str,
    cancel: Arc<CancelToken>,
    done: Arc<Signal<CriticalSectionRawMutex, ()>>,
    join: JoinHandle<T>,
}

impl<T> TaskHandle<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The token the task polls.
    pub fn token(&self) -> &Arc<CancelToken> {
        &self.cancel
    }

    /// Request cancellation without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait at most `grace` for the task to finish and return its output.
    ///
    /// Returns `None` if the task overran the grace period (it is detached
    /// and left to finish on its own) or panicked.
    pub fn join_within(self, grace: Duration) -> Option<T> {
        let finished = self.join.is_finished()
            || future::block_on(future::or(
                async {
                    self.done.wait().await;
                    true
                },
                async {
                    async_io_mini::Timer::after(grace).await;
                    false
                },
            ));

        if !finished {
            warn!("task '{}' still running after {:?} grace, detaching", self.name, grace);
            return None;
        }

        match self.join.join() {
            Ok(out) => {
                debug!("task '{}' joined", self.name);
                Some(out)
            }
            Err(_) => {
                warn!("task '{}' panicked", self.name);
                None
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Spawning
// ───────────────────────────────────────────────────────────────

/// Spawn `body` on a named thread with its own cancellation token.
///
/// `body` receives the token and should return once it observes
/// cancellation.  Thread-creation failure surfaces as
/// [`Error::HardwareUnavailable`](crate::error::Error::HardwareUnavailable)
/// on [`Resource::Task`].
pub fn spawn<T, F>(name: &'static str, stack_kb: usize, body: F) -> Result<TaskHandle<T>>
where
    T: Send + 'static,
    F: FnOnce(Arc<CancelToken>) -> T + Send + 'static,
{
    let cancel = Arc::new(CancelToken::new());
    let done = Arc::new(Signal::new());

    let task_cancel = Arc::clone(&cancel);
    let task_done = Arc::clone(&done);

    configure_next_thread(stack_kb);
    debug!("Spawning '{}' (stack={}KB)", name, stack_kb);

    let join = std::thread::Builder::new()
        .name(name.into())
        .stack_size(stack_kb * 1024)
        .spawn(move || {
            let out = body(task_cancel);
            task_done.signal(());
            out
        })
        .map_err(|e| HardwareFault::new(Resource::Task, "spawn", e.raw_os_error().unwrap_or(-1)))?;

    Ok(TaskHandle {
        name,
        cancel,
        done,
        join,
    })
}

/// Apply the FreeRTOS task config (priority, stack) for the next spawn.
#[cfg(target_os = "espidf")]
fn configure_next_thread(stack_kb: usize) {
    // SAFETY: esp_pthread_set_cfg copies the struct into thread-local
    // storage consumed by the next pthread_create on this thread.
    unsafe {
        let mut cfg = esp_idf_svc::sys::esp_create_default_pthread_config();
        cfg.prio = 5;
        cfg.stack_size = (stack_kb * 1024) as _;
        let ret = esp_idf_svc::sys::esp_pthread_set_cfg(&cfg);
        if ret != esp_idf_svc::sys::ESP_OK as i32 {
            warn!("esp_pthread_set_cfg failed (rc={}), using defaults", ret);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
fn configure_next_thread(_stack_kb: usize) {}
