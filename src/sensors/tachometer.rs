//! Fan tachometer: pulse-count → RPM conversion and the sampling loop.
//!
//! A PC fan tachometer is open-collector and pulls low a fixed number of
//! times per revolution (two for nearly every fan).  The sampler drains the
//! edge counter once per window and converts:
//!
//! ```text
//!   revs  = pulses / pulses_per_rev          (whole revolutions only)
//!   rev/s = revs / (elapsed_ms / 1000)
//!   rpm   = round_ties_even(rev/s × 60)
//! ```
//!
//! A partial revolution left in a window is dropped, not carried over.
//!
//! The loop runs on its own thread (see [`crate::task`]) and is the only
//! writer of the published RPM.

use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;
use std::sync::Arc;

use log::{debug, info};

use crate::adapters::time::{MonotonicClock, Uptime};
use crate::sensors::edge_counter::PulseCount;
use crate::task::CancelToken;

/// Converts successive pulse counts into RPM, tracking the window start.
#[derive(Debug, Clone)]
pub struct RpmEstimator {
    pulses_per_rev: u32,
    last_sample_ms: u64,
}

impl RpmEstimator {
    /// `now_ms` is the baseline the first window is measured from.
    /// `pulses_per_rev` of zero is treated as one.
    pub fn new(pulses_per_rev: u32, now_ms: u64) -> Self {
        Self {
            pulses_per_rev: pulses_per_rev.max(1),
            last_sample_ms: now_ms,
        }
    }

    /// Restart the window at `now_ms`.
    pub fn reset(&mut self, now_ms: u64) {
        self.last_sample_ms = now_ms;
    }

    /// Close the current window at `now_ms` with `pulses` counted in it,
    /// start the next one, and return the RPM for the closed window.
    ///
    /// Elapsed time is clamped to at least 1 ms so a stalled clock cannot
    /// divide by zero.
    pub fn sample(&mut self, pulses: u64, now_ms: u64) -> u32 {
        let elapsed_ms = now_ms.saturating_sub(self.last_sample_ms).max(1);
        self.last_sample_ms = now_ms;
        rpm_from_pulses(pulses, elapsed_ms, self.pulses_per_rev)
    }
}

/// RPM for `pulses` edges over `elapsed_ms`, at `pulses_per_rev` edges per
/// revolution.
pub fn rpm_from_pulses(pulses: u64, elapsed_ms: u64, pulses_per_rev: u32) -> u32 {
    if pulses == 0 {
        return 0;
    }
    let revolutions = pulses / u64::from(pulses_per_rev.max(1));
    let seconds = elapsed_ms.max(1) as f64 / 1000.0;
    // float → int casts saturate
    (revolutions as f64 / seconds * 60.0).round_ties_even() as u32
}

/// Everything the sampling loop needs, moved onto its thread.
///
/// The estimator's baseline marks the start of the first window, so it
/// must be taken no later than the moment the counter starts counting.
pub struct Sampler<C: Uptime = MonotonicClock> {
    pub pulses: PulseCount,
    pub rpm: Arc<AtomicU32>,
    pub estimator: RpmEstimator,
    pub clock: C,
    pub period: Duration,
}

impl<C: Uptime> Sampler<C> {
    /// Sample every `period` until `cancel` fires.
    ///
    /// Each lap sleeps a full period, then drains the counter and publishes
    /// the window's RPM, so nothing is published before the first window
    /// closes.  A cancel observed during the sleep or before publishing
    /// ends the loop without publishing a partial window.
    pub async fn run(mut self, cancel: &CancelToken) {
        info!("Tachometer sampler started (period={:?})", self.period);
        while cancel.sleep(self.period).await {
            let pulses = self.pulses.read_and_reset();
            let rpm = self.estimator.sample(pulses, self.clock.uptime_ms());
            if cancel.is_cancelled() {
                break;
            }
            self.rpm.store(rpm, Ordering::Release);
            debug!("Tachometer: {} pulses -> {} rpm", pulses, rpm);
        }
        info!("Tachometer sampler cancelled");
    }
}
