//! Monotonic time source for RPM windows.
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic).
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant`.
//!
//! Wall-clock time is never used: an NTP step mid-window would corrupt
//! the rate.

/// Millisecond uptime source the tachometer sampler measures windows with.
pub trait Uptime: Send + 'static {
    fn uptime_ms(&self) -> u64;
}

/// Monotonic clock.  `Copy` so the sampler thread gets its own.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_ms(&self) -> u64 {
        // SAFETY: esp_timer_get_time reads the RTC counter; callable from any task.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    /// Milliseconds since this clock was created (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Uptime for MonotonicClock {
    fn uptime_ms(&self) -> u64 {
        MonotonicClock::uptime_ms(self)
    }
}
