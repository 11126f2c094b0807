//! Edge-counting GPIO input.
//!
//! Registers an edge callback with the GPIO controller that increments an
//! atomic counter.  The sampler drains it with [`PulseCount::read_and_reset`],
//! a single `swap(0)`, so an edge is counted either before or after the
//! boundary but never twice or not at all.
//!
//! Callbacks run in the controller's notification context (ISR dispatch on
//! ESP-IDF, the firing thread in simulation), hence a lock-free counter
//! rather than a mutex.

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::error::Result;
use crate::ports::{CallbackId, Edge, GpioController, PinMode};

/// Shared handle to an edge counter's tally.
///
/// Cloned into the edge callback (writer) and the sampling task (reader).
#[derive(Debug, Clone, Default)]
pub struct PulseCount(Arc<AtomicU64>);

impl PulseCount {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one edge.  Safe to call from interrupt context.
    pub fn record(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Return the count and reset it to zero in one atomic step.
    pub fn read_and_reset(&self) -> u64 {
        self.0.swap(0, Ordering::AcqRel)
    }

    /// Current count, without resetting.
    pub fn peek(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }
}

/// Counts edges on one GPIO input line.
pub struct EdgeCounter<G: GpioController> {
    controller: Arc<G>,
    pin: u32,
    watch: Edge,
    count: PulseCount,
    registration: Option<CallbackId>,
}

impl<G: GpioController> EdgeCounter<G> {
    /// Create a stopped counter.  Does not touch the controller.
    pub fn new(controller: Arc<G>, pin: u32, watch: Edge) -> Self {
        Self {
            controller,
            pin,
            watch,
            count: PulseCount::new(),
            registration: None,
        }
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn watch_edge(&self) -> Edge {
        self.watch
    }

    /// Whether the edge callback is currently registered.
    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    /// Shared handle to the tally, for a sampling task.
    pub fn pulses(&self) -> PulseCount {
        self.count.clone()
    }

    /// Reset the count, open the line as a pull-up input and start counting.
    ///
    /// Calling `on()` while already counting only resets the count.
    pub fn on(&mut self) -> Result<()> {
        self.count.reset();
        if self.registration.is_some() {
            return Ok(());
        }

        if !self.controller.is_pin_open(self.pin) {
            self.controller.open_pin(self.pin, PinMode::InputPullUp)?;
        }

        let count = self.count.clone();
        let id = self
            .controller
            .register_edge_callback(self.pin, self.watch, Box::new(move |_edge: Edge| count.record()))?;
        self.registration = Some(id);
        debug!("EdgeCounter[{}]: counting {:?} edges", self.pin, self.watch);
        Ok(())
    }

    /// Stop counting: unregister the callback, then close the line.
    /// Safe to call repeatedly.
    pub fn off(&mut self) -> Result<()> {
        if let Some(id) = self.registration.take() {
            self.controller.unregister_edge_callback(self.pin, id)?;
            debug!("EdgeCounter[{}]: stopped", self.pin);
        }
        if self.controller.is_pin_open(self.pin) {
            self.controller.close_pin(self.pin)?;
        }
        Ok(())
    }

    /// Return the count and reset it atomically.
    pub fn read_and_reset(&self) -> u64 {
        self.count.read_and_reset()
    }

    /// Current count without resetting.
    pub fn peek(&self) -> u64 {
        self.count.peek()
    }
}

impl<G: GpioController> Drop for EdgeCounter<G> {
    fn drop(&mut self) {
        if let Err(e) = self.off() {
            warn!("EdgeCounter[{}]: release failed: {}", self.pin, e);
        }
        self.count.reset();
    }
}
