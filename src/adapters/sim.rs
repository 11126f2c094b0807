//! In-memory GPIO and PWM controllers for host builds.
//!
//! Used by the demo binary when no hardware is present and by the unit
//! tests.  The simulation is strict where real controllers are strict:
//! opening a pin or channel twice, writing a closed pin, or driving a
//! closed channel fails with
//! [`Error::HardwareUnavailable`](crate::error::Error::HardwareUnavailable), so component
//! bugs that real hardware would reject show up here too.
//!
//! [`SimulatedFan`] closes the loop: it watches a PWM channel and emits
//! tachometer edges at a rate proportional to the live duty cycle.

use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use embedded_hal::digital::PinState;
use futures_lite::future;
use heapless::HistoryBuffer;
use log::info;

use crate::error::{HardwareFault, Resource, Result};
use crate::ports::{CallbackId, Edge, EdgeCallback, GpioController, PinMode, PwmController};
use crate::task::{self, TaskHandle};

const EBUSY: i32 = -16;
const EINVAL: i32 = -22;

/// Pin events kept across all pins; older ones are overwritten.
pub const HISTORY_DEPTH: usize = 512;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ───────────────────────────────────────────────────────────────
// GPIO
// ───────────────────────────────────────────────────────────────

/// Observable pin activity, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinEvent {
    Opened(PinMode),
    Written(PinState),
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct PinSlot {
    mode: PinMode,
    level: PinState,
}

struct Subscription {
    id: CallbackId,
    pin: u32,
    edge: Edge,
    callback: Arc<EdgeCallback>,
}

/// Simulated pin-addressed GPIO controller.
#[derive(Default)]
pub struct SimGpio {
    pins: Mutex<HashMap<u32, PinSlot>>,
    subscriptions: Mutex<Vec<Subscription>>,
    history: Mutex<HistoryBuffer<(Instant, u32, PinEvent), HISTORY_DEPTH>>,
    next_id: AtomicU32,
}

impl SimGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an edge on `pin` to every callback watching it.
    ///
    /// Callbacks run on the caller's thread, outside the controller locks.
    pub fn fire_edge(&self, pin: u32, seen: Edge) {
        let targets: Vec<Arc<EdgeCallback>> = lock(&self.subscriptions)
            .iter()
            .filter(|s| s.pin == pin && s.edge.matches(seen))
            .map(|s| Arc::clone(&s.callback))
            .collect();
        for callback in targets {
            callback(seen);
        }
    }

    /// Mode `pin` was opened with, if open.
    pub fn pin_mode(&self, pin: u32) -> Option<PinMode> {
        lock(&self.pins).get(&pin).map(|slot| slot.mode)
    }

    /// Last level written to `pin`, if open.
    pub fn level(&self, pin: u32) -> Option<PinState> {
        lock(&self.pins).get(&pin).map(|slot| slot.level)
    }

    /// Number of callbacks registered on `pin`.
    pub fn callback_count(&self, pin: u32) -> usize {
        lock(&self.subscriptions).iter().filter(|s| s.pin == pin).count()
    }

    /// Timestamped activity on `pin`, oldest first.  Only the last
    /// [`HISTORY_DEPTH`] events across all pins are retained.
    pub fn history(&self, pin: u32) -> Vec<(Instant, PinEvent)> {
        lock(&self.history)
            .oldest_ordered()
            .filter(|(_, p, _)| *p == pin)
            .map(|(at, _, event)| (*at, *event))
            .collect()
    }

    fn record(&self, pin: u32, event: PinEvent) {
        lock(&self.history).write((Instant::now(), pin, event));
    }
}

impl GpioController for SimGpio {
    fn open_pin(&self, pin: u32, mode: PinMode) -> Result<()> {
        let mut pins = lock(&self.pins);
        if pins.contains_key(&pin) {
            return Err(HardwareFault::new(Resource::Pin(pin), "open_pin", EBUSY).into());
        }
        pins.insert(
            pin,
            PinSlot {
                mode,
                level: PinState::Low,
            },
        );
        drop(pins);
        self.record(pin, PinEvent::Opened(mode));
        Ok(())
    }

    fn close_pin(&self, pin: u32) -> Result<()> {
        if lock(&self.pins).remove(&pin).is_none() {
            return Err(HardwareFault::new(Resource::Pin(pin), "close_pin", EINVAL).into());
        }
        self.record(pin, PinEvent::Closed);
        Ok(())
    }

    fn is_pin_open(&self, pin: u32) -> bool {
        lock(&self.pins).contains_key(&pin)
    }

    fn write_pin(&self, pin: u32, level: PinState) -> Result<()> {
        let mut pins = lock(&self.pins);
        match pins.get_mut(&pin) {
            Some(slot) if slot.mode == PinMode::Output => slot.level = level,
            _ => return Err(HardwareFault::new(Resource::Pin(pin), "write_pin", EINVAL).into()),
        }
        drop(pins);
        self.record(pin, PinEvent::Written(level));
        Ok(())
    }

    fn register_edge_callback(&self, pin: u32, edge: Edge, callback: EdgeCallback) -> Result<CallbackId> {
        if !self.is_pin_open(pin) {
            return Err(HardwareFault::new(Resource::Pin(pin), "register_edge_callback", EINVAL).into());
        }
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscriptions).push(Subscription {
            id,
            pin,
            edge,
            callback: Arc::new(callback),
        });
        Ok(id)
    }

    fn unregister_edge_callback(&self, pin: u32, id: CallbackId) -> Result<()> {
        lock(&self.subscriptions).retain(|s| !(s.pin == pin && s.id == id));
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// PWM
// ───────────────────────────────────────────────────────────────

/// Snapshot of one simulated PWM channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimChannel {
    pub writing: bool,
    pub frequency_hz: u32,
    pub duty_percent: u8,
}

/// Simulated chip/channel-addressed PWM controller.
#[derive(Default)]
pub struct SimPwm {
    channels: Mutex<HashMap<(u32, u32), SimChannel>>,
}

impl SimPwm {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of an open channel, `None` if closed.
    pub fn channel(&self, chip: u32, channel: u32) -> Option<SimChannel> {
        lock(&self.channels).get(&(chip, channel)).copied()
    }

    /// Duty the channel is currently emitting (0 when stopped or closed).
    pub fn effective_duty(&self, chip: u32, channel: u32) -> u8 {
        match self.channel(chip, channel) {
            Some(ch) if ch.writing => ch.duty_percent,
            _ => 0,
        }
    }

    fn with_open<R>(
        &self,
        chip: u32,
        channel: u32,
        op: &'static str,
        f: impl FnOnce(&mut SimChannel) -> Result<R>,
    ) -> Result<R> {
        let mut channels = lock(&self.channels);
        match channels.get_mut(&(chip, channel)) {
            Some(ch) => f(ch),
            None => Err(HardwareFault::new(Resource::PwmChannel { chip, channel }, op, EINVAL).into()),
        }
    }
}

impl PwmController for SimPwm {
    fn open_channel(&self, chip: u32, channel: u32) -> Result<()> {
        let mut channels = lock(&self.channels);
        if channels.contains_key(&(chip, channel)) {
            return Err(HardwareFault::new(Resource::PwmChannel { chip, channel }, "open_channel", EBUSY).into());
        }
        channels.insert((chip, channel), SimChannel::default());
        Ok(())
    }

    fn close_channel(&self, chip: u32, channel: u32) -> Result<()> {
        if lock(&self.channels).remove(&(chip, channel)).is_none() {
            return Err(HardwareFault::new(Resource::PwmChannel { chip, channel }, "close_channel", EINVAL).into());
        }
        Ok(())
    }

    fn start_writing(&self, chip: u32, channel: u32, frequency_hz: u32, duty_percent: u8) -> Result<()> {
        self.with_open(chip, channel, "start_writing", |ch| {
            ch.writing = true;
            ch.frequency_hz = frequency_hz;
            ch.duty_percent = duty_percent;
            Ok(())
        })
    }

    fn change_duty_cycle(&self, chip: u32, channel: u32, duty_percent: u8) -> Result<()> {
        self.with_open(chip, channel, "change_duty_cycle", |ch| {
            if !ch.writing {
                return Err(HardwareFault::new(Resource::PwmChannel { chip, channel }, "change_duty_cycle", EINVAL).into());
            }
            ch.duty_percent = duty_percent;
            Ok(())
        })
    }

    fn stop_writing(&self, chip: u32, channel: u32) -> Result<()> {
        self.with_open(chip, channel, "stop_writing", |ch| {
            ch.writing = false;
            Ok(())
        })
    }
}

// ───────────────────────────────────────────────────────────────
// Simulated fan
// ───────────────────────────────────────────────────────────────

/// Emits tachometer edges on a [`SimGpio`] pin at the speed a fan driven
/// by a [`SimPwm`] channel would turn: `max_rpm × duty / 100`.
pub struct SimulatedFan {
    task: TaskHandle<()>,
}

impl SimulatedFan {
    const TICK: Duration = Duration::from_millis(10);

    pub fn spawn(
        gpio: Arc<SimGpio>,
        pwm: Arc<SimPwm>,
        (chip, channel): (u32, u32),
        tacho_pin: u32,
        max_rpm: u32,
        pulses_per_rev: u32,
    ) -> Result<Self> {
        info!(
            "SimulatedFan: PWM {}:{} -> GPIO {} (max {} rpm)",
            chip, channel, tacho_pin, max_rpm
        );
        let task = task::spawn("sim-fan", 32, move |cancel| {
            let mut owed = 0.0f64;
            let mut last = Instant::now();
            while future::block_on(cancel.sleep(Self::TICK)) {
                let now = Instant::now();
                let dt = now.duration_since(last).as_secs_f64();
                last = now;

                let rpm = f64::from(max_rpm) * f64::from(pwm.effective_duty(chip, channel)) / 100.0;
                owed += rpm / 60.0 * f64::from(pulses_per_rev) * dt;
                while owed >= 1.0 {
                    gpio.fire_edge(tacho_pin, Edge::Falling);
                    gpio.fire_edge(tacho_pin, Edge::Rising);
                    owed -= 1.0;
                }
            }
        })?;
        Ok(Self { task })
    }

    /// Stop emitting edges and wait briefly for the thread.
    pub fn stop(self) {
        self.task.cancel();
        let _ = self.task.join_within(Duration::from_secs(1));
    }
}
