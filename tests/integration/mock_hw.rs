//! Mock GPIO and PWM controllers for integration tests.
//!
//! Both controllers append to one shared [`CallLog`], so tests can assert
//! on the interleaving of GPIO and PWM calls.  Any operation can be made to
//! fail with [`MockHardware::fail`], and edges are injected with
//! [`MockGpio::fire`] or, at registration time, [`MockGpio::pulse_on_register`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use embedded_hal::digital::PinState;
use fanctl::error::{Error, HardwareFault, Resource};
use fanctl::ports::{CallbackId, Edge, EdgeCallback, GpioController, PinMode, PwmController};

// ── Call record ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    OpenPin { pin: u32, mode: PinMode },
    ClosePin { pin: u32 },
    WritePin { pin: u32, level: PinState },
    Register { pin: u32, edge: Edge },
    Unregister { pin: u32 },
    OpenChannel { chip: u32, channel: u32 },
    CloseChannel { chip: u32, channel: u32 },
    StartWriting { chip: u32, channel: u32, hz: u32, duty: u8 },
    ChangeDuty { chip: u32, channel: u32, duty: u8 },
    StopWriting { chip: u32, channel: u32 },
}

#[derive(Default)]
pub struct CallLog {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<&'static str>>,
}

#[allow(dead_code)]
impl CallLog {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    /// Position of the first call matching `pred`.
    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.lock().unwrap().iter().position(|c| pred(c))
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Record `call`, or fail it with rc `-1` if `op` is marked failing.
    fn record(&self, op: &'static str, resource: Resource, call: Call) -> Result<(), Error> {
        if self.failing.lock().unwrap().contains(op) {
            return Err(HardwareFault::new(resource, op, -1).into());
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

// ── Mock hardware ─────────────────────────────────────────────

/// A GPIO and a PWM controller sharing one call log.
pub struct MockHardware {
    pub log: Arc<CallLog>,
    pub gpio: Arc<MockGpio>,
    pub pwm: Arc<MockPwm>,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new() -> Self {
        let log = Arc::new(CallLog::default());
        Self {
            gpio: Arc::new(MockGpio {
                log: Arc::clone(&log),
                open: Mutex::new(HashMap::new()),
                callbacks: Mutex::new(Vec::new()),
                next_id: AtomicU32::new(1),
                pulses_on_register: AtomicU32::new(0),
            }),
            pwm: Arc::new(MockPwm { log: Arc::clone(&log) }),
            log,
        }
    }

    /// Make every later `op` call fail.
    pub fn fail(&self, op: &'static str) {
        self.log.failing.lock().unwrap().insert(op);
    }

    pub fn heal(&self, op: &'static str) {
        self.log.failing.lock().unwrap().remove(op);
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

// ── MockGpio ──────────────────────────────────────────────────

pub struct MockGpio {
    log: Arc<CallLog>,
    open: Mutex<HashMap<u32, PinMode>>,
    callbacks: Mutex<Vec<(CallbackId, u32, Edge, Arc<EdgeCallback>)>>,
    next_id: AtomicU32,
    pulses_on_register: AtomicU32,
}

#[allow(dead_code)]
impl MockGpio {
    /// Deliver `count` rising edges to each new callback before
    /// `register_edge_callback` returns.
    pub fn pulse_on_register(&self, count: u32) {
        self.pulses_on_register.store(count, Ordering::Relaxed);
    }

    /// Deliver `count` edges of kind `seen` on `pin`.
    pub fn fire(&self, pin: u32, seen: Edge, count: usize) {
        let targets: Vec<Arc<EdgeCallback>> = self
            .callbacks
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p, edge, _)| *p == pin && edge.matches(seen))
            .map(|(_, _, _, cb)| Arc::clone(cb))
            .collect();
        for _ in 0..count {
            for cb in &targets {
                cb(seen);
            }
        }
    }

    pub fn callback_count(&self, pin: u32) -> usize {
        self.callbacks.lock().unwrap().iter().filter(|(_, p, _, _)| *p == pin).count()
    }
}

impl GpioController for MockGpio {
    fn open_pin(&self, pin: u32, mode: PinMode) -> Result<(), Error> {
        self.log.record("open_pin", Resource::Pin(pin), Call::OpenPin { pin, mode })?;
        self.open.lock().unwrap().insert(pin, mode);
        Ok(())
    }

    fn close_pin(&self, pin: u32) -> Result<(), Error> {
        self.log.record("close_pin", Resource::Pin(pin), Call::ClosePin { pin })?;
        self.open.lock().unwrap().remove(&pin);
        Ok(())
    }

    fn is_pin_open(&self, pin: u32) -> bool {
        self.open.lock().unwrap().contains_key(&pin)
    }

    fn write_pin(&self, pin: u32, level: PinState) -> Result<(), Error> {
        self.log.record("write_pin", Resource::Pin(pin), Call::WritePin { pin, level })
    }

    fn register_edge_callback(&self, pin: u32, edge: Edge, callback: EdgeCallback) -> Result<CallbackId, Error> {
        self.log
            .record("register_edge_callback", Resource::Pin(pin), Call::Register { pin, edge })?;
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let callback = Arc::new(callback);
        self.callbacks.lock().unwrap().push((id, pin, edge, Arc::clone(&callback)));
        for _ in 0..self.pulses_on_register.load(Ordering::Relaxed) {
            callback(Edge::Rising);
        }
        Ok(id)
    }

    fn unregister_edge_callback(&self, pin: u32, id: CallbackId) -> Result<(), Error> {
        self.log
            .record("unregister_edge_callback", Resource::Pin(pin), Call::Unregister { pin })?;
        self.callbacks.lock().unwrap().retain(|(cid, _, _, _)| *cid != id);
        Ok(())
    }
}

// ── MockPwm ───────────────────────────────────────────────────

pub struct MockPwm {
    log: Arc<CallLog>,
}

impl PwmController for MockPwm {
    fn open_channel(&self, chip: u32, channel: u32) -> Result<(), Error> {
        self.log.record(
            "open_channel",
            Resource::PwmChannel { chip, channel },
            Call::OpenChannel { chip, channel },
        )
    }

    fn close_channel(&self, chip: u32, channel: u32) -> Result<(), Error> {
        self.log.record(
            "close_channel",
            Resource::PwmChannel { chip, channel },
            Call::CloseChannel { chip, channel },
        )
    }

    fn start_writing(&self, chip: u32, channel: u32, hz: u32, duty: u8) -> Result<(), Error> {
        self.log.record(
            "start_writing",
            Resource::PwmChannel { chip, channel },
            Call::StartWriting { chip, channel, hz, duty },
        )
    }

    fn change_duty_cycle(&self, chip: u32, channel: u32, duty: u8) -> Result<(), Error> {
        self.log.record(
            "change_duty_cycle",
            Resource::PwmChannel { chip, channel },
            Call::ChangeDuty { chip, channel, duty },
        )
    }

    fn stop_writing(&self, chip: u32, channel: u32) -> Result<(), Error> {
        self.log.record(
            "stop_writing",
            Resource::PwmChannel { chip, channel },
            Call::StopWriting { chip, channel },
        )
    }
}
