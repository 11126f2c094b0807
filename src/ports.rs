//! Port traits: the boundary between the components and the controllers.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DigitalOutput / EdgeCounter / PwmOutput
//! ```
//!
//! Controller adapters (ESP-IDF GPIO + LEDC, the in-memory simulation, test
//! mocks) implement these traits.  Components hold an `Arc` to a controller
//! so one controller can back many pins and channels, and so the sampling
//! thread can reach it.  Each pin / channel is owned by at most one component
//! at a time; the controllers do not enforce that.

use embedded_hal::digital::PinState;

use crate::error::Result;

// ───────────────────────────────────────────────────────────────
// GPIO controller capability
// ───────────────────────────────────────────────────────────────

/// Electrical configuration a GPIO line is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Output,
    Input,
    InputPullUp,
    InputPullDown,
}

/// Which level transitions an edge callback is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

impl Edge {
    /// Whether an observed transition `seen` (never `Both`) is selected by
    /// this watch setting.
    pub fn matches(self, seen: Edge) -> bool {
        match self {
            Edge::Both => true,
            watch => watch == seen,
        }
    }
}

/// Handle returned by [`GpioController::register_edge_callback`], used to
/// unregister the same callback later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(pub u32);

/// Edge notification callback.  Invoked from the controller's notification
/// context (ISR dispatch task, simulation thread), so it must be cheap and
/// thread-safe.
pub type EdgeCallback = Box<dyn Fn(Edge) + Send + Sync>;

/// Pin-addressed GPIO controller.
pub trait GpioController: Send + Sync {
    /// Configure and claim `pin` in `mode`.
    fn open_pin(&self, pin: u32, mode: PinMode) -> Result<()>;

    /// Release `pin`.
    fn close_pin(&self, pin: u32) -> Result<()>;

    /// Whether `pin` is currently open.
    fn is_pin_open(&self, pin: u32) -> bool;

    /// Drive an open output `pin` to `level`.
    fn write_pin(&self, pin: u32, level: PinState) -> Result<()>;

    /// Subscribe `callback` to `edge` transitions on `pin`.
    fn register_edge_callback(&self, pin: u32, edge: Edge, callback: EdgeCallback) -> Result<CallbackId>;

    /// Remove a previously registered callback.  Unknown ids are a no-op.
    fn unregister_edge_callback(&self, pin: u32, id: CallbackId) -> Result<()>;
}

// ───────────────────────────────────────────────────────────────
// PWM controller capability
// ───────────────────────────────────────────────────────────────

/// Chip/channel-addressed PWM controller.  Duty cycles are percentages
/// already validated to 0–100 by [`PwmOutput`](crate::drivers::pwm_output::PwmOutput).
pub trait PwmController: Send + Sync {
    fn open_channel(&self, chip: u32, channel: u32) -> Result<()>;

    fn close_channel(&self, chip: u32, channel: u32) -> Result<()>;

    /// Start (or restart) waveform generation.
    fn start_writing(&self, chip: u32, channel: u32, frequency_hz: u32, duty_percent: u8) -> Result<()>;

    /// Update the duty cycle of a running waveform.
    fn change_duty_cycle(&self, chip: u32, channel: u32, duty_percent: u8) -> Result<()>;

    /// Stop waveform generation; the channel stays open.
    fn stop_writing(&self, chip: u32, channel: u32) -> Result<()>;
}
