//! Unified error types for fanctl.
//!
//! A single `Error` enum that every component converts into, so callers of
//! the fan and LED constructs see one error surface.  All variants are
//! `Copy` so they can be returned from teardown paths and logged without
//! allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An argument was outside its documented range (duty cycle outside
    /// 0–100, odd-length flash sequence, zero frequency, ...).
    InvalidArgument(&'static str),
    /// The underlying GPIO / PWM controller rejected the call.
    HardwareUnavailable(HardwareFault),
    /// The component was already torn down.
    AlreadyDisposed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::HardwareUnavailable(fault) => write!(f, "hardware unavailable: {fault}"),
            Self::AlreadyDisposed => write!(f, "component already disposed"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Hardware faults
// ---------------------------------------------------------------------------

/// Which controller resource a failed call was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// A GPIO line.
    Pin(u32),
    /// A PWM channel on a PWM chip.
    PwmChannel { chip: u32, channel: u32 },
    /// The background task runtime (thread creation).
    Task,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pin(pin) => write!(f, "GPIO {pin}"),
            Self::PwmChannel { chip, channel } => write!(f, "PWM {chip}:{channel}"),
            Self::Task => write!(f, "task runtime"),
        }
    }
}

/// A controller call that failed.  `code` is the platform return code
/// (ESP-IDF `esp_err_t`, errno, or `-1` when the platform has none).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareFault {
    pub resource: Resource,
    pub op: &'static str,
    pub code: i32,
}

impl HardwareFault {
    pub const fn new(resource: Resource, op: &'static str, code: i32) -> Self {
        Self { resource, op, code }
    }
}

impl fmt::Display for HardwareFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed on {} (rc={})", self.op, self.resource, self.code)
    }
}

impl From<HardwareFault> for Error {
    fn from(fault: HardwareFault) -> Self {
        Self::HardwareUnavailable(fault)
    }
}

// ---------------------------------------------------------------------------
// embedded-hal error bridging
// ---------------------------------------------------------------------------

impl embedded_hal::digital::Error for Error {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

impl embedded_hal::pwm::Error for Error {
    fn kind(&self) -> embedded_hal::pwm::ErrorKind {
        embedded_hal::pwm::ErrorKind::Other
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
