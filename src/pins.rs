//! Default GPIO / PWM assignments for the reference wiring.
//!
//! Single source of truth for the defaults in [`crate::config`]; every
//! value can be overridden from the demo configuration file.
//!
//! Reference wiring is a 4-pin PC fan: PWM input on a hardware PWM pin,
//! open-collector tachometer on a plain GPIO with the internal pull-up.

// ---------------------------------------------------------------------------
// Fan
// ---------------------------------------------------------------------------

/// PWM chip driving the fan control input.  On a Raspberry Pi chip 0
/// channel 0 is routed to GPIO 18.
pub const FAN_PWM_CHIP: u32 = 0;
/// PWM channel on [`FAN_PWM_CHIP`].
pub const FAN_PWM_CHANNEL: u32 = 0;
/// GPIO carrying the fan PWM waveform on ESP-IDF (LEDC routes it).
pub const FAN_PWM_GPIO: u32 = 18;
/// Fan tachometer output.  Open collector, needs a pull-up.
pub const FAN_TACHO_GPIO: u32 = 23;

// ---------------------------------------------------------------------------
// Status LED
// ---------------------------------------------------------------------------

/// Single-colour status LED, active HIGH.
pub const STATUS_LED_GPIO: u32 = 17;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// 4-pin PC fans expect a 25 kHz control signal (Intel 4-wire fan PWM).
pub const FAN_PWM_FREQ_HZ: u32 = 25_000;

/// Tachometer pulses per shaft revolution.  Nearly every PC fan emits two.
pub const FAN_TACHO_PULSES_PER_REV: u32 = 2;
