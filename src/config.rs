//! Runtime configuration.
//!
//! All tunable parameters for the fan and the status LED.  Values default
//! to the reference wiring in [`crate::pins`] and can be overridden by a
//! JSON file handed to the demo binary.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pins;

/// Fan + tachometer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanConfig {
    // --- PWM ---
    /// PWM chip number.
    pub pwm_chip: u32,
    /// PWM channel number on `pwm_chip`.
    pub pwm_channel: u32,
    /// PWM frequency in Hz.
    pub frequency_hz: u32,
    /// Duty cycle (0-100%) used on the first `on()`.
    pub initial_duty_percent: u8,

    // --- Tachometer ---
    /// GPIO the tachometer is wired to; `None` disables RPM sampling.
    pub tachometer_pin: Option<u32>,
    /// Tachometer edges per shaft revolution.
    pub pulses_per_revolution: u32,
    /// RPM sample window (milliseconds).
    pub sample_period_ms: u32,
    /// How long teardown waits for the sampler to exit (milliseconds).
    pub cancel_grace_ms: u32,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            pwm_chip: pins::FAN_PWM_CHIP,
            pwm_channel: pins::FAN_PWM_CHANNEL,
            frequency_hz: pins::FAN_PWM_FREQ_HZ,
            initial_duty_percent: 100,

            tachometer_pin: Some(pins::FAN_TACHO_GPIO),
            pulses_per_revolution: pins::FAN_TACHO_PULSES_PER_REV,
            sample_period_ms: 1000, // 1 Hz
            cancel_grace_ms: 1000,
        }
    }
}

impl FanConfig {
    /// Reject values the fan controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.frequency_hz == 0 {
            return Err(Error::InvalidArgument("frequency_hz must be > 0"));
        }
        if self.initial_duty_percent > 100 {
            return Err(Error::InvalidArgument("initial_duty_percent must be in 0..=100"));
        }
        if self.pulses_per_revolution == 0 {
            return Err(Error::InvalidArgument("pulses_per_revolution must be > 0"));
        }
        if self.sample_period_ms == 0 {
            return Err(Error::InvalidArgument("sample_period_ms must be > 0"));
        }
        Ok(())
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(u64::from(self.sample_period_ms))
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(u64::from(self.cancel_grace_ms))
    }
}

/// Status LED configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    /// GPIO the LED is wired to.
    pub pin: u32,
    /// Half-period of the warning blink (milliseconds).
    pub warning_interval_ms: u32,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            pin: pins::STATUS_LED_GPIO,
            warning_interval_ms: 500,
        }
    }
}

/// Configuration of the demo sweep binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub fan: FanConfig,
    pub led: LedConfig,
    /// Wait after `on()` before the sweep starts (milliseconds).
    pub spin_up_ms: u32,
    /// Duty-cycle decrement per sweep step (percent).
    pub sweep_step_percent: u8,
    /// Time spent at each sweep step (milliseconds).
    pub sweep_dwell_ms: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            fan: FanConfig::default(),
            led: LedConfig::default(),
            spin_up_ms: 2000,
            sweep_step_percent: 10,
            sweep_dwell_ms: 2000,
        }
    }
}

impl DemoConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|_| Error::InvalidArgument("malformed configuration JSON"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.fan.validate()?;
        if self.sweep_step_percent == 0 || self.sweep_step_percent > 100 {
            return Err(Error::InvalidArgument("sweep_step_percent must be in 1..=100"));
        }
        Ok(())
    }
}
