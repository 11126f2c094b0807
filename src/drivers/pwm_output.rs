//! PWM output channel.
//!
//! Tracks the configured frequency and duty (0-100%) and whether the
//! channel is open and generating.  Duty writes are validated before they
//! reach the controller; a rejected write leaves the previous duty intact.
//!
//! `is_on ⇒ is_open` holds at every return point.

use std::sync::Arc;

use embedded_hal::pwm::{ErrorType, SetDutyCycle};
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::ports::PwmController;

const MAX_DUTY: u8 = 100;

pub struct PwmOutput<P: PwmController> {
    controller: Arc<P>,
    chip: u32,
    channel: u32,
    frequency_hz: u32,
    duty: u8,
    is_open: bool,
    is_on: bool,
}

impl<P: PwmController> PwmOutput<P> {
    /// Describe a channel.  Does not touch the controller.
    pub fn new(controller: Arc<P>, chip: u32, channel: u32, frequency_hz: u32, duty: u8) -> Result<Self> {
        if frequency_hz == 0 {
            return Err(Error::InvalidArgument("frequency_hz must be > 0"));
        }
        Ok(Self {
            controller,
            chip,
            channel,
            frequency_hz,
            duty: validate_duty(i32::from(duty))?,
            is_open: false,
            is_on: false,
        })
    }

    pub fn chip(&self) -> u32 {
        self.chip
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }

    pub fn duty_cycle(&self) -> u8 {
        self.duty
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn open(&mut self) -> Result<()> {
        if !self.is_open {
            self.controller.open_channel(self.chip, self.channel)?;
            self.is_open = true;
        }
        Ok(())
    }

    /// Stop if generating, then release the channel.
    pub fn close(&mut self) -> Result<()> {
        self.off()?;
        if self.is_open {
            self.controller.close_channel(self.chip, self.channel)?;
            self.is_open = false;
        }
        Ok(())
    }

    /// Open if needed and start generating at the stored duty.
    pub fn on(&mut self) -> Result<()> {
        if self.is_on {
            return Ok(());
        }
        self.open()?;
        self.controller
            .start_writing(self.chip, self.channel, self.frequency_hz, self.duty)?;
        self.is_on = true;
        debug!(
            "PWM {}:{}: on at {} Hz, {}%",
            self.chip, self.channel, self.frequency_hz, self.duty
        );
        Ok(())
    }

    /// Set the duty, then `on()`.
    pub fn on_with(&mut self, duty: i32) -> Result<()> {
        self.change_duty_cycle(duty)?;
        self.on()
    }

    /// Stop generating.  The channel stays open.
    pub fn off(&mut self) -> Result<()> {
        if self.is_on {
            self.controller.stop_writing(self.chip, self.channel)?;
            self.is_on = false;
            debug!("PWM {}:{}: off", self.chip, self.channel);
        }
        Ok(())
    }

    /// Validate and store `duty`; push it to the live waveform when on.
    pub fn change_duty_cycle(&mut self, duty: i32) -> Result<()> {
        let duty = validate_duty(duty)?;
        if self.is_on {
            self.controller.change_duty_cycle(self.chip, self.channel, duty)?;
        }
        self.duty = duty;
        Ok(())
    }

    /// Change the frequency; restarts generation when on.
    pub fn set_frequency(&mut self, frequency_hz: u32) -> Result<()> {
        if frequency_hz == 0 {
            return Err(Error::InvalidArgument("frequency_hz must be > 0"));
        }
        if self.is_on {
            self.controller
                .start_writing(self.chip, self.channel, frequency_hz, self.duty)?;
        }
        self.frequency_hz = frequency_hz;
        Ok(())
    }
}

fn validate_duty(duty: i32) -> Result<u8> {
    u8::try_from(duty)
        .ok()
        .filter(|d| *d <= MAX_DUTY)
        .ok_or(Error::InvalidArgument("duty cycle must be in 0..=100"))
}

impl<P: PwmController> ErrorType for PwmOutput<P> {
    type Error = Error;
}

impl<P: PwmController> SetDutyCycle for PwmOutput<P> {
    fn max_duty_cycle(&self) -> u16 {
        u16::from(MAX_DUTY)
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<()> {
        self.change_duty_cycle(i32::from(duty))
    }
}

impl<P: PwmController> Drop for PwmOutput<P> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("PWM {}:{}: release failed: {}", self.chip, self.channel, e);
        }
    }
}
