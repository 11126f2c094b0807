//! Single GPIO output line.
//!
//! Opens the line lazily on the first write and closes it on `off()`.
//! Whether the line is open is always read back from the controller, so
//! the driver never disagrees with the hardware about it.
//!
//! Implements `embedded_hal::digital::OutputPin`, so anything written
//! against embedded-hal can drive it.

use std::sync::Arc;

use embedded_hal::digital::{ErrorType, OutputPin, PinState};
use log::warn;

use crate::error::{Error, Result};
use crate::ports::{GpioController, PinMode};

pub struct DigitalOutput<G: GpioController> {
    controller: Arc<G>,
    pin: u32,
}

impl<G: GpioController> DigitalOutput<G> {
    /// Does not touch the controller.
    pub fn new(controller: Arc<G>, pin: u32) -> Self {
        Self { controller, pin }
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn is_open(&self) -> bool {
        self.controller.is_pin_open(self.pin)
    }

    /// Open the line as an output if it is not open yet.
    pub fn on(&mut self) -> Result<()> {
        if !self.controller.is_pin_open(self.pin) {
            self.controller.open_pin(self.pin, PinMode::Output)?;
        }
        Ok(())
    }

    /// Open if needed, then drive `level`.
    pub fn write(&mut self, level: PinState) -> Result<()> {
        self.on()?;
        self.controller.write_pin(self.pin, level)
    }

    /// Close the line.  No-op when already closed.
    pub fn off(&mut self) -> Result<()> {
        if self.controller.is_pin_open(self.pin) {
            self.controller.close_pin(self.pin)?;
        }
        Ok(())
    }
}

impl<G: GpioController> ErrorType for DigitalOutput<G> {
    type Error = Error;
}

impl<G: GpioController> OutputPin for DigitalOutput<G> {
    fn set_low(&mut self) -> Result<()> {
        self.write(PinState::Low)
    }

    fn set_high(&mut self) -> Result<()> {
        self.write(PinState::High)
    }
}

impl<G: GpioController> Drop for DigitalOutput<G> {
    fn drop(&mut self) {
        if let Err(e) = self.off() {
            warn!("DigitalOutput[{}]: release failed: {}", self.pin, e);
        }
    }
}
