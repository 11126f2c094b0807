//! Single-colour status LED.
//!
//! Composition of a [`DigitalOutput`] and a [`FlashSequencer`] with two
//! presets:
//!
//! | Preset  | Pattern                                         |
//! |---------|-------------------------------------------------|
//! | warning | on/off at a fixed interval (500 ms by default)  |
//! | error   | three 500 ms flashes, then a 2 s pause          |
//!
//! Patterns run on a background thread; the LED takes the sequencer back
//! when the pattern is stopped.

use core::time::Duration;
use std::sync::Arc;

use log::{info, warn};

use crate::config::LedConfig;
use crate::drivers::digital_output::DigitalOutput;
use crate::drivers::flash::{FlashPattern, FlashSequencer, FlashTask};
use crate::error::{Error, Result};
use crate::ports::GpioController;
use crate::task::CancelToken;

const ON: Duration = Duration::from_millis(500);
const OFF: Duration = Duration::from_millis(500);
const PAUSE: Duration = Duration::from_millis(2000);

/// How long `stop()` waits for the flash thread.
const STOP_GRACE: Duration = Duration::from_secs(1);

enum Mode<G: GpioController> {
    Idle(FlashSequencer<G>),
    Flashing(FlashTask<G>),
}

pub struct LedLight<G: GpioController + 'static> {
    pin: u32,
    warning_interval: Duration,
    // None once a flash thread failed to hand the sequencer back.
    mode: Option<Mode<G>>,
}

impl<G: GpioController + 'static> LedLight<G> {
    pub fn new(gpio: Arc<G>, pin: u32) -> Self {
        Self::with_warning_interval(gpio, pin, ON)
    }

    pub fn from_config(gpio: Arc<G>, config: &LedConfig) -> Self {
        Self::with_warning_interval(
            gpio,
            config.pin,
            Duration::from_millis(u64::from(config.warning_interval_ms)),
        )
    }

    fn with_warning_interval(gpio: Arc<G>, pin: u32, warning_interval: Duration) -> Self {
        let sequencer = FlashSequencer::new(DigitalOutput::new(gpio, pin));
        Self {
            pin,
            warning_interval,
            mode: Some(Mode::Idle(sequencer)),
        }
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn is_flashing(&self) -> bool {
        matches!(&self.mode, Some(Mode::Flashing(task)) if !task.is_finished())
    }

    /// Repeating on/off at the configured warning interval.
    pub fn warning_pattern(&self) -> FlashPattern {
        FlashPattern::Repeating(self.warning_interval)
    }

    /// Three flashes, then a pause.
    pub fn error_pattern() -> Result<FlashPattern> {
        FlashPattern::sequence(&[ON, OFF, ON, OFF, ON, PAUSE])
    }

    /// Flash the warning preset inline until `cancel` fires.
    pub async fn warning(&mut self, cancel: &CancelToken) -> Result<()> {
        let pattern = self.warning_pattern();
        self.idle_sequencer()?.flash(&pattern, cancel).await
    }

    /// Flash the error preset inline until `cancel` fires.
    pub async fn error(&mut self, cancel: &CancelToken) -> Result<()> {
        let pattern = Self::error_pattern()?;
        self.idle_sequencer()?.flash(&pattern, cancel).await
    }

    /// Run the warning preset in the background.
    pub fn start_warning(&mut self) -> Result<()> {
        let pattern = self.warning_pattern();
        self.start(pattern)
    }

    /// Run the error preset in the background.
    pub fn start_error(&mut self) -> Result<()> {
        self.start(Self::error_pattern()?)
    }

    /// Run `pattern` in the background, replacing any running pattern.
    pub fn start(&mut self, pattern: FlashPattern) -> Result<()> {
        self.stop()?;
        match self.mode.take() {
            Some(Mode::Idle(sequencer)) => {
                self.mode = Some(Mode::Flashing(sequencer.spawn(pattern)?));
                Ok(())
            }
            other => {
                self.mode = other;
                Err(Error::AlreadyDisposed)
            }
        }
    }

    /// Stop a background pattern and leave the LED dark.  No-op when idle.
    pub fn stop(&mut self) -> Result<()> {
        match self.mode.take() {
            Some(Mode::Flashing(task)) => match task.stop(STOP_GRACE) {
                Some(sequencer) => {
                    self.mode = Some(Mode::Idle(sequencer));
                    Ok(())
                }
                None => {
                    warn!("LED[{}]: flash thread did not stop, LED abandoned", self.pin);
                    Err(Error::AlreadyDisposed)
                }
            },
            other => {
                self.mode = other;
                Ok(())
            }
        }
    }

    fn idle_sequencer(&mut self) -> Result<&mut FlashSequencer<G>> {
        self.stop()?;
        match &mut self.mode {
            Some(Mode::Idle(sequencer)) => Ok(sequencer),
            _ => Err(Error::AlreadyDisposed),
        }
    }
}

impl<G: GpioController + 'static> Drop for LedLight<G> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("LED[{}]: release failed: {}", self.pin, e);
        } else {
            info!("LED[{}]: released", self.pin);
        }
    }
}
