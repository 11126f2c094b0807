//! Timed high/low sequencing of a digital output.
//!
//! A [`FlashSequencer`] owns one [`DigitalOutput`] and walks it through a
//! [`FlashPattern`] until cancelled:
//!
//! ```text
//!   ┌──▶ high ── wait(on) ── low ── wait(off) ──┐
//!   └───────────────────────────────────────────┘   cancel → off()
//! ```
//!
//! Cancellation is checked after every wait and also cuts a wait short, so
//! the output goes dark within one interval of the request.  Flashing can
//! run inline (`flash().await`) or on its own thread via
//! [`FlashSequencer::spawn`].

use core::time::Duration;

use embedded_hal::digital::OutputPin;
use futures_lite::future;
use heapless::Vec;
use log::{debug, info, warn};

use crate::drivers::digital_output::DigitalOutput;
use crate::error::{Error, Result};
use crate::ports::GpioController;
use crate::task::{self, CancelToken, TaskHandle};

/// Longest on/off sequence a pattern can hold.
pub const MAX_SEQUENCE_STEPS: usize = 16;

const FLASH_TASK_STACK_KB: usize = 16;

/// What to flash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashPattern {
    /// Equal on and off time.
    Repeating(Duration),
    /// Asymmetric on/off time.
    OnOff { on: Duration, off: Duration },
    /// Alternating on, off, on, off, ... durations, cycled.
    Sequence(Vec<Duration, MAX_SEQUENCE_STEPS>),
}

impl FlashPattern {
    /// Build a [`FlashPattern::Sequence`].  `steps` must be non-empty, of
    /// even length, and at most [`MAX_SEQUENCE_STEPS`] long.
    pub fn sequence(steps: &[Duration]) -> Result<Self> {
        if steps.is_empty() || steps.len() % 2 != 0 {
            return Err(Error::InvalidArgument(
                "flash sequence needs an even, non-zero number of steps",
            ));
        }
        let steps = Vec::from_slice(steps).map_err(|()| Error::InvalidArgument("flash sequence too long"))?;
        Ok(Self::Sequence(steps))
    }

    /// Number of (on, off) pairs in one cycle.
    fn pairs(&self) -> usize {
        match self {
            Self::Repeating(_) | Self::OnOff { .. } => 1,
            Self::Sequence(steps) => (steps.len() / 2).max(1),
        }
    }

    /// The `index`-th (on, off) pair, wrapping.
    fn pair(&self, index: usize) -> (Duration, Duration) {
        match self {
            Self::Repeating(interval) => (*interval, *interval),
            Self::OnOff { on, off } => (*on, *off),
            Self::Sequence(steps) => {
                let i = (index % self.pairs()) * 2;
                let on = steps.get(i).copied().unwrap_or_default();
                let off = steps.get(i + 1).copied().unwrap_or_default();
                (on, off)
            }
        }
    }
}

pub struct FlashSequencer<G: GpioController> {
    output: DigitalOutput<G>,
}

impl<G: GpioController> FlashSequencer<G> {
    pub fn new(output: DigitalOutput<G>) -> Self {
        Self { output }
    }

    pub fn output(&self) -> &DigitalOutput<G> {
        &self.output
    }

    pub fn into_inner(self) -> DigitalOutput<G> {
        self.output
    }

    /// Flash `pattern` until `cancel` fires, then turn the output off.
    ///
    /// A write failure ends the loop early; the output is still released
    /// and the failure is returned.
    pub async fn flash(&mut self, pattern: &FlashPattern, cancel: &CancelToken) -> Result<()> {
        let pin = self.output.pin();
        info!("LED[{}]: flashing {:?}", pin, pattern);

        let outcome = self.run(pattern, cancel).await;
        let released = self.output.off();

        match &outcome {
            Ok(()) => info!("LED[{}]: flash cancelled", pin),
            Err(e) => warn!("LED[{}]: flash aborted: {}", pin, e),
        }
        outcome.and(released)
    }

    async fn run(&mut self, pattern: &FlashPattern, cancel: &CancelToken) -> Result<()> {
        let mut step = 0usize;
        while !cancel.is_cancelled() {
            let (on, off) = pattern.pair(step);
            step = (step + 1) % pattern.pairs();

            self.output.set_high()?;
            if !cancel.sleep(on).await {
                break;
            }
            self.output.set_low()?;
            if !cancel.sleep(off).await {
                break;
            }
        }
        Ok(())
    }
}

impl<G: GpioController + 'static> FlashSequencer<G> {
    /// Run [`flash`](Self::flash) on a background thread.
    pub fn spawn(self, pattern: FlashPattern) -> Result<FlashTask<G>> {
        let mut sequencer = self;
        let task = task::spawn("led-flash", FLASH_TASK_STACK_KB, move |cancel| {
            let outcome = future::block_on(sequencer.flash(&pattern, &cancel));
            (sequencer, outcome)
        })?;
        Ok(FlashTask { task })
    }
}

/// Handle to a flash pattern running in the background.
pub struct FlashTask<G: GpioController> {
    task: TaskHandle<(FlashSequencer<G>, Result<()>)>,
}

impl<G: GpioController> FlashTask<G> {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the pattern and wait up to `grace` for the output to be
    /// released.  Returns the sequencer for reuse, or `None` if the task
    /// overran `grace`.
    pub fn stop(self, grace: Duration) -> Option<FlashSequencer<G>> {
        self.task.cancel();
        let (sequencer, outcome) = self.task.join_within(grace)?;
        if let Err(e) = outcome {
            debug!("LED[{}]: flash ended with {}", sequencer.output.pin(), e);
        }
        Some(sequencer)
    }
}
