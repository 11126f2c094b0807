//! PWM fan with optional tachometer RPM sampling.
//!
//! ```text
//!   on()  ──▶ PwmOutput::on ──▶ EdgeCounter::on ──▶ spawn sampler
//!   off() ──▶ PwmOutput::off ─▶ EdgeCounter::off ─▶ cancel sampler
//!                                                     │
//!   dispose() / Drop ── join sampler within grace ◀──┘
//! ```
//!
//! The sampler thread exists iff a tachometer is configured and the fan
//! is on.  It is the only writer of the published RPM and the only reader
//! of the edge count; the owner only issues commands and polls [`rpm`].
//!
//! `off()` never blocks: the cancelled sampler is parked and joined (with
//! a bounded grace period) by the next `on()` or by disposal.
//!
//! [`rpm`]: FanController::rpm

use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;
use std::sync::Arc;

use futures_lite::future;
use log::{debug, info, warn};

use crate::adapters::time::MonotonicClock;
use crate::config::FanConfig;
use crate::drivers::pwm_output::PwmOutput;
use crate::error::{Error, Result};
use crate::pins;
use crate::ports::{Edge, GpioController, PwmController};
use crate::sensors::edge_counter::EdgeCounter;
use crate::sensors::tachometer::{RpmEstimator, Sampler};
use crate::task::{self, TaskHandle};

const SAMPLER_STACK_KB: usize = 16;
const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(1000);
const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(1000);

pub struct FanController<G: GpioController + 'static, P: PwmController> {
    pwm: PwmOutput<P>,
    tachometer: Option<EdgeCounter<G>>,
    sampler: Option<TaskHandle<()>>,
    /// Cancelled sampler not yet joined.
    retiring: Option<TaskHandle<()>>,
    rpm: Arc<AtomicU32>,
    /// RPM as of the last `off()`; what [`rpm`](Self::rpm) reports while
    /// no sampler is live.
    rpm_at_off: u32,
    clock: MonotonicClock,
    sample_period: Duration,
    cancel_grace: Duration,
    pulses_per_rev: u32,
    disposed: bool,
}

impl<G: GpioController + 'static, P: PwmController> FanController<G, P> {
    /// Wire a fan on PWM `chip:channel` with an optional tachometer on
    /// GPIO `tachometer_pin`.  Does not touch the hardware.
    ///
    /// Samples once a second, two pulses per revolution, 1 s teardown
    /// grace.  Use [`from_config`](Self::from_config) to change those.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gpio: Arc<G>,
        pwm: Arc<P>,
        chip: u32,
        channel: u32,
        frequency_hz: u32,
        tachometer_pin: Option<u32>,
        initial_duty: u8,
    ) -> Result<Self> {
        Ok(Self {
            pwm: PwmOutput::new(pwm, chip, channel, frequency_hz, initial_duty)?,
            tachometer: tachometer_pin.map(|pin| EdgeCounter::new(gpio, pin, Edge::Rising)),
            sampler: None,
            retiring: None,
            rpm: Arc::new(AtomicU32::new(0)),
            rpm_at_off: 0,
            clock: MonotonicClock::new(),
            sample_period: DEFAULT_SAMPLE_PERIOD,
            cancel_grace: DEFAULT_CANCEL_GRACE,
            pulses_per_rev: pins::FAN_TACHO_PULSES_PER_REV,
            disposed: false,
        })
    }

    pub fn from_config(gpio: Arc<G>, pwm: Arc<P>, config: &FanConfig) -> Result<Self> {
        config.validate()?;
        let mut fan = Self::new(
            gpio,
            pwm,
            config.pwm_chip,
            config.pwm_channel,
            config.frequency_hz,
            config.tachometer_pin,
            config.initial_duty_percent,
        )?;
        fan.sample_period = config.sample_period();
        fan.cancel_grace = config.cancel_grace();
        fan.pulses_per_rev = config.pulses_per_revolution;
        Ok(fan)
    }

    /// Last computed RPM.  0 before the first window closes and without a
    /// tachometer.
    pub fn rpm(&self) -> u32 {
        if self.sampler.is_some() {
            self.rpm.load(Ordering::Acquire)
        } else {
            self.rpm_at_off
        }
    }

    pub fn duty_cycle(&self) -> u8 {
        self.pwm.duty_cycle()
    }

    pub fn frequency_hz(&self) -> u32 {
        self.pwm.frequency_hz()
    }

    pub fn is_on(&self) -> bool {
        self.pwm.is_on()
    }

    pub fn has_tachometer(&self) -> bool {
        self.tachometer.is_some()
    }

    /// Whether a sampler thread is live.
    pub fn is_sampling(&self) -> bool {
        self.sampler.as_ref().is_some_and(|s| !s.is_finished())
    }

    /// Start the fan, then the tachometer sampler.  Idempotent.
    pub fn on(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.pwm.on()?;

        if self.sampler.is_some() {
            return Ok(());
        }
        let Some(tachometer) = self.tachometer.as_mut() else {
            info!("Fan on ({}%, no tachometer)", self.pwm.duty_cycle());
            return Ok(());
        };

        if let Some(stale) = self.retiring.take() {
            debug!("Fan: joining previous sampler");
            stale.join_within(self.cancel_grace);
        }

        // first window opens before the counter can see an edge
        let window_start = self.clock.uptime_ms();
        self.rpm.store(0, Ordering::Release);
        tachometer.on()?;
        let sampler = Sampler {
            pulses: tachometer.pulses(),
            rpm: Arc::clone(&self.rpm),
            estimator: RpmEstimator::new(self.pulses_per_rev, window_start),
            clock: self.clock,
            period: self.sample_period,
        };
        let spawned = task::spawn("fan-tacho", SAMPLER_STACK_KB, move |cancel| {
            future::block_on(sampler.run(&cancel));
        });
        match spawned {
            Ok(handle) => self.sampler = Some(handle),
            Err(e) => {
                if let Err(e) = tachometer.off() {
                    warn!("Fan: tachometer release after failed spawn: {}", e);
                }
                return Err(e);
            }
        }

        info!(
            "Fan on ({}%, sampling every {:?})",
            self.pwm.duty_cycle(),
            self.sample_period
        );
        Ok(())
    }

    /// Stop the fan, stop counting, then ask the sampler to exit.
    /// Idempotent and non-blocking.
    pub fn off(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.stop()
    }

    /// Set the duty cycle (0-100).  Applied immediately when on, at the
    /// next `on()` otherwise.  Out-of-range values leave the duty unchanged.
    pub fn set_speed(&mut self, duty: i32) -> Result<()> {
        self.ensure_live()?;
        self.pwm.change_duty_cycle(duty)?;
        debug!("Fan speed {}%", duty);
        Ok(())
    }

    /// Stop everything and release the hardware.  Best effort: failures
    /// are logged, never returned.  Later calls return
    /// [`Error::AlreadyDisposed`].
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if let Err(e) = self.stop() {
            warn!("Fan: stop during dispose failed: {}", e);
        }
        if let Err(e) = self.pwm.close() {
            warn!("Fan: PWM release failed: {}", e);
        }
        // EdgeCounter's Drop unregisters and closes.
        self.tachometer = None;

        for handle in [self.sampler.take(), self.retiring.take()].into_iter().flatten() {
            handle.cancel();
            if handle.join_within(self.cancel_grace).is_none() {
                warn!("Fan: sampler did not exit within {:?}", self.cancel_grace);
            }
        }
        info!("Fan disposed");
    }

    fn stop(&mut self) -> Result<()> {
        let pwm = self.pwm.off();
        let tachometer = match self.tachometer.as_mut() {
            Some(t) => t.off(),
            None => Ok(()),
        };
        if let Some(sampler) = self.sampler.take() {
            sampler.cancel();
            // a publish racing the cancel lands after this snapshot and is ignored
            self.rpm_at_off = self.rpm.load(Ordering::Acquire);
            // on() always joins the previous retiree before spawning
            if let Some(orphan) = self.retiring.replace(sampler) {
                orphan.cancel();
            }
            info!("Fan off");
        }
        pwm.and(tachometer)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            Err(Error::AlreadyDisposed)
        } else {
            Ok(())
        }
    }
}

impl<G: GpioController + 'static, P: PwmController> Drop for FanController<G, P> {
    fn drop(&mut self) {
        self.dispose();
    }
}
