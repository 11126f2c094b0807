//! ESP-IDF controllers: GPIO over the `gpio_*` driver, PWM over LEDC.
//!
//! Raw `esp_idf_svc::sys` calls throughout.  Every call's `esp_err_t` is
//! checked and turned into a [`HardwareFault`] naming the pin or channel.
//!
//! ## Edge notifications
//!
//! The GPIO ISR only bumps two per-pin atomics (rising / falling, decided
//! by the level read in the ISR).  A dispatcher thread drains them every
//! [`DISPATCH_PERIOD`] and invokes the registered callbacks in task
//! context, so callbacks never run inside the interrupt.
//!
//! ```text
//!   GPIO ISR ──fetch_add──▶ EdgeTally ◀──swap(0)── "gpio-edges" ──▶ callbacks
//! ```

use core::ffi::c_void;
use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::digital::PinState;
use esp_idf_svc::sys::*;
use futures_lite::future;
use log::{info, warn};

use crate::error::{HardwareFault, Resource, Result};
use crate::ports::{CallbackId, Edge, EdgeCallback, GpioController, PinMode, PwmController};
use crate::task::{self, TaskHandle};

const DISPATCH_PERIOD: Duration = Duration::from_millis(2);
const DISPATCH_STACK_KB: usize = 8;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn check(rc: esp_err_t, resource: Resource, op: &'static str) -> Result<()> {
    if rc == ESP_OK as esp_err_t {
        Ok(())
    } else {
        Err(HardwareFault::new(resource, op, rc).into())
    }
}

// ───────────────────────────────────────────────────────────────
// GPIO
// ───────────────────────────────────────────────────────────────

/// ISR argument.  Boxed so its address is stable while the handler is
/// installed.
struct EdgeTally {
    pin: i32,
    rising: AtomicU32,
    falling: AtomicU32,
}

unsafe extern "C" fn edge_isr(arg: *mut c_void) {
    // SAFETY: `arg` is the Box<EdgeTally> registered in `arm_isr`; the
    // handler is removed before the box is dropped.
    let tally = unsafe { &*(arg as *const EdgeTally) };
    // SAFETY: register read; ISR-safe.
    if unsafe { gpio_get_level(tally.pin) } != 0 {
        tally.rising.fetch_add(1, Ordering::Relaxed);
    } else {
        tally.falling.fetch_add(1, Ordering::Relaxed);
    }
}

struct Subscription {
    id: CallbackId,
    edge: Edge,
    callback: Arc<EdgeCallback>,
}

struct OpenPin {
    mode: PinMode,
    tally: Option<Box<EdgeTally>>,
    subscriptions: Vec<Subscription>,
}

#[derive(Default)]
struct Shared {
    pins: Mutex<HashMap<u32, OpenPin>>,
}

impl Shared {
    /// Drain every pin's tally and run the matching callbacks.
    fn dispatch(&self) {
        let mut due: Vec<(Arc<EdgeCallback>, Edge, u32)> = Vec::new();
        for pin in lock(&self.pins).values() {
            let Some(tally) = pin.tally.as_ref() else { continue };
            for (seen, count) in [
                (Edge::Rising, tally.rising.swap(0, Ordering::AcqRel)),
                (Edge::Falling, tally.falling.swap(0, Ordering::AcqRel)),
            ] {
                if count == 0 {
                    continue;
                }
                for sub in pin.subscriptions.iter().filter(|s| s.edge.matches(seen)) {
                    due.push((Arc::clone(&sub.callback), seen, count));
                }
            }
        }
        for (callback, seen, count) in due {
            for _ in 0..count {
                callback(seen);
            }
        }
    }
}

/// GPIO controller over the ESP-IDF GPIO driver.
pub struct EspGpio {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<TaskHandle<()>>>,
    next_id: AtomicU32,
}

impl EspGpio {
    /// Installs the per-pin GPIO ISR service (already installed is fine).
    pub fn new() -> Result<Self> {
        // SAFETY: plain driver call; ESP_ERR_INVALID_STATE means installed.
        let rc = unsafe { gpio_install_isr_service(0) };
        if rc != ESP_ERR_INVALID_STATE as esp_err_t {
            check(rc, Resource::Task, "gpio_install_isr_service")?;
        }
        Ok(Self {
            shared: Arc::new(Shared::default()),
            dispatcher: Mutex::new(None),
            next_id: AtomicU32::new(0),
        })
    }

    fn ensure_dispatcher(&self) -> Result<()> {
        let mut dispatcher = lock(&self.dispatcher);
        if dispatcher.is_none() {
            let shared = Arc::clone(&self.shared);
            *dispatcher = Some(task::spawn("gpio-edges", DISPATCH_STACK_KB, move |cancel| {
                while future::block_on(cancel.sleep(DISPATCH_PERIOD)) {
                    shared.dispatch();
                }
            })?);
            info!("EspGpio: edge dispatcher started");
        }
        Ok(())
    }

    fn arm_isr(pin: u32, open: &mut OpenPin) -> Result<()> {
        if open.tally.is_some() {
            return Ok(());
        }
        let tally = Box::new(EdgeTally {
            pin: pin as i32,
            rising: AtomicU32::new(0),
            falling: AtomicU32::new(0),
        });
        let arg = (&*tally as *const EdgeTally).cast_mut().cast::<c_void>();
        // SAFETY: pin is open as an input; `tally` outlives the handler
        // (see `disarm_isr`).
        unsafe {
            check(
                gpio_set_intr_type(pin as i32, gpio_int_type_t_GPIO_INTR_ANYEDGE),
                Resource::Pin(pin),
                "gpio_set_intr_type",
            )?;
            check(
                gpio_isr_handler_add(pin as i32, Some(edge_isr), arg),
                Resource::Pin(pin),
                "gpio_isr_handler_add",
            )?;
            check(gpio_intr_enable(pin as i32), Resource::Pin(pin), "gpio_intr_enable")?;
        }
        open.tally = Some(tally);
        Ok(())
    }

    fn disarm_isr(pin: u32, open: &mut OpenPin) -> Result<()> {
        if open.tally.is_none() {
            return Ok(());
        }
        // SAFETY: removing our own handler; afterwards the ISR can no
        // longer observe the tally.
        unsafe {
            check(gpio_intr_disable(pin as i32), Resource::Pin(pin), "gpio_intr_disable")?;
            check(gpio_isr_handler_remove(pin as i32), Resource::Pin(pin), "gpio_isr_handler_remove")?;
        }
        open.tally = None;
        Ok(())
    }
}

impl Drop for EspGpio {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.dispatcher).take() {
            handle.cancel();
            let _ = handle.join_within(Duration::from_millis(100));
        }
        let mut pins = lock(&self.shared.pins);
        for (pin, open) in pins.iter_mut() {
            if let Err(e) = Self::disarm_isr(*pin, open) {
                warn!("EspGpio: {}", e);
            }
        }
    }
}

impl GpioController for EspGpio {
    fn open_pin(&self, pin: u32, mode: PinMode) -> Result<()> {
        let mut pins = lock(&self.shared.pins);
        if pins.contains_key(&pin) {
            return Err(HardwareFault::new(Resource::Pin(pin), "open_pin", ESP_ERR_INVALID_STATE as esp_err_t).into());
        }
        let (gpio_mode, pull_up, pull_down) = match mode {
            PinMode::Output => (gpio_mode_t_GPIO_MODE_OUTPUT, false, false),
            PinMode::Input => (gpio_mode_t_GPIO_MODE_INPUT, false, false),
            PinMode::InputPullUp => (gpio_mode_t_GPIO_MODE_INPUT, true, false),
            PinMode::InputPullDown => (gpio_mode_t_GPIO_MODE_INPUT, false, true),
        };
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode,
            pull_up_en: if pull_up {
                gpio_pullup_t_GPIO_PULLUP_ENABLE
            } else {
                gpio_pullup_t_GPIO_PULLUP_DISABLE
            },
            pull_down_en: if pull_down {
                gpio_pulldown_t_GPIO_PULLDOWN_ENABLE
            } else {
                gpio_pulldown_t_GPIO_PULLDOWN_DISABLE
            },
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
            ..Default::default()
        };
        // SAFETY: configures a single pin; serialised by the pins lock.
        check(unsafe { gpio_config(&cfg) }, Resource::Pin(pin), "gpio_config")?;
        if mode == PinMode::Output {
            // SAFETY: pin was just configured as an output.
            check(unsafe { gpio_set_level(pin as i32, 0) }, Resource::Pin(pin), "gpio_set_level")?;
        }
        pins.insert(
            pin,
            OpenPin {
                mode,
                tally: None,
                subscriptions: Vec::new(),
            },
        );
        Ok(())
    }

    fn close_pin(&self, pin: u32) -> Result<()> {
        let mut pins = lock(&self.shared.pins);
        let Some(open) = pins.get_mut(&pin) else {
            return Err(HardwareFault::new(Resource::Pin(pin), "close_pin", ESP_ERR_INVALID_STATE as esp_err_t).into());
        };
        Self::disarm_isr(pin, open)?;
        pins.remove(&pin);
        // SAFETY: returns the pin to its reset state; no handler installed.
        check(unsafe { gpio_reset_pin(pin as i32) }, Resource::Pin(pin), "gpio_reset_pin")
    }

    fn is_pin_open(&self, pin: u32) -> bool {
        lock(&self.shared.pins).contains_key(&pin)
    }

    fn write_pin(&self, pin: u32, level: PinState) -> Result<()> {
        match lock(&self.shared.pins).get(&pin) {
            Some(open) if open.mode == PinMode::Output => {}
            _ => return Err(HardwareFault::new(Resource::Pin(pin), "write_pin", ESP_ERR_INVALID_STATE as esp_err_t).into()),
        }
        let high = u32::from(level == PinState::High);
        // SAFETY: pin is open as an output.
        check(unsafe { gpio_set_level(pin as i32, high) }, Resource::Pin(pin), "gpio_set_level")
    }

    fn register_edge_callback(&self, pin: u32, edge: Edge, callback: EdgeCallback) -> Result<CallbackId> {
        self.ensure_dispatcher()?;
        let mut pins = lock(&self.shared.pins);
        let Some(open) = pins.get_mut(&pin) else {
            return Err(HardwareFault::new(Resource::Pin(pin), "register_edge_callback", ESP_ERR_INVALID_STATE as esp_err_t).into());
        };
        Self::arm_isr(pin, open)?;
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        open.subscriptions.push(Subscription {
            id,
            edge,
            callback: Arc::new(callback),
        });
        Ok(id)
    }

    fn unregister_edge_callback(&self, pin: u32, id: CallbackId) -> Result<()> {
        let mut pins = lock(&self.shared.pins);
        if let Some(open) = pins.get_mut(&pin) {
            open.subscriptions.retain(|s| s.id != id);
            if open.subscriptions.is_empty() {
                Self::disarm_isr(pin, open)?;
            }
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// PWM (LEDC)
// ───────────────────────────────────────────────────────────────

const LEDC_DUTY_BITS: u32 = 8;
const LEDC_DUTY_MAX: u32 = (1 << LEDC_DUTY_BITS) - 1;

fn ledc_duty(percent: u8) -> u32 {
    u32::from(percent) * LEDC_DUTY_MAX / 100
}

#[derive(Debug, Clone, Copy)]
struct LedcChannel {
    gpio: u32,
    open: bool,
    writing: bool,
}

/// PWM controller over the LEDC peripheral.
///
/// `chip` selects the speed mode (0 = low speed); each channel gets the
/// LEDC timer `channel % 4` and must be routed to a GPIO up front.
pub struct EspLedc {
    channels: Mutex<HashMap<(u32, u32), LedcChannel>>,
}

impl EspLedc {
    /// `routes` maps `(chip, channel)` to the GPIO carrying its waveform.
    pub fn new(routes: &[((u32, u32), u32)]) -> Self {
        let channels = routes
            .iter()
            .map(|&(key, gpio)| {
                (
                    key,
                    LedcChannel {
                        gpio,
                        open: false,
                        writing: false,
                    },
                )
            })
            .collect();
        Self {
            channels: Mutex::new(channels),
        }
    }

    fn with_channel<R>(
        &self,
        chip: u32,
        channel: u32,
        op: &'static str,
        f: impl FnOnce(&mut LedcChannel) -> Result<R>,
    ) -> Result<R> {
        let mut channels = lock(&self.channels);
        match channels.get_mut(&(chip, channel)) {
            Some(ch) => f(ch),
            None => Err(HardwareFault::new(Resource::PwmChannel { chip, channel }, op, ESP_ERR_NOT_FOUND as esp_err_t).into()),
        }
    }
}

fn speed_mode(chip: u32) -> ledc_mode_t {
    if chip == 0 {
        ledc_mode_t_LEDC_LOW_SPEED_MODE
    } else {
        chip
    }
}

fn timer_for(channel: u32) -> ledc_timer_t {
    ledc_timer_t_LEDC_TIMER_0 + channel % 4
}

impl PwmController for EspLedc {
    fn open_channel(&self, chip: u32, channel: u32) -> Result<()> {
        self.with_channel(chip, channel, "open_channel", |ch| {
            if ch.open {
                return Err(HardwareFault::new(
                    Resource::PwmChannel { chip, channel },
                    "open_channel",
                    ESP_ERR_INVALID_STATE as esp_err_t,
                )
                .into());
            }
            ch.open = true;
            Ok(())
        })
    }

    fn close_channel(&self, chip: u32, channel: u32) -> Result<()> {
        self.with_channel(chip, channel, "close_channel", |ch| {
            let resource = Resource::PwmChannel { chip, channel };
            if !ch.open {
                return Err(HardwareFault::new(resource, "close_channel", ESP_ERR_INVALID_STATE as esp_err_t).into());
            }
            if ch.writing {
                // SAFETY: channel was configured by start_writing.
                check(unsafe { ledc_stop(speed_mode(chip), channel, 0) }, resource, "ledc_stop")?;
                ch.writing = false;
            }
            // SAFETY: releases the routed pin back to GPIO reset state.
            check(unsafe { gpio_reset_pin(ch.gpio as i32) }, resource, "gpio_reset_pin")?;
            ch.open = false;
            Ok(())
        })
    }

    fn start_writing(&self, chip: u32, channel: u32, frequency_hz: u32, duty_percent: u8) -> Result<()> {
        self.with_channel(chip, channel, "start_writing", |ch| {
            let resource = Resource::PwmChannel { chip, channel };
            if !ch.open {
                return Err(HardwareFault::new(resource, "start_writing", ESP_ERR_INVALID_STATE as esp_err_t).into());
            }
            let timer = ledc_timer_config_t {
                speed_mode: speed_mode(chip),
                timer_num: timer_for(channel),
                duty_resolution: ledc_timer_bit_t_LEDC_TIMER_8_BIT,
                freq_hz: frequency_hz,
                clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
                ..Default::default()
            };
            let config = ledc_channel_config_t {
                speed_mode: speed_mode(chip),
                channel,
                timer_sel: timer_for(channel),
                gpio_num: ch.gpio as i32,
                duty: ledc_duty(duty_percent),
                hpoint: 0,
                ..Default::default()
            };
            // SAFETY: configs are fully initialised; serialised by the lock.
            unsafe {
                check(ledc_timer_config(&timer), resource, "ledc_timer_config")?;
                check(ledc_channel_config(&config), resource, "ledc_channel_config")?;
            }
            ch.writing = true;
            Ok(())
        })
    }

    fn change_duty_cycle(&self, chip: u32, channel: u32, duty_percent: u8) -> Result<()> {
        self.with_channel(chip, channel, "change_duty_cycle", |ch| {
            let resource = Resource::PwmChannel { chip, channel };
            if !ch.writing {
                return Err(HardwareFault::new(resource, "change_duty_cycle", ESP_ERR_INVALID_STATE as esp_err_t).into());
            }
            // SAFETY: channel is configured and running.
            unsafe {
                check(
                    ledc_set_duty(speed_mode(chip), channel, ledc_duty(duty_percent)),
                    resource,
                    "ledc_set_duty",
                )?;
                check(ledc_update_duty(speed_mode(chip), channel), resource, "ledc_update_duty")
            }
        })
    }

    fn stop_writing(&self, chip: u32, channel: u32) -> Result<()> {
        self.with_channel(chip, channel, "stop_writing", |ch| {
            let resource = Resource::PwmChannel { chip, channel };
            if ch.writing {
                // SAFETY: channel is configured; idle level low.
                check(unsafe { ledc_stop(speed_mode(chip), channel, 0) }, resource, "ledc_stop")?;
                ch.writing = false;
            }
            Ok(())
        })
    }
}
