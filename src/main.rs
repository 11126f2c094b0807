//! fanctl demo: fan speed sweep with live RPM.
//!
//! ```text
//!   fan on @100% ── spin-up ── 100 → 90 → … → 0 % (log duty + rpm) ── off
//!   LED: warning blink for the whole sweep
//! ```
//!
//! On ESP-IDF it drives the real GPIO / LEDC peripherals.  On the host it
//! runs against the simulated controllers, with a simulated fan feeding
//! tachometer edges back, so the RPM column tracks the duty cycle.
//!
//! Usage (host): `fanctl-demo [config.json]`

#![deny(unused_must_use)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};

use fanctl::config::DemoConfig;
use fanctl::drivers::{FanController, LedLight};
use fanctl::ports::{GpioController, PwmController};

fn main() -> Result<()> {
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }
    #[cfg(not(target_os = "espidf"))]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("fanctl demo v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    run(&config)
}

#[cfg(not(target_os = "espidf"))]
fn load_config() -> Result<DemoConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            let config = DemoConfig::from_json(&json).with_context(|| format!("parsing {path}"))?;
            info!("Config loaded from {}", path);
            Ok(config)
        }
        None => {
            info!("No config file given, using defaults");
            Ok(DemoConfig::default())
        }
    }
}

#[cfg(target_os = "espidf")]
fn load_config() -> Result<DemoConfig> {
    Ok(DemoConfig::default())
}

#[cfg(not(target_os = "espidf"))]
fn run(config: &DemoConfig) -> Result<()> {
    use fanctl::adapters::sim::{SimGpio, SimPwm, SimulatedFan};

    const SIM_MAX_RPM: u32 = 3000;

    let gpio = Arc::new(SimGpio::new());
    let pwm = Arc::new(SimPwm::new());
    let fan = match config.fan.tachometer_pin {
        Some(pin) => Some(SimulatedFan::spawn(
            Arc::clone(&gpio),
            Arc::clone(&pwm),
            (config.fan.pwm_chip, config.fan.pwm_channel),
            pin,
            SIM_MAX_RPM,
            config.fan.pulses_per_revolution,
        )?),
        None => None,
    };

    let outcome = sweep(gpio, pwm, config);
    if let Some(fan) = fan {
        fan.stop();
    }
    outcome
}

#[cfg(target_os = "espidf")]
fn run(config: &DemoConfig) -> Result<()> {
    use fanctl::adapters::esp::{EspGpio, EspLedc};
    use fanctl::pins;

    let gpio = Arc::new(EspGpio::new()?);
    let pwm = Arc::new(EspLedc::new(&[(
        (config.fan.pwm_chip, config.fan.pwm_channel),
        pins::FAN_PWM_GPIO,
    )]));
    sweep(gpio, pwm, config)
}

/// Start the fan at full speed, step it down to zero, then stop.
fn sweep<G, P>(gpio: Arc<G>, pwm: Arc<P>, config: &DemoConfig) -> Result<()>
where
    G: GpioController + 'static,
    P: PwmController,
{
    let mut led = LedLight::from_config(Arc::clone(&gpio), &config.led);
    let mut fan = FanController::from_config(gpio, pwm, &config.fan)?;

    if let Err(e) = led.start_warning() {
        warn!("Status LED unavailable: {}", e);
    }

    fan.set_speed(100)?;
    fan.on()?;
    info!("Fan on, spinning up for {} ms", config.spin_up_ms);
    std::thread::sleep(Duration::from_millis(u64::from(config.spin_up_ms)));

    let dwell = Duration::from_millis(u64::from(config.sweep_dwell_ms));
    let step = i32::from(config.sweep_step_percent);
    let mut duty = 100;
    loop {
        fan.set_speed(duty)?;
        std::thread::sleep(dwell);
        info!("duty={:>3}%  rpm={}", fan.duty_cycle(), fan.rpm());
        if duty == 0 {
            break;
        }
        duty = (duty - step).max(0);
    }

    fan.off()?;
    info!("Fan off (last rpm={})", fan.rpm());
    led.stop()?;
    fan.dispose();
    Ok(())
}
