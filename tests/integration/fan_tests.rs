//! FanController against the recording mock: call ordering, idempotence,
//! failure propagation, and teardown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fanctl::adapters::sim::{SimGpio, SimPwm, SimulatedFan};
use fanctl::config::FanConfig;
use fanctl::drivers::FanController;
use fanctl::error::Error;
use fanctl::ports::{Edge, PinMode};

use crate::mock_hw::{Call, MockGpio, MockHardware, MockPwm};

const TACHO: u32 = 23;

fn fan(hw: &MockHardware, period_ms: u32) -> FanController<MockGpio, MockPwm> {
    let config = FanConfig {
        sample_period_ms: period_ms,
        ..FanConfig::default()
    };
    FanController::from_config(Arc::clone(&hw.gpio), Arc::clone(&hw.pwm), &config).unwrap()
}

#[test]
fn construction_makes_no_calls() {
    let hw = MockHardware::new();
    let _fan = fan(&hw, 1000);
    assert!(hw.log.calls().is_empty());
}

#[test]
fn pwm_starts_before_tachometer_registers() {
    let hw = MockHardware::new();
    let mut fan = fan(&hw, 1000);
    fan.on().unwrap();

    let start = hw.log.position(|c| matches!(c, Call::StartWriting { .. })).unwrap();
    let open = hw.log.position(|c| matches!(c, Call::OpenPin { .. })).unwrap();
    let register = hw.log.position(|c| matches!(c, Call::Register { .. })).unwrap();
    assert!(start < open && open < register);
    assert!(hw.log.calls().contains(&Call::OpenPin {
        pin: TACHO,
        mode: PinMode::InputPullUp
    }));
    assert!(hw.log.calls().contains(&Call::Register {
        pin: TACHO,
        edge: Edge::Rising
    }));
}

#[test]
fn double_on_opens_and_registers_once() {
    let hw = MockHardware::new();
    let mut fan = fan(&hw, 1000);
    fan.on().unwrap();
    fan.on().unwrap();

    assert_eq!(hw.log.count(|c| matches!(c, Call::OpenChannel { .. })), 1);
    assert_eq!(hw.log.count(|c| matches!(c, Call::StartWriting { .. })), 1);
    assert_eq!(hw.log.count(|c| matches!(c, Call::OpenPin { .. })), 1);
    assert_eq!(hw.gpio.callback_count(TACHO), 1);
    assert!(fan.is_sampling());
}

#[test]
fn off_stops_pwm_then_counter() {
    let hw = MockHardware::new();
    let mut fan = fan(&hw, 1000);
    fan.on().unwrap();
    hw.log.clear();
    fan.off().unwrap();

    assert_eq!(
        hw.log.calls(),
        vec![
            Call::StopWriting { chip: 0, channel: 0 },
            Call::Unregister { pin: TACHO },
            Call::ClosePin { pin: TACHO },
        ]
    );
    assert_eq!(hw.gpio.callback_count(TACHO), 0);
}

#[test]
fn off_before_on_is_silent() {
    let hw = MockHardware::new();
    let mut fan = fan(&hw, 1000);
    fan.off().unwrap();
    assert!(hw.log.calls().is_empty());
}

#[test]
fn dispose_before_on_is_silent() {
    let hw = MockHardware::new();
    let mut fan = fan(&hw, 1000);
    fan.dispose();
    assert!(hw.log.calls().is_empty());
}

#[test]
fn start_failure_is_propagated_without_sampling() {
    let hw = MockHardware::new();
    hw.fail("start_writing");
    let mut fan = fan(&hw, 1000);

    let err = fan.on().unwrap_err();
    assert!(matches!(err, Error::HardwareUnavailable(fault) if fault.op == "start_writing"));
    assert!(!fan.is_on());
    assert!(!fan.is_sampling());
    assert_eq!(hw.log.count(|c| matches!(c, Call::Register { .. })), 0);
}

#[test]
fn register_failure_leaves_pwm_running_and_no_sampler() {
    let hw = MockHardware::new();
    hw.fail("register_edge_callback");
    let mut fan = fan(&hw, 1000);

    assert!(fan.on().is_err());
    assert!(fan.is_on());
    assert!(!fan.is_sampling());

    hw.heal("register_edge_callback");
    fan.on().unwrap();
    assert!(fan.is_sampling());
}

#[test]
fn dispose_swallows_release_failures() {
    let hw = MockHardware::new();
    let mut fan = fan(&hw, 1000);
    fan.on().unwrap();
    hw.fail("unregister_edge_callback");
    hw.fail("stop_writing");

    let start = Instant::now();
    fan.dispose();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(fan.off(), Err(Error::AlreadyDisposed));
}

#[test]
fn edges_after_off_do_not_move_rpm() {
    let hw = MockHardware::new();
    let mut fan = fan(&hw, 40);
    fan.on().unwrap();
    hw.gpio.fire(TACHO, Edge::Rising, 10);
    std::thread::sleep(Duration::from_millis(100));
    fan.off().unwrap();
    let frozen = fan.rpm();

    // The callback is gone, but fire anyway and give a stale sampler time.
    hw.gpio.fire(TACHO, Edge::Rising, 100);
    std::thread::sleep(Duration::from_millis(120));
    assert_eq!(fan.rpm(), frozen);
}

#[test]
fn pulse_at_startup_does_not_publish_before_first_window() {
    let hw = MockHardware::new();
    hw.gpio.pulse_on_register(1);
    let mut fan = fan(&hw, 1000);
    fan.on().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(fan.rpm(), 0);
}

#[test]
fn rpm_restarts_at_zero_after_off_on() {
    let hw = MockHardware::new();
    let mut fan = fan(&hw, 40);
    fan.on().unwrap();
    for _ in 0..15 {
        hw.gpio.fire(TACHO, Edge::Rising, 2);
        std::thread::sleep(Duration::from_millis(10));
    }
    fan.off().unwrap();
    assert!(fan.rpm() > 0);

    fan.on().unwrap();
    assert_eq!(fan.rpm(), 0);
}

#[test]
fn set_speed_while_on_changes_live_duty() {
    let hw = MockHardware::new();
    let mut fan = fan(&hw, 1000);
    fan.on().unwrap();
    fan.set_speed(35).unwrap();
    assert!(hw.log.calls().contains(&Call::ChangeDuty {
        chip: 0,
        channel: 0,
        duty: 35
    }));
    assert_eq!(fan.set_speed(150), Err(Error::InvalidArgument("duty cycle must be in 0..=100")));
    assert_eq!(fan.duty_cycle(), 35);
}

#[test]
fn simulated_fan_rpm_tracks_duty() {
    let gpio = Arc::new(SimGpio::new());
    let pwm = Arc::new(SimPwm::new());
    let sim = SimulatedFan::spawn(Arc::clone(&gpio), Arc::clone(&pwm), (0, 0), TACHO, 3000, 2).unwrap();

    let config = FanConfig {
        sample_period_ms: 250,
        ..FanConfig::default()
    };
    let mut fan = FanController::from_config(Arc::clone(&gpio), Arc::clone(&pwm), &config).unwrap();
    fan.on().unwrap();
    std::thread::sleep(Duration::from_millis(700));
    let full = fan.rpm();

    fan.set_speed(50).unwrap();
    std::thread::sleep(Duration::from_millis(700));
    let half = fan.rpm();

    fan.dispose();
    sim.stop();

    assert!((2000..=4000).contains(&full), "full speed rpm = {full}");
    assert!((1000..=2000).contains(&half), "half speed rpm = {half}");
}
