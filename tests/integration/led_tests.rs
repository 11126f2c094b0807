//! LED presets and flash sequencing against the recording mock.

use std::sync::Arc;
use std::time::Duration;

use embedded_hal::digital::PinState;
use fanctl::drivers::{DigitalOutput, FlashPattern, FlashSequencer, LedLight};
use fanctl::error::Error;
use fanctl::ports::GpioController;
use fanctl::task::CancelToken;
use futures_lite::future;

use crate::mock_hw::{Call, MockHardware};

const LED: u32 = 17;

fn writes(hw: &MockHardware) -> Vec<PinState> {
    hw.log
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::WritePin { level, .. } => Some(level),
            _ => None,
        })
        .collect()
}

#[test]
fn asymmetric_pattern_alternates_and_ends_closed() {
    let hw = MockHardware::new();
    let seq = FlashSequencer::new(DigitalOutput::new(Arc::clone(&hw.gpio), LED));
    let task = seq
        .spawn(FlashPattern::OnOff {
            on: Duration::from_millis(5),
            off: Duration::from_millis(15),
        })
        .unwrap();
    std::thread::sleep(Duration::from_millis(70));
    let seq = task.stop(Duration::from_secs(1)).unwrap();

    let levels = writes(&hw);
    assert!(levels.len() >= 4);
    assert!(levels.windows(2).all(|w| w[0] != w[1]));
    assert_eq!(hw.log.calls().last(), Some(&Call::ClosePin { pin: LED }));
    assert!(!seq.output().is_open());
}

#[test]
fn sequence_pattern_runs_every_step() {
    let hw = MockHardware::new();
    let ms = Duration::from_millis;
    let pattern = FlashPattern::sequence(&[ms(5), ms(5), ms(5), ms(20)]).unwrap();
    let task = FlashSequencer::new(DigitalOutput::new(Arc::clone(&hw.gpio), LED))
        .spawn(pattern)
        .unwrap();
    std::thread::sleep(Duration::from_millis(80));
    task.stop(Duration::from_secs(1)).unwrap();

    // two flashes per 35 ms cycle
    assert!(hw.log.count(|c| matches!(c, Call::WritePin { level: PinState::High, .. })) >= 3);
}

#[test]
fn write_failure_stops_flash_and_releases() {
    let hw = MockHardware::new();
    hw.fail("write_pin");
    let mut seq = FlashSequencer::new(DigitalOutput::new(Arc::clone(&hw.gpio), LED));
    let token = CancelToken::new();
    let outcome = future::block_on(seq.flash(&FlashPattern::Repeating(Duration::from_millis(5)), &token));
    assert!(matches!(outcome, Err(Error::HardwareUnavailable(_))));
    assert!(!hw.gpio.is_pin_open(LED));
}

#[test]
fn led_warning_then_error_preset() {
    let hw = MockHardware::new();
    let mut led = LedLight::new(Arc::clone(&hw.gpio), LED);
    led.start_warning().unwrap();
    std::thread::sleep(Duration::from_millis(30));
    led.start_error().unwrap();
    std::thread::sleep(Duration::from_millis(30));
    led.stop().unwrap();

    assert!(!led.is_flashing());
    assert_eq!(hw.log.count(|c| matches!(c, Call::OpenPin { .. })), 2);
    assert_eq!(hw.log.count(|c| matches!(c, Call::ClosePin { .. })), 2);
}

#[test]
fn inline_warning_returns_on_cancel() {
    let hw = MockHardware::new();
    let mut led = LedLight::new(Arc::clone(&hw.gpio), LED);
    let token = Arc::new(CancelToken::new());

    let canceller = {
        let token = Arc::clone(&token);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            token.cancel();
        })
    };
    future::block_on(led.warning(&token)).unwrap();
    canceller.join().unwrap();

    assert_eq!(writes(&hw).first(), Some(&PinState::High));
    assert!(!hw.gpio.is_pin_open(LED));
}
