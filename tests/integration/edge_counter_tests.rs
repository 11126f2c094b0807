//! EdgeCounter lifecycle against the recording mock.

use std::sync::Arc;

use fanctl::error::Error;
use fanctl::ports::{Edge, GpioController, PinMode};
use fanctl::sensors::EdgeCounter;

use crate::mock_hw::{Call, MockHardware};

const PIN: u32 = 5;

#[test]
fn new_counter_is_stopped() {
    let hw = MockHardware::new();
    let counter = EdgeCounter::new(Arc::clone(&hw.gpio), PIN, Edge::Falling);
    assert!(!counter.is_registered());
    assert_eq!(counter.peek(), 0);
    assert!(hw.log.calls().is_empty());
}

#[test]
fn counts_falling_edges_only() {
    let hw = MockHardware::new();
    let mut counter = EdgeCounter::new(Arc::clone(&hw.gpio), PIN, Edge::Falling);
    counter.on().unwrap();
    hw.gpio.fire(PIN, Edge::Falling, 3);
    hw.gpio.fire(PIN, Edge::Rising, 3);
    assert_eq!(counter.read_and_reset(), 3);
    assert_eq!(counter.read_and_reset(), 0);
}

#[test]
fn reuses_a_pin_already_open() {
    let hw = MockHardware::new();
    hw.gpio.open_pin(PIN, PinMode::Input).unwrap();
    hw.log.clear();

    let mut counter = EdgeCounter::new(Arc::clone(&hw.gpio), PIN, Edge::Both);
    counter.on().unwrap();
    assert_eq!(hw.log.calls(), vec![Call::Register { pin: PIN, edge: Edge::Both }]);
}

#[test]
fn off_unregisters_before_closing() {
    let hw = MockHardware::new();
    let mut counter = EdgeCounter::new(Arc::clone(&hw.gpio), PIN, Edge::Rising);
    counter.on().unwrap();
    hw.log.clear();
    counter.off().unwrap();
    counter.off().unwrap();
    assert_eq!(hw.log.calls(), vec![Call::Unregister { pin: PIN }, Call::ClosePin { pin: PIN }]);
}

#[test]
fn open_failure_is_hardware_unavailable() {
    let hw = MockHardware::new();
    hw.fail("open_pin");
    let mut counter = EdgeCounter::new(Arc::clone(&hw.gpio), PIN, Edge::Rising);
    assert!(matches!(counter.on(), Err(Error::HardwareUnavailable(_))));
    assert!(!counter.is_registered());
}

#[test]
fn drop_releases_registration() {
    let hw = MockHardware::new();
    {
        let mut counter = EdgeCounter::new(Arc::clone(&hw.gpio), PIN, Edge::Rising);
        counter.on().unwrap();
    }
    assert_eq!(hw.gpio.callback_count(PIN), 0);
    assert!(!hw.gpio.is_pin_open(PIN));
}
