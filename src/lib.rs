//! fanctl library.
//!
//! PWM fan control with tachometer RPM sampling, and GPIO LED flash
//! patterns, written against two small controller traits in [`ports`].
//! ESP-IDF controller adapters are compiled under
//! `#[cfg(target_os = "espidf")]`; host builds get an in-memory simulation
//! instead.

#![deny(unused_must_use)]

pub mod adapters;
pub mod config;
pub mod drivers;
pub mod error;
pub mod pins;
pub mod ports;
pub mod sensors;
pub mod task;

pub use error::{Error, Result};
