//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one component against
//! the recording mock controllers.  All tests run on the host with no
//! real hardware required.

#![cfg(not(target_os = "espidf"))]

mod edge_counter_tests;
mod fan_tests;
mod led_tests;
mod mock_hw;
