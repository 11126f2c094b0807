//! Adapters: concrete implementations of the controller port traits.
//!
//! | Adapter | Implements                      | Connects to             |
//! |---------|---------------------------------|-------------------------|
//! | `esp`   | GpioController, PwmController   | ESP-IDF GPIO + LEDC     |
//! | `sim`   | GpioController, PwmController   | In-memory simulation    |
//! | `time`  | (monotonic clock)               | esp_timer / `Instant`   |

#[cfg(target_os = "espidf")]
pub mod esp;
#[cfg(not(target_os = "espidf"))]
pub mod sim;
pub mod time;
