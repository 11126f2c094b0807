//! Output-side components: GPIO lines, PWM channels, and the devices
//! composed from them.

pub mod digital_output;
pub mod fan;
pub mod flash;
pub mod led;
pub mod pwm_output;

pub use digital_output::DigitalOutput;
pub use fan::FanController;
pub use flash::{FlashPattern, FlashSequencer, FlashTask};
pub use led::LedLight;
pub use pwm_output::PwmOutput;
