//! Actuator variants for actuator_core.
//!
//! - `sim`: full-capability simulated plant with write probes.
//! - `servo`: continuous servo with power and bus voltage only.
//! - `switch`: simulated and manual limit switches.
//! - `encoder`: external encoder on the simulated plant.
//! - `gpio` (feature `hardware`): limit switch on a Raspberry Pi GPIO pin.
pub mod encoder;
pub mod error;
#[cfg(feature = "hardware")]
pub mod gpio;
pub mod servo;
pub mod sim;
pub mod switch;

pub use encoder::SimulatedEncoder;
pub use servo::ContinuousServo;
pub use sim::{SimMode, SimParams, SimProbe, SimulatedActuator, WriteCounts};
pub use switch::{ManualSwitch, SimulatedLimitSwitch};
