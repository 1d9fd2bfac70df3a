#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! actuator_core: control-mode arbitration for one actuator, shared between
//! hardware closed loops and software-emulated ones.
//!
//! - Power, velocity, position and current commands go through one pipeline
//!   with ownership, limit vetoes, delays and durations.
//! - A periodic control tick runs software PID, stall protection, zero
//!   calibration and follower synchronization.
//! - An injected odometry registry samples every opted-in actuator once per
//!   cycle and discards spurious readings.
//! - Typed errors (`ActuatorError`, `BuildError`) are wrapped in `eyre::Report`.
//!
//! Drive a simulated actuator:
//! ```no_run
//! use actuator_core::prelude::*;
//! use actuator_hardware::sim::{SimParams, SimulatedActuator};
//!
//! let sim = SimulatedActuator::new(SimParams::default());
//! let motor = Motor::builder("lift").with_actuator(sim).build()?;
//! motor.set_power(0.5, CommandOptions::new())?;
//! motor.control_tick();
//! # Ok::<(), eyre::Report>(())
//! ```

pub mod arbiter;
pub mod builder;
pub mod command;
pub mod config;
pub mod control_task;
pub mod conversions;
pub mod error;
pub mod hardware;
pub mod hw_error;
pub mod mocks;
pub mod motor;
pub mod notifier;
pub mod odometry;
pub mod ownership;
pub mod pid;
pub mod pipeline;
pub mod presets;
pub mod scheduler;
pub mod stall;
pub mod timer;
pub mod util;

pub use builder::{Missing, MotorBuilder, Set};
pub use command::{CommandOptions, ControlMode, PositionOptions};
pub use config::{MotorSettings, PidCfg, SensorCfg};
pub use error::{ActuatorError, BuildError, Report, Result};
pub use hardware::{LimitSide, TriggerCallback, TriggerMode};
pub use motor::Motor;
pub use notifier::{CompletionEvent, EventState};
pub use odometry::{Odometry, OdometryRegistry};
pub use ownership::{ExclusiveOwnership, OwnershipGate};
pub use pid::PidController;
pub use presets::PresetTable;
pub use scheduler::{CooperativeScheduler, PeriodicTask, SchedulerThread, TaskHandle, TaskKind, TaskScheduler};
pub use stall::{StallCfg, StallDetector};
pub use timer::ThreadTimer;

/// Common imports for applications driving actuators.
pub mod prelude {
    pub use crate::{
        CommandOptions, CompletionEvent, ControlMode, CooperativeScheduler, ExclusiveOwnership,
        LimitSide, Motor, MotorSettings, OdometryRegistry, PositionOptions, PresetTable,
        StallCfg, TriggerMode,
    };
    pub use actuator_traits::{Capability, ClosedLoop, PidCoefficients};
}
