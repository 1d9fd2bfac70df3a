use actuator_traits::ClosedLoop;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActuatorError {
    /// The driver lacks a feature and no software fallback exists.
    #[error("unsupported capability: {0}")]
    Unsupported(String),
    /// A software closed-loop command arrived before its controller was configured.
    #[error("software {0} PID coefficients have not been set")]
    MisconfiguredController(ClosedLoop),
    #[error("ownership denied for owner {owner:?}")]
    OwnershipDenied { owner: Option<String> },
    /// Odometry was read while sampling is disabled for this actuator.
    #[error("odometry is not enabled for this actuator")]
    OdometryDisabled,
    #[error("no preset at index {0}")]
    InvalidPreset(usize),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing actuator")]
    MissingActuator,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
