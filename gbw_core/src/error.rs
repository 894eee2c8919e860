use thiserror::Error;

/// Why a grind was aborted. Carried by `DoseState::Failed`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FaultReason {
    #[error("cup removed during grinding")]
    CupRemoved,
    #[error("scale stopped responding")]
    SensorLost,
    #[error("grinding took too long")]
    Timeout,
    #[error("weight is not increasing")]
    NoIncrease,
    #[error("cup lifted during grinding")]
    CupLifted,
    #[error("grinder relay did not respond")]
    Actuator,
}

impl FaultReason {
    /// Short machine-friendly label used in logs and snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultReason::CupRemoved => "cup_removed",
            FaultReason::SensorLost => "sensor_lost",
            FaultReason::Timeout => "timeout",
            FaultReason::NoIncrease => "no_increase",
            FaultReason::CupLifted => "cup_lifted",
            FaultReason::Actuator => "actuator",
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum GbwError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("dose failed: {0}")]
    Fault(FaultReason),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing relay")]
    MissingRelay,
    #[error("missing settings store")]
    MissingStore,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
