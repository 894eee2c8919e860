use thiserror::Error;

/// Errors from the HX711 driver, GPIO pins and the simulator.

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("hx711 data-ready timeout")]
    DataReadyTimeout,
    #[error("simulated scale has no load cell attached")]
    Disconnected,
    #[error("sim script line {line}: {reason}")]
    Script { line: usize, reason: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
