use charger_traits::{ControlError, SensorError};
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("sensor read failed: {0}")]
    Sensor(#[from] SensorError),
    #[error("charger control failed: {0}")]
    Control(#[from] ControlError),
    #[error("persistence failed: {0}")]
    Persistence(String),
    #[error("invalid state: {0}")]
    State(String),
}

impl CoreError {
    /// Wrap into an eyre report at the call site.
    pub fn report(self) -> Report {
        Report::new(self)
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing fuel gauge")]
    MissingFuelGauge,
    #[error("missing charger")]
    MissingCharger,
    #[error("missing charger descriptor")]
    MissingDesc,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
