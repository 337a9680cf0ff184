use charger_traits::SensorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("attribute {0} missing")]
    Missing(String),
    #[error("attribute {attr} unparsable: {value:?}")]
    Parse { attr: String, value: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl From<HwError> for SensorError {
    fn from(err: HwError) -> Self {
        match err {
            HwError::Parse { .. } => SensorError::Invalid,
            HwError::Missing(_) | HwError::Io(_) => SensorError::Unavailable,
        }
    }
}

pub type Result<T> = std::result::Result<T, HwError>;
