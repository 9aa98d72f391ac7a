use thiserror::Error;

use crate::data::Window;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("Could not find 'value' in the {window} sample (row {row}).")]
    MissingValue { window: Window, row: usize },

    #[error("Non-finite value in the {window} sample (row {row}).")]
    NotFinite { window: Window, row: usize },

    #[error("Insufficient data: required {required}, got {got}")]
    InsufficientData { required: usize, got: usize },

    #[error("Invalid parameter: {name} - {reason}")]
    InvalidParameter { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, DetectionError>;
