//! Error types for validating user- and device-supplied values.

use thiserror::Error;

/// Validation errors raised before any value reaches the tuner library.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Device id is not exactly eight hexadecimal digits.
    #[error("Invalid device id: {0:?} (expected 8 hexadecimal digits)")]
    InvalidDeviceId(String),

    /// Tune spec is empty or contains characters other than digits, '.', ' ' and '-'.
    #[error("Invalid channel or frequency: {0:?}")]
    InvalidTuneSpec(String),

    /// Channel map name is not one of the supported maps.
    #[error("Unknown channel map: {0:?}")]
    UnknownChannelMap(String),
}
