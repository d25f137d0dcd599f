//! Session error types.

use hdhomerun_model::ModelError;
use thiserror::Error;

use crate::device::TunerError;
use crate::media::MediaError;
use crate::scan::ScanError;

/// Why a session operation did nothing.
///
/// Every failure is also logged where it is detected; none leave the
/// session half-started.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No tuner has been selected, or opening it failed.
    #[error("No tuner selected")]
    NoDevice,

    #[error("Playback is already running")]
    AlreadyPlaying,

    /// Playback and scanning are exclusive on one tuner.
    #[error("A channel scan is in progress")]
    ScanInProgress,

    /// Playback and scanning are exclusive on one tuner.
    #[error("Stop playback before scanning")]
    PlaybackActive,

    #[error("No saved channel at index {0}")]
    NoSuchChannel(usize),

    /// Malformed device id or tune spec.
    #[error(transparent)]
    Invalid(#[from] ModelError),

    #[error(transparent)]
    Tuner(#[from] TunerError),

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl From<ScanError> for SessionError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::AlreadyScanning => SessionError::ScanInProgress,
            ScanError::Init(e) => SessionError::Tuner(e),
        }
    }
}
