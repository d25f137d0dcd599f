//! Tuner access.
//!
//! The session and scan engine only talk to tuners through
//! [`TunerBackend`] and [`TunerDevice`]. The production implementation
//! loads `libhdhomerun` at runtime; tests plug in scripted fakes.

mod libhdhomerun;

pub use libhdhomerun::LibHdhomerun;

use std::sync::Arc;

use hdhomerun_model::{ChannelMap, DetectedProgram, DeviceId, TuneSpec};
use log::debug;
use thiserror::Error;

/// Tuner library errors.
#[derive(Debug, Error)]
pub enum TunerError {
    /// The tuner library could not be loaded or is missing a symbol.
    #[error("Failed to load tuner library: {0}")]
    LibraryLoad(String),

    /// The device/tuner pair could not be opened.
    #[error("Failed to open tuner {device}-{tuner}")]
    OpenFailed { device: DeviceId, tuner: u32 },

    /// Device-side streaming could not be started.
    #[error("Failed to start stream: {0}")]
    StreamStart(String),

    /// The tuner rejected a channel or frequency.
    #[error("Failed to set channel {channel:?}: {reason}")]
    TuneFailed { channel: String, reason: String },

    /// The channel scan could not be initialised.
    #[error("Failed to initialise channel scan for {map}: {reason}")]
    ScanInit { map: &'static str, reason: String },

    /// Advancing the scan failed.
    #[error("Channel scan advance failed: {0}")]
    ScanAdvance(String),

    /// Program detection failed.
    #[error("Channel scan detect failed: {0}")]
    ScanDetect(String),
}

/// Result of one channel scan advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanAdvance {
    /// The tuner moved to the next candidate frequency.
    Tuned {
        /// Channel label reported by the library, e.g. `us-bcast:14`.
        channel: String,
        /// Center frequency in Hz.
        frequency: u32,
    },
    /// No more frequencies in the map.
    Finished,
}

/// Opens tuner handles.
pub trait TunerBackend: Send + Sync {
    /// Open a handle bound to one device and tuner index.
    fn open(&self, device_id: DeviceId, tuner_index: u32) -> Result<Arc<dyn TunerDevice>, TunerError>;
}

/// An open tuner handle.
///
/// Streaming calls are non-blocking. Tune and scan calls perform device
/// I/O and may take up to a few hundred milliseconds each.
pub trait TunerDevice: Send + Sync {
    /// Start device-side streaming.
    fn stream_start(&self) -> Result<(), TunerError>;

    /// Copy up to `buf.len()` pending TS bytes into `buf`.
    ///
    /// Returns the number of bytes copied; 0 when nothing is pending.
    fn stream_recv(&self, buf: &mut [u8]) -> usize;

    /// Discard pending stream data.
    fn stream_flush(&self);

    /// Stop device-side streaming.
    fn stream_stop(&self);

    /// Tune to a channel or frequency.
    fn set_channel(&self, spec: &TuneSpec) -> Result<(), TunerError>;

    /// Prepare a channel scan over `map`.
    fn channelscan_init(&self, map: ChannelMap) -> Result<(), TunerError>;

    /// Tune to the next candidate frequency of the scan.
    fn channelscan_advance(&self) -> Result<ScanAdvance, TunerError>;

    /// Detect programs at the frequency of the last advance.
    fn channelscan_detect(&self) -> Result<Vec<DetectedProgram>, TunerError>;
}

/// Device-side streaming that stops itself unless committed.
///
/// Used while bringing playback up so every failure path after
/// `stream_start` also stops the stream.
pub struct StreamingGuard {
    device: Arc<dyn TunerDevice>,
    armed: bool,
}

impl StreamingGuard {
    /// Start streaming on `device`.
    pub fn start(device: &Arc<dyn TunerDevice>) -> Result<Self, TunerError> {
        device.stream_start()?;
        Ok(Self {
            device: Arc::clone(device),
            armed: true,
        })
    }

    /// Keep the stream running past the guard's lifetime.
    pub fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for StreamingGuard {
    fn drop(&mut self) {
        if self.armed {
            debug!("[Tuner] Rolling back stream start");
            self.device.stream_stop();
        }
    }
}
