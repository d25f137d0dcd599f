//! Live preview and channel scanning for HDHomeRun network tuners.
//!
//! The pipeline relays the tuner's MPEG transport stream into a media
//! player:
//!
//! ```text
//! TunerDevice --(StreamPump, every 50ms)--> RingBuffer --(PlaybackBridge)--> MediaPlayer
//! ```
//!
//! and drives hardware channel scans step by step ([`scan::ScanEngine`]).
//! [`TunerSession`] ties both together behind synchronous, UI-callback
//! shaped operations.
//!
//! Tuner and media libraries are loaded at runtime
//! ([`device::LibHdhomerun`], [`media::LibVlc`]); both sit behind traits
//! so other backends can be plugged in.

pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod media;
pub mod scan;
pub mod session;
pub mod stream;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, PreviewConfig};
pub use error::SessionError;
pub use session::{Controls, SessionSettings, TunerSession};
