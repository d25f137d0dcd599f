//! Shared types for the HDHomeRun preview pipeline.
//!
//! This crate holds the data-only values passed between the tuner
//! session, the channel scan engine and the UI:
//!
//! - [`DeviceId`]: validated 8-digit hexadecimal device id
//! - [`TuneSpec`]: validated channel/frequency string
//! - [`ChannelMap`]: channel plans a scan can walk
//! - [`ScannedChannel`] / [`SavedChannel`]: scan output and the tunable list
//!
//! ```rust
//! use hdhomerun_model::{ChannelMap, DeviceId, SavedChannel, ScannedChannel, DetectedProgram};
//!
//! let id: DeviceId = "103FD2C1".parse().unwrap();
//! assert_eq!(id.as_u32(), 0x103FD2C1);
//!
//! let map: ChannelMap = "us-bcast".parse().unwrap();
//! assert_eq!(map.scan_name(), "us-bcast");
//!
//! let program = DetectedProgram::new("5.1", "CBS");
//! let scanned = ScannedChannel::from_program(&program, 500_000_000).unwrap();
//! assert_eq!(SavedChannel::from(&scanned).to_string(), "5.1 - CBS");
//! ```

pub mod error;
pub mod types;

pub use error::ModelError;
pub use types::{
    ChannelMap, DetectedProgram, DeviceId, SavedChannel, ScannedChannel, TuneSpec,
    DEVICE_ID_DIGITS, PROGRAMS_PER_ENTRY,
};
