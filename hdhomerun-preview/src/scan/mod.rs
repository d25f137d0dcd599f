//! Channel scanning.
//!
//! [`ScanEngine`] walks a tuner through every frequency of a channel map,
//! one advance/detect step at a time, reporting to a [`ScanObserver`] and
//! collecting the virtual channels it finds.

mod engine;
mod observer;

pub use engine::{ScanEngine, ScanError, ScanPhase, ScanState};
pub use observer::{
    ScanCancel, ScanObserver, ScanObserverFactory, SilentObservers, ACTION_CANCEL, ACTION_CLOSE,
};
