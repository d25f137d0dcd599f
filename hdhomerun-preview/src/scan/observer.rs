//! Progress reporting for a running channel scan.

use std::sync::{Arc, Weak};

use hdhomerun_model::ChannelMap;

use super::engine::ScanShared;

/// Action label while the scan is running.
pub const ACTION_CANCEL: &str = "Cancel";

/// Action label once the scan has finished.
pub const ACTION_CLOSE: &str = "Close";

/// Receives scan progress. Typically a progress dialog.
///
/// Methods may be called from a runtime worker thread.
pub trait ScanObserver: Send + Sync {
    fn set_status(&self, text: &str);

    /// Fraction complete, 0.0 to 1.0.
    fn set_progress(&self, fraction: f64);

    /// Relabel the cancel/close action.
    fn set_action_label(&self, label: &str);

    /// The scan state was discarded; dismiss the observer.
    fn close(&self);
}

/// Creates one observer per scan.
pub trait ScanObserverFactory: Send + Sync {
    /// Open an observer for a scan over `map`.
    ///
    /// `cancel` is what the observer's action should invoke.
    fn open(&self, map: ChannelMap, cancel: ScanCancel) -> Arc<dyn ScanObserver>;
}

/// Handle an observer uses to cancel (or dismiss) its scan.
///
/// Does not keep the scan engine alive.
#[derive(Clone)]
pub struct ScanCancel {
    shared: Weak<ScanShared>,
}

impl ScanCancel {
    pub(super) fn new(shared: Weak<ScanShared>) -> Self {
        Self { shared }
    }

    /// Cancel a running scan, or discard a finished one.
    ///
    /// No-op once the engine is gone.
    pub fn cancel(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.cancel();
        }
    }
}

/// Factory for scans nobody watches.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObservers;

struct SilentObserver;

impl ScanObserver for SilentObserver {
    fn set_status(&self, _text: &str) {}
    fn set_progress(&self, _fraction: f64) {}
    fn set_action_label(&self, _label: &str) {}
    fn close(&self) {}
}

impl ScanObserverFactory for SilentObservers {
    fn open(&self, _map: ChannelMap, _cancel: ScanCancel) -> Arc<dyn ScanObserver> {
        Arc::new(SilentObserver)
    }
}
