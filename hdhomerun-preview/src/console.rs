//! Terminal progress display for channel scans.

use std::sync::Arc;

use hdhomerun_model::ChannelMap;
use hdhomerun_preview::scan::{ScanCancel, ScanObserver, ScanObserverFactory, ACTION_CLOSE};
use indicatif::{ProgressBar, ProgressStyle};

const BAR_STEPS: u64 = 1000;

/// Opens one progress bar per scan.
pub struct ConsoleObservers;

impl ScanObserverFactory for ConsoleObservers {
    fn open(&self, map: ChannelMap, _cancel: ScanCancel) -> Arc<dyn ScanObserver> {
        let bar = ProgressBar::new(BAR_STEPS);
        if let Ok(style) = ProgressStyle::with_template("{prefix:>12} [{bar:40}] {percent:>3}% {msg}") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_prefix(map.display_name());
        Arc::new(ConsoleObserver { bar })
    }
}

struct ConsoleObserver {
    bar: ProgressBar,
}

impl ScanObserver for ConsoleObserver {
    fn set_status(&self, text: &str) {
        self.bar.set_message(text.to_string());
    }

    fn set_progress(&self, fraction: f64) {
        self.bar.set_position((fraction.clamp(0.0, 1.0) * BAR_STEPS as f64) as u64);
    }

    fn set_action_label(&self, label: &str) {
        if label == ACTION_CLOSE {
            self.bar.finish();
        }
    }

    fn close(&self) {
        if !self.bar.is_finished() {
            self.bar.abandon_with_message("Scan cancelled");
        }
    }
}
