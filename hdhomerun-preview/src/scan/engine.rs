//! Step-wise channel scan state machine.
//!
//! # How It Works
//!
//! 1. `start` initialises the hardware scan synchronously. On failure
//!    nothing changes.
//! 2. A step driver task is spawned. Before each step it yields back to
//!    the runtime, then runs one `advance` and, if that tuned a
//!    frequency, one `detect`. Both run on the blocking pool, strictly
//!    one after the other.
//! 3. An advance that reports the end of the map, or fails, completes the
//!    scan: the collected channels go to the completion callback and the
//!    observer is relabelled to "Close".
//! 4. Cancelling stops the driver before its next step and discards the
//!    scan state together with its observer. A step already running on
//!    the blocking pool finishes, but its result is ignored.

use std::sync::{Arc, Weak};

use hdhomerun_model::{ChannelMap, DetectedProgram, ScannedChannel};
use log::{debug, info, warn};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::observer::{ScanCancel, ScanObserver, ScanObserverFactory, ACTION_CANCEL, ACTION_CLOSE};
use crate::device::{ScanAdvance, TunerDevice, TunerError};
use crate::task::TaskHandle;

/// Reasons a scan could not start.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("A channel scan is already running")]
    AlreadyScanning,

    #[error(transparent)]
    Init(#[from] TunerError),
}

/// Scan lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanPhase {
    /// No scan state exists.
    #[default]
    Idle,
    /// The step driver is running.
    Scanning,
    /// The map was exhausted; results are held until dismissed.
    Completed,
    /// The scan was cancelled and its state discarded.
    Cancelled,
}

/// Progress and results of one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanState {
    pub map: ChannelMap,
    pub scanning: bool,
    /// Frequency of the last successful advance, in Hz.
    pub current_frequency: u32,
    /// Frequencies visited so far.
    pub scanned: u32,
    /// Estimated number of frequencies in the map.
    pub total: u32,
    /// Channels found, in discovery order.
    pub channels: Vec<ScannedChannel>,
}

impl ScanState {
    fn new(map: ChannelMap) -> Self {
        Self {
            map,
            scanning: true,
            current_frequency: 0,
            scanned: 0,
            total: map.estimated_channels(),
            channels: Vec::new(),
        }
    }

    /// Fraction complete, clamped to 1.0 since the total is an estimate.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (f64::from(self.scanned) / f64::from(self.total)).min(1.0)
    }
}

struct ScanJob {
    id: u64,
    state: ScanState,
    observer: Arc<dyn ScanObserver>,
    task: Option<TaskHandle>,
}

impl ScanJob {
    fn discard(mut self) {
        if let Some(mut task) = self.task.take() {
            task.cancel();
        }
        self.observer.close();
    }
}

#[derive(Default)]
struct ScanSlot {
    job: Option<ScanJob>,
    next_id: u64,
}

impl ScanSlot {
    /// The job `id`, if it is still the live, running scan.
    fn running(&mut self, id: u64) -> Option<&mut ScanJob> {
        self.job.as_mut().filter(|job| job.id == id && job.state.scanning)
    }
}

/// State shared between the engine, its step driver and cancel handles.
pub(crate) struct ScanShared {
    slot: Mutex<ScanSlot>,
    phase: watch::Sender<ScanPhase>,
}

impl ScanShared {
    /// Cancel a running scan, or dismiss a completed one.
    pub(crate) fn cancel(&self) {
        let job = {
            let mut slot = self.slot.lock();
            let Some(job) = slot.job.take() else {
                debug!("[Scan] Nothing to cancel");
                return;
            };
            if job.state.scanning {
                info!(
                    "[Scan] Cancelled after {} of ~{} frequencies",
                    job.state.scanned, job.state.total
                );
                self.phase.send_replace(ScanPhase::Cancelled);
            } else {
                debug!("[Scan] Dismissed completed scan");
                self.phase.send_replace(ScanPhase::Idle);
            }
            job
        };
        job.discard();
    }

    /// Drop any scan state and return to `Idle`.
    fn reset(&self) {
        let job = {
            let mut slot = self.slot.lock();
            self.phase.send_replace(ScanPhase::Idle);
            slot.job.take()
        };
        if let Some(job) = job {
            debug!("[Scan] Discarding scan state");
            job.discard();
        }
    }

    /// Record a successful advance. Returns false if the scan is gone.
    fn record_frequency(&self, id: u64, channel: &str, frequency: u32) -> bool {
        let (observer, status, progress) = {
            let mut slot = self.slot.lock();
            let Some(job) = slot.running(id) else {
                return false;
            };
            let state = &mut job.state;
            state.current_frequency = frequency;
            state.scanned += 1;
            debug!("[Scan] Tuned {} ({} Hz)", channel, frequency);
            (
                Arc::clone(&job.observer),
                format!(
                    "Scanning {:.1} MHz ({}/{})",
                    f64::from(frequency) / 1_000_000.0,
                    state.scanned,
                    state.total
                ),
                state.progress(),
            )
        };
        observer.set_status(&status);
        observer.set_progress(progress);
        true
    }

    /// Record the programs detected at `frequency`. Returns false if the scan is gone.
    fn record_programs(&self, id: u64, frequency: u32, programs: &[DetectedProgram]) -> bool {
        let found: Vec<ScannedChannel> = programs
            .iter()
            .filter_map(|program| ScannedChannel::from_program(program, frequency))
            .collect();

        let observer = {
            let mut slot = self.slot.lock();
            let Some(job) = slot.running(id) else {
                return false;
            };
            for channel in &found {
                info!(
                    "[Scan] Found {} {:?} at {} Hz",
                    channel.channel,
                    channel.name.as_deref().unwrap_or(""),
                    frequency
                );
            }
            job.state.channels.extend(found.iter().cloned());
            Arc::clone(&job.observer)
        };

        if let Some(first) = found.first() {
            let status = if found.len() > 1 {
                format!("Found {} ({} programs)", first.channel, found.len())
            } else {
                format!("Found {}", first.channel)
            };
            observer.set_status(&status);
        }
        true
    }

    /// Finish the scan and hand its channels to `on_complete`.
    fn complete<F>(&self, id: u64, on_complete: F)
    where
        F: FnOnce(Vec<ScannedChannel>),
    {
        // Results are handed over under the lock so a concurrent reset or
        // cancel either sees the finished job or prevents the handover.
        let (observer, count) = {
            let mut slot = self.slot.lock();
            let Some(job) = slot.running(id) else {
                return;
            };
            job.state.scanning = false;
            let channels = job.state.channels.clone();
            let count = channels.len();
            info!("[Scan] Complete: {} channels found", count);
            on_complete(channels);
            (Arc::clone(&job.observer), count)
        };

        observer.set_status(&format!("Scan complete: {} channels found", count));
        observer.set_progress(1.0);
        observer.set_action_label(ACTION_CLOSE);

        // Dismissed in the meantime: stay where cancel left us
        let slot = self.slot.lock();
        if slot.job.as_ref().is_some_and(|job| job.id == id) {
            self.phase.send_replace(ScanPhase::Completed);
        }
    }
}

/// Drives channel scans on one tuner.
pub struct ScanEngine {
    shared: Arc<ScanShared>,
}

impl Default for ScanEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanEngine {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(ScanPhase::Idle);
        Self {
            shared: Arc::new(ScanShared {
                slot: Mutex::new(ScanSlot::default()),
                phase,
            }),
        }
    }

    /// Start scanning `map` on `device`.
    ///
    /// The scan initialisation runs before this returns; the first step
    /// runs on a later runtime turn. `on_complete` receives the channels
    /// found once the map is exhausted and is not called on cancel or reset.
    /// It runs with the engine locked, so it must not call back into it.
    pub fn start<F>(
        &self,
        runtime: &Handle,
        device: Arc<dyn TunerDevice>,
        map: ChannelMap,
        observers: &dyn ScanObserverFactory,
        on_complete: F,
    ) -> Result<(), ScanError>
    where
        F: FnOnce(Vec<ScannedChannel>) + Send + 'static,
    {
        if self.is_scanning() {
            warn!("[Scan] Scan already in progress");
            return Err(ScanError::AlreadyScanning);
        }

        if let Err(e) = device.channelscan_init(map) {
            warn!("[Scan] {}", e);
            return Err(e.into());
        }

        // A finished or cancelled scan is discarded by the new one
        self.shared.reset();

        let observer = observers.open(map, ScanCancel::new(Arc::downgrade(&self.shared)));
        observer.set_action_label(ACTION_CANCEL);
        observer.set_status(&format!("Starting {} scan", map.display_name()));
        observer.set_progress(0.0);

        let mut slot = self.shared.slot.lock();
        slot.next_id += 1;
        let id = slot.next_id;
        let shared = Arc::downgrade(&self.shared);
        let task = TaskHandle::spawn(runtime, "channel-scan", move |token| {
            run_scan(shared, id, device, token, on_complete)
        });
        slot.job = Some(ScanJob {
            id,
            state: ScanState::new(map),
            observer,
            task: Some(task),
        });
        self.shared.phase.send_replace(ScanPhase::Scanning);

        info!(
            "[Scan] Started {} scan (~{} frequencies)",
            map.scan_name(),
            map.estimated_channels()
        );
        Ok(())
    }

    /// Cancel a running scan or dismiss a completed one. No-op otherwise.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Discard all scan state and return to `Idle`.
    pub fn reset(&self) {
        self.shared.reset();
    }

    /// Handle that cancels this engine's scan without owning the engine.
    pub fn cancel_handle(&self) -> ScanCancel {
        ScanCancel::new(Arc::downgrade(&self.shared))
    }

    pub fn is_scanning(&self) -> bool {
        self.shared
            .slot
            .lock()
            .job
            .as_ref()
            .is_some_and(|job| job.state.scanning)
    }

    pub fn phase(&self) -> ScanPhase {
        *self.shared.phase.borrow()
    }

    /// Watch phase changes.
    pub fn subscribe(&self) -> watch::Receiver<ScanPhase> {
        self.shared.phase.subscribe()
    }

    /// Copy of the current scan state, if any.
    pub fn snapshot(&self) -> Option<ScanState> {
        self.shared.slot.lock().job.as_ref().map(|job| job.state.clone())
    }
}

impl Drop for ScanEngine {
    fn drop(&mut self) {
        self.shared.reset();
    }
}

/// Step driver.
async fn run_scan<F>(
    shared: Weak<ScanShared>,
    id: u64,
    device: Arc<dyn TunerDevice>,
    token: CancellationToken,
    on_complete: F,
) where
    F: FnOnce(Vec<ScannedChannel>) + Send + 'static,
{
    let finished = loop {
        // One step per runtime turn
        tokio::task::yield_now().await;
        if token.is_cancelled() {
            break false;
        }

        let advance = run_step(&device, |d| d.channelscan_advance(), TunerError::ScanAdvance).await;
        let Some(scan) = shared.upgrade() else {
            break false;
        };
        let frequency = match advance {
            Ok(ScanAdvance::Tuned { channel, frequency }) => {
                if !scan.record_frequency(id, &channel, frequency) {
                    break false;
                }
                frequency
            }
            Ok(ScanAdvance::Finished) => break true,
            Err(e) => {
                // Indistinguishable from the end of the map
                warn!("[Scan] {}, ending scan", e);
                break true;
            }
        };
        drop(scan);

        let detected = run_step(&device, |d| d.channelscan_detect(), TunerError::ScanDetect).await;
        let Some(scan) = shared.upgrade() else {
            break false;
        };
        match detected {
            Ok(programs) => {
                if !scan.record_programs(id, frequency, &programs) {
                    break false;
                }
            }
            Err(e) => debug!("[Scan] {} at {} Hz", e, frequency),
        }
    };

    if finished {
        if let Some(scan) = shared.upgrade() {
            scan.complete(id, on_complete);
        }
    }
}

/// Run one blocking hardware call off the runtime threads.
async fn run_step<T, F>(
    device: &Arc<dyn TunerDevice>,
    step: F,
    on_panic: fn(String) -> TunerError,
) -> Result<T, TunerError>
where
    F: FnOnce(&dyn TunerDevice) -> Result<T, TunerError> + Send + 'static,
    T: Send + 'static,
{
    let device = Arc::clone(device);
    match tokio::task::spawn_blocking(move || step(device.as_ref())).await {
        Ok(result) => result,
        Err(e) => Err(on_panic(e.to_string())),
    }
}
