//! Scripted fakes for the tuner, media and observer seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hdhomerun_model::{ChannelMap, DetectedProgram, DeviceId, TuneSpec};
use parking_lot::Mutex;

use crate::device::{ScanAdvance, TunerBackend, TunerDevice, TunerError};
use crate::media::{MediaBackend, MediaError, MediaPlayer, StreamSource, VideoSurface};
use crate::scan::{ScanCancel, ScanObserver, ScanObserverFactory};

// ============================================================================
// Tuner
// ============================================================================

/// Hardware call recorded by [`FakeTuner`]. Stream receives are not recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StreamStart,
    StreamFlush,
    StreamStop,
    SetChannel(String),
    ScanInit(ChannelMap),
    ScanAdvance,
    ScanDetect,
}

#[derive(Default)]
struct TunerScript {
    calls: Vec<Call>,
    stream_chunk: usize,
    next_byte: u8,
    fail_stream_start: bool,
    fail_set_channel: bool,
    fail_scan_init: bool,
    advances: VecDeque<Result<ScanAdvance, String>>,
    detects: VecDeque<Result<Vec<DetectedProgram>, String>>,
}

/// Tuner handle with scripted scan results and a synthetic stream.
#[derive(Default)]
pub struct FakeTuner {
    script: Mutex<TunerScript>,
    in_step: AtomicBool,
    overlapped: AtomicBool,
}

impl FakeTuner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().calls.clone()
    }

    /// Return `len` bytes of a counting sequence from every receive.
    pub fn set_stream_chunk(&self, len: usize) {
        self.script.lock().stream_chunk = len;
    }

    pub fn fail_stream_start(&self) {
        self.script.lock().fail_stream_start = true;
    }

    pub fn fail_set_channel(&self) {
        self.script.lock().fail_set_channel = true;
    }

    pub fn fail_scan_init(&self) {
        self.script.lock().fail_scan_init = true;
    }

    /// Queue one scan step: an advance to `frequency` and its detect result.
    pub fn push_frequency(&self, channel: &str, frequency: u32, programs: Vec<DetectedProgram>) {
        let mut script = self.script.lock();
        script.advances.push_back(Ok(ScanAdvance::Tuned {
            channel: channel.to_string(),
            frequency,
        }));
        script.detects.push_back(Ok(programs));
    }

    /// Queue a failing advance.
    pub fn push_advance_error(&self, reason: &str) {
        self.script.lock().advances.push_back(Err(reason.to_string()));
    }

    /// Make the most recently queued detect fail.
    pub fn fail_last_detect(&self) {
        let mut script = self.script.lock();
        let index = script.detects.len().saturating_sub(1);
        if let Some(slot) = script.detects.get_mut(index) {
            *slot = Err("no lock".to_string());
        }
    }

    /// Whether two scan steps ever ran at the same time.
    pub fn steps_overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    fn step<T>(&self, call: Call, f: impl FnOnce(&mut TunerScript) -> T) -> T {
        if self.in_step.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        let result = {
            let mut script = self.script.lock();
            script.calls.push(call);
            f(&mut script)
        };
        // Give an overlapping step a chance to show up
        std::thread::sleep(std::time::Duration::from_millis(1));
        self.in_step.store(false, Ordering::SeqCst);
        result
    }
}

impl TunerDevice for FakeTuner {
    fn stream_start(&self) -> Result<(), TunerError> {
        let mut script = self.script.lock();
        script.calls.push(Call::StreamStart);
        if script.fail_stream_start {
            return Err(TunerError::StreamStart("scripted failure".to_string()));
        }
        Ok(())
    }

    fn stream_recv(&self, buf: &mut [u8]) -> usize {
        let mut script = self.script.lock();
        let len = script.stream_chunk.min(buf.len());
        for byte in &mut buf[..len] {
            *byte = script.next_byte;
            script.next_byte = script.next_byte.wrapping_add(1);
        }
        len
    }

    fn stream_flush(&self) {
        self.script.lock().calls.push(Call::StreamFlush);
    }

    fn stream_stop(&self) {
        self.script.lock().calls.push(Call::StreamStop);
    }

    fn set_channel(&self, spec: &TuneSpec) -> Result<(), TunerError> {
        let mut script = self.script.lock();
        script.calls.push(Call::SetChannel(spec.as_str().to_string()));
        if script.fail_set_channel {
            return Err(TunerError::TuneFailed {
                channel: spec.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    fn channelscan_init(&self, map: ChannelMap) -> Result<(), TunerError> {
        let mut script = self.script.lock();
        script.calls.push(Call::ScanInit(map));
        if script.fail_scan_init {
            return Err(TunerError::ScanInit {
                map: map.scan_name(),
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    fn channelscan_advance(&self) -> Result<ScanAdvance, TunerError> {
        self.step(Call::ScanAdvance, |script| match script.advances.pop_front() {
            Some(Ok(advance)) => Ok(advance),
            Some(Err(reason)) => Err(TunerError::ScanAdvance(reason)),
            None => Ok(ScanAdvance::Finished),
        })
    }

    fn channelscan_detect(&self) -> Result<Vec<DetectedProgram>, TunerError> {
        self.step(Call::ScanDetect, |script| match script.detects.pop_front() {
            Some(Ok(programs)) => Ok(programs),
            Some(Err(reason)) => Err(TunerError::ScanDetect(reason)),
            None => Ok(Vec::new()),
        })
    }
}

/// Backend handing out one shared [`FakeTuner`].
pub struct FakeBackend {
    pub tuner: Arc<FakeTuner>,
    fail_open: AtomicBool,
    opened: Mutex<Vec<(DeviceId, u32)>>,
}

impl FakeBackend {
    pub fn new(tuner: Arc<FakeTuner>) -> Arc<Self> {
        Arc::new(Self {
            tuner,
            fail_open: AtomicBool::new(false),
            opened: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_open(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }

    pub fn opened(&self) -> Vec<(DeviceId, u32)> {
        self.opened.lock().clone()
    }
}

impl TunerBackend for FakeBackend {
    fn open(&self, device_id: DeviceId, tuner_index: u32) -> Result<Arc<dyn TunerDevice>, TunerError> {
        self.opened.lock().push((device_id, tuner_index));
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(TunerError::OpenFailed {
                device: device_id,
                tuner: tuner_index,
            });
        }
        Ok(self.tuner.clone())
    }
}

// ============================================================================
// Media
// ============================================================================

/// Player call recorded by [`FakeMedia`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaCall {
    CreatePlayer,
    AttachSource,
    AttachSurface,
    Play,
    Stop,
    ReleaseMedia,
    ReleasePlayer,
}

#[derive(Default)]
struct MediaScript {
    calls: Vec<MediaCall>,
    source: Option<Arc<dyn StreamSource>>,
    fail_play: bool,
    fail_create: bool,
}

/// Media backend that records calls and exposes the attached source.
#[derive(Default, Clone)]
pub struct FakeMedia {
    script: Arc<Mutex<MediaScript>>,
}

impl FakeMedia {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<MediaCall> {
        self.script.lock().calls.clone()
    }

    pub fn fail_play(&self) {
        self.script.lock().fail_play = true;
    }

    pub fn fail_create(&self) {
        self.script.lock().fail_create = true;
    }

    /// The source of the currently attached media.
    pub fn source(&self) -> Option<Arc<dyn StreamSource>> {
        self.script.lock().source.clone()
    }
}

impl MediaBackend for FakeMedia {
    fn create_player(&self) -> Result<Box<dyn MediaPlayer>, MediaError> {
        let mut script = self.script.lock();
        script.calls.push(MediaCall::CreatePlayer);
        if script.fail_create {
            return Err(MediaError::PlayerCreate("scripted failure".to_string()));
        }
        Ok(Box::new(FakePlayer {
            script: Arc::clone(&self.script),
        }))
    }
}

struct FakePlayer {
    script: Arc<Mutex<MediaScript>>,
}

impl MediaPlayer for FakePlayer {
    fn attach_source(&mut self, source: Arc<dyn StreamSource>) -> Result<(), MediaError> {
        let mut script = self.script.lock();
        script.calls.push(MediaCall::AttachSource);
        script.source = Some(source);
        Ok(())
    }

    fn attach_surface(&mut self, _surface: VideoSurface) -> Result<(), MediaError> {
        self.script.lock().calls.push(MediaCall::AttachSurface);
        Ok(())
    }

    fn play(&mut self) -> Result<(), MediaError> {
        let mut script = self.script.lock();
        script.calls.push(MediaCall::Play);
        if script.fail_play {
            return Err(MediaError::Play("scripted failure".to_string()));
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.script.lock().calls.push(MediaCall::Stop);
    }

    fn release_media(&mut self) {
        let mut script = self.script.lock();
        script.calls.push(MediaCall::ReleaseMedia);
        script.source = None;
    }
}

impl Drop for FakePlayer {
    fn drop(&mut self) {
        let mut script = self.script.lock();
        script.calls.push(MediaCall::ReleasePlayer);
        script.source = None;
    }
}

// ============================================================================
// Scan observer
// ============================================================================

/// Observer that records everything it is told.
#[derive(Default)]
pub struct RecordingObserver {
    statuses: Mutex<Vec<String>>,
    progress: Mutex<Vec<f64>>,
    label: Mutex<Option<String>>,
    closed: AtomicBool,
    cancel: Mutex<Option<ScanCancel>>,
}

impl RecordingObserver {
    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().clone()
    }

    pub fn last_progress(&self) -> Option<f64> {
        self.progress.lock().last().copied()
    }

    pub fn action_label(&self) -> Option<String> {
        self.label.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Simulate the user pressing the cancel/close action.
    pub fn press_action(&self) {
        let cancel = self.cancel.lock().clone();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
    }
}

impl ScanObserver for RecordingObserver {
    fn set_status(&self, text: &str) {
        self.statuses.lock().push(text.to_string());
    }

    fn set_progress(&self, fraction: f64) {
        self.progress.lock().push(fraction);
    }

    fn set_action_label(&self, label: &str) {
        *self.label.lock() = Some(label.to_string());
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Factory keeping every observer it opened.
#[derive(Default, Clone)]
pub struct RecordingObservers {
    opened: Arc<Mutex<Vec<Arc<RecordingObserver>>>>,
}

impl RecordingObservers {
    pub fn last(&self) -> Option<Arc<RecordingObserver>> {
        self.opened.lock().last().cloned()
    }

    pub fn opened(&self) -> usize {
        self.opened.lock().len()
    }
}

impl ScanObserverFactory for RecordingObservers {
    fn open(&self, _map: ChannelMap, cancel: ScanCancel) -> Arc<dyn ScanObserver> {
        let observer = Arc::new(RecordingObserver {
            cancel: Mutex::new(Some(cancel)),
            ..RecordingObserver::default()
        });
        self.opened.lock().push(Arc::clone(&observer));
        observer
    }
}
