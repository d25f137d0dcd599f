//! Tuner session: the entry point for preview and scan.
//!
//! A [`TunerSession`] owns one open tuner handle and everything hanging
//! off it: the playback ring buffer, the stream pump, the player and the
//! channel scan. Its operations are synchronous and cheap, so they can be
//! called straight from UI callbacks; background work runs on the tokio
//! runtime captured at construction.
//!
//! Playback and channel scanning are mutually exclusive on one session.

use std::sync::Arc;

use hdhomerun_model::{ChannelMap, DeviceId, SavedChannel, ScannedChannel, TuneSpec};
use log::{debug, info, warn};
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::device::{StreamingGuard, TunerBackend, TunerDevice};
use crate::error::SessionError;
use crate::media::{MediaBackend, MediaPlayer, VideoSurface};
use crate::scan::{ScanCancel, ScanEngine, ScanObserverFactory, ScanPhase, ScanState};
use crate::stream::{PlaybackBridge, PlaybackState, PumpConfig, StreamPump, DEFAULT_RING_BUFFER_SIZE};

/// Buffer and pump sizing for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub ring_buffer_bytes: usize,
    pub pump: PumpConfig,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ring_buffer_bytes: DEFAULT_RING_BUFFER_SIZE,
            pump: PumpConfig::default(),
        }
    }
}

/// Which user controls are currently usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Controls {
    pub play: bool,
    pub stop: bool,
    pub scan: bool,
    pub tune: bool,
}

/// The selected device and tuner.
struct OpenTuner {
    device_id: DeviceId,
    tuner_index: u32,
    handle: Arc<dyn TunerDevice>,
}

/// One device+tuner preview session.
pub struct TunerSession {
    runtime: Handle,
    backend: Arc<dyn TunerBackend>,
    media: Arc<dyn MediaBackend>,
    observers: Arc<dyn ScanObserverFactory>,
    surface: Option<VideoSurface>,
    settings: SessionSettings,

    tuner: Option<OpenTuner>,
    playback: Arc<PlaybackState>,
    pump: Option<StreamPump>,
    player: Option<Box<dyn MediaPlayer>>,
    scan: ScanEngine,
    saved: Arc<RwLock<Vec<SavedChannel>>>,
}

impl TunerSession {
    /// Create an empty session. Background work is spawned on `runtime`.
    pub fn new(
        runtime: Handle,
        backend: Arc<dyn TunerBackend>,
        media: Arc<dyn MediaBackend>,
        observers: Arc<dyn ScanObserverFactory>,
    ) -> Self {
        Self {
            runtime,
            backend,
            media,
            observers,
            surface: None,
            settings: SessionSettings::default(),
            tuner: None,
            playback: PlaybackState::new(),
            pump: None,
            player: None,
            scan: ScanEngine::new(),
            saved: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Render video into `surface`.
    pub fn with_surface(mut self, surface: VideoSurface) -> Self {
        self.surface = Some(surface);
        self
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Bind the session to `device_id` / `tuner_index`.
    ///
    /// Whatever was selected before is torn down first. On failure the
    /// session is left with no tuner and every control disabled.
    pub fn select(&mut self, device_id: &str, tuner_index: u32) -> Result<(), SessionError> {
        self.teardown();

        let id: DeviceId = match device_id.parse() {
            Ok(id) => id,
            Err(e) => {
                warn!("[Session] {}", e);
                return Err(e.into());
            }
        };

        let handle = match self.backend.open(id, tuner_index) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("[Session] {}", e);
                return Err(e.into());
            }
        };

        info!("[Session] Selected tuner {}-{}", id, tuner_index);
        self.tuner = Some(OpenTuner {
            device_id: id,
            tuner_index,
            handle,
        });
        Ok(())
    }

    /// Start live preview.
    pub fn play(&mut self) -> Result<(), SessionError> {
        let Some(device) = self.handle() else {
            warn!("[Session] Play requested with no tuner selected");
            return Err(SessionError::NoDevice);
        };
        if self.playback.is_playing() {
            warn!("[Session] Already playing");
            return Err(SessionError::AlreadyPlaying);
        }
        if self.scan.is_scanning() {
            warn!("[Session] Cannot play while a channel scan is running");
            return Err(SessionError::ScanInProgress);
        }

        let (mut player, fresh) = match self.player.take() {
            Some(player) => (player, false),
            None => match self.media.create_player() {
                Ok(player) => (player, true),
                Err(e) => {
                    warn!("[Session] {}", e);
                    return Err(e.into());
                }
            },
        };

        match self.start_playback(&device, player.as_mut()) {
            Ok(pump) => {
                self.pump = Some(pump);
                self.player = Some(player);
                info!("[Session] Playback started");
                Ok(())
            }
            Err(e) => {
                warn!("[Session] Playback failed to start: {}", e);
                player.release_media();
                // A player created for this attempt goes with it
                if !fresh {
                    self.player = Some(player);
                }
                Err(e)
            }
        }
    }

    /// Bring up streaming, media and pump. Undoes its own steps on failure.
    fn start_playback(
        &self,
        device: &Arc<dyn TunerDevice>,
        player: &mut dyn MediaPlayer,
    ) -> Result<StreamPump, SessionError> {
        let buffer = self.playback.ensure_buffer(self.settings.ring_buffer_bytes);
        buffer.clear();

        let streaming = StreamingGuard::start(device)?;

        player.attach_source(Arc::new(PlaybackBridge::new(Arc::clone(&self.playback))))?;
        match self.surface {
            Some(surface) => {
                if let Err(e) = player.attach_surface(surface) {
                    warn!("[Session] {}", e);
                }
            }
            None => debug!("[Session] No video surface, playing headless"),
        }

        self.playback.set_playing(true);
        let mut pump = StreamPump::start(
            &self.runtime,
            Arc::downgrade(device),
            Arc::clone(&self.playback),
            self.settings.pump,
        );

        if let Err(e) = player.play() {
            self.playback.set_playing(false);
            pump.cancel();
            return Err(e.into());
        }

        streaming.commit();
        Ok(pump)
    }

    /// Stop live preview.
    ///
    /// Flushes and stops device-side streaming even when not playing.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        let Some(device) = self.handle() else {
            warn!("[Session] Stop requested with no tuner selected");
            return Err(SessionError::NoDevice);
        };

        let was_playing = self.playback.is_playing();
        self.playback.set_playing(false);
        if let Some(mut pump) = self.pump.take() {
            pump.cancel();
        }
        if let Some(player) = self.player.as_mut() {
            player.stop();
            player.release_media();
        }
        device.stream_flush();
        device.stream_stop();

        if was_playing {
            info!("[Session] Playback stopped");
        }
        Ok(())
    }

    /// Start a channel scan over `map`.
    pub fn scan(&mut self, map: ChannelMap) -> Result<(), SessionError> {
        let Some(device) = self.handle() else {
            warn!("[Session] Scan requested with no tuner selected");
            return Err(SessionError::NoDevice);
        };
        if self.playback.is_playing() {
            warn!("[Session] Stop playback before scanning");
            return Err(SessionError::PlaybackActive);
        }

        let saved = Arc::clone(&self.saved);
        self.scan.start(
            &self.runtime,
            device,
            map,
            self.observers.as_ref(),
            move |channels: Vec<ScannedChannel>| {
                let list: Vec<SavedChannel> = channels.iter().map(SavedChannel::from).collect();
                info!("[Session] Saved {} channels", list.len());
                *saved.write() = list;
            },
        )?;
        Ok(())
    }

    /// Cancel a running scan, or dismiss a finished one.
    pub fn cancel_scan(&self) {
        self.scan.cancel();
    }

    /// Tune to a channel (`5.1`) or frequency (`609000000`).
    pub fn tune(&self, spec: &str) -> Result<(), SessionError> {
        let Some(device) = self.handle() else {
            warn!("[Session] Tune requested with no tuner selected");
            return Err(SessionError::NoDevice);
        };

        let spec = match TuneSpec::parse(spec) {
            Ok(spec) => spec,
            Err(e) => {
                warn!("[Session] {}", e);
                return Err(e.into());
            }
        };

        if let Err(e) = device.set_channel(&spec) {
            warn!("[Session] {}", e);
            return Err(e.into());
        }
        info!("[Session] Tuned to {}", spec);
        Ok(())
    }

    /// Tune to the saved channel at `index`.
    pub fn select_saved_channel(&self, index: usize) -> Result<(), SessionError> {
        let channel = self.saved.read().get(index).map(|ch| ch.channel.clone());
        match channel {
            Some(channel) => self.tune(&channel),
            None => {
                warn!("[Session] No saved channel at index {}", index);
                Err(SessionError::NoSuchChannel(index))
            }
        }
    }

    /// Release everything: playback, player, buffer, scan, saved channels
    /// and the tuner handle.
    pub fn teardown(&mut self) {
        self.scan.reset();

        if self.tuner.is_some() {
            // Only fails without a tuner
            let _ = self.stop();
        }
        self.player = None;
        self.playback.release_buffer();
        self.playback = PlaybackState::new();
        self.saved.write().clear();

        if let Some(tuner) = self.tuner.take() {
            info!("[Session] Released tuner {}-{}", tuner.device_id, tuner.tuner_index);
        }
    }

    // ========================================================================
    // Observers
    // ========================================================================

    fn handle(&self) -> Option<Arc<dyn TunerDevice>> {
        self.tuner.as_ref().map(|t| Arc::clone(&t.handle))
    }

    /// The selected device and tuner index.
    pub fn selected(&self) -> Option<(DeviceId, u32)> {
        self.tuner.as_ref().map(|t| (t.device_id, t.tuner_index))
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    /// Enabled state of the play/stop/scan/tune controls.
    pub fn controls(&self) -> Controls {
        if self.tuner.is_none() {
            return Controls::default();
        }
        let playing = self.playback.is_playing();
        let scanning = self.scan.is_scanning();
        Controls {
            play: !playing && !scanning,
            stop: playing,
            scan: !playing && !scanning,
            tune: true,
        }
    }

    /// Channels found by the last completed scan.
    pub fn saved_channels(&self) -> Vec<SavedChannel> {
        self.saved.read().clone()
    }

    /// Display labels for [`saved_channels`](Self::saved_channels).
    pub fn channel_labels(&self) -> Vec<String> {
        self.saved.read().iter().map(ToString::to_string).collect()
    }

    /// Watch the scan phase.
    pub fn scan_phase(&self) -> watch::Receiver<ScanPhase> {
        self.scan.subscribe()
    }

    /// Copy of the running or completed scan's state.
    pub fn scan_snapshot(&self) -> Option<ScanState> {
        self.scan.snapshot()
    }

    /// Handle that cancels this session's scan.
    pub fn scan_cancel_handle(&self) -> ScanCancel {
        self.scan.cancel_handle()
    }

    /// Bytes the ring buffer had no room for since the tuner was selected.
    pub fn dropped_bytes(&self) -> u64 {
        self.playback.dropped_bytes()
    }

    /// Bytes waiting in the ring buffer.
    pub fn buffered_bytes(&self) -> usize {
        self.playback.buffer().map_or(0, |b| b.available())
    }
}

impl Drop for TunerSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
