//! Timer task that relays tuner data into the ring buffer.

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, info, trace};
use tokio::runtime::Handle;

use crate::device::TunerDevice;
use crate::stream::PlaybackState;
use crate::task::TaskHandle;

/// Device-side buffer of one second of video (20 Mbit/s).
pub const DEVICE_BUFFER_SIZE_1S: usize = 20_000_000 / 8;

/// Default pump period.
pub const DEFAULT_PUMP_INTERVAL: Duration = Duration::from_millis(50);

/// Default bytes requested per tick: one tick's share of the one-second buffer.
pub const DEFAULT_PUMP_CHUNK: usize = DEVICE_BUFFER_SIZE_1S / 20;

/// Pump timing and sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpConfig {
    pub interval: Duration,
    pub chunk_size: usize,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PUMP_INTERVAL,
            chunk_size: DEFAULT_PUMP_CHUNK,
        }
    }
}

/// Running stream pump. Cancelled on drop.
pub struct StreamPump {
    task: TaskHandle,
}

impl StreamPump {
    /// Start pulling from `device` into the playback buffer every `config.interval`.
    ///
    /// The pump stops by itself once playback stops, the buffer is released
    /// or the device handle is gone.
    pub fn start(
        runtime: &Handle,
        device: Weak<dyn TunerDevice>,
        playback: Arc<PlaybackState>,
        config: PumpConfig,
    ) -> Self {
        info!(
            "[Pump] Starting: {} bytes every {}ms",
            config.chunk_size,
            config.interval.as_millis()
        );
        let mut scratch = vec![0u8; config.chunk_size.max(1)];
        let task = TaskHandle::repeating(runtime, "stream-pump", config.interval, move || {
            pump_tick(&device, &playback, &mut scratch)
        });
        Self { task }
    }

    /// Stop scheduling ticks.
    ///
    /// A tick already running on another worker may still finish. Writes
    /// stop once [`PlaybackState::set_playing`] clears the flag, since a tick
    /// only writes while holding the playback lock and seeing it set.
    pub fn cancel(&mut self) {
        self.task.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// One pump iteration.
fn pump_tick(device: &Weak<dyn TunerDevice>, playback: &PlaybackState, scratch: &mut [u8]) -> ControlFlow<()> {
    let Some(device) = device.upgrade() else {
        debug!("[Pump] Tuner handle released, stopping");
        return ControlFlow::Break(());
    };

    let outcome = playback.with_live_buffer(|buffer| {
        let received = device.stream_recv(scratch);
        if received == 0 {
            return;
        }

        let written = buffer.write(&scratch[..received]);
        if written < received {
            let dropped = received - written;
            playback.add_dropped(dropped);
            debug!("[Pump] Ring buffer full, dropped {} of {} bytes", dropped, received);
        } else {
            trace!("[Pump] Buffered {} bytes", written);
        }
    });

    match outcome {
        Some(()) => ControlFlow::Continue(()),
        None => {
            debug!("[Pump] Playback stopped, stopping");
            ControlFlow::Break(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTuner;

    fn start_pump(fake: &Arc<FakeTuner>, playback: &Arc<PlaybackState>) -> StreamPump {
        let device: Arc<dyn TunerDevice> = fake.clone();
        StreamPump::start(
            &Handle::current(),
            Arc::downgrade(&device),
            Arc::clone(playback),
            PumpConfig {
                interval: Duration::from_millis(50),
                chunk_size: 188,
            },
        )
    }

    #[test]
    fn test_default_chunk_is_twentieth_of_device_buffer() {
        assert_eq!(DEFAULT_PUMP_CHUNK, 125_000);
        assert_eq!(PumpConfig::default().interval, Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_fills_buffer_each_tick() {
        let fake = FakeTuner::new();
        fake.set_stream_chunk(188);
        let playback = PlaybackState::new();
        let buffer = playback.ensure_buffer(64 * 1024);
        playback.set_playing(true);

        let _pump = start_pump(&fake, &playback);
        tokio::time::sleep(Duration::from_millis(160)).await;

        assert_eq!(buffer.available(), 3 * 188);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_writes_after_stop() {
        let fake = FakeTuner::new();
        fake.set_stream_chunk(188);
        let playback = PlaybackState::new();
        let buffer = playback.ensure_buffer(64 * 1024);
        playback.set_playing(true);

        let pump = start_pump(&fake, &playback);
        tokio::time::sleep(Duration::from_millis(110)).await;
        let before = buffer.available();
        assert_eq!(before, 2 * 188);

        // Clearing the flag alone must stop writes, even before cancel
        playback.set_playing(false);
        for _ in 0..10 {
            tokio::time::advance(Duration::from_millis(50)).await;
            tokio::task::yield_now().await;
        }
        assert_eq!(buffer.available(), before);
        assert!(pump.is_finished());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_then_cancel_on_worker_threads() {
        let fake = FakeTuner::new();
        fake.set_stream_chunk(188);
        let playback = PlaybackState::new();
        let buffer = playback.ensure_buffer(1024 * 1024);
        playback.set_playing(true);

        let device: Arc<dyn TunerDevice> = fake.clone();
        let mut pump = StreamPump::start(
            &Handle::current(),
            Arc::downgrade(&device),
            Arc::clone(&playback),
            PumpConfig {
                interval: Duration::from_millis(1),
                chunk_size: 188,
            },
        );
        while buffer.available() < 4 * 188 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        // A tick may be mid-flight on the other worker; the flag still fences it
        playback.set_playing(false);
        let fenced = buffer.available();
        pump.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(buffer.available(), fenced);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticks() {
        let fake = FakeTuner::new();
        fake.set_stream_chunk(188);
        let playback = PlaybackState::new();
        let buffer = playback.ensure_buffer(64 * 1024);
        playback.set_playing(true);

        let mut pump = start_pump(&fake, &playback);
        tokio::time::sleep(Duration::from_millis(60)).await;
        pump.cancel();
        let before = buffer.available();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(buffer.available(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_counts_dropped_bytes() {
        let fake = FakeTuner::new();
        fake.set_stream_chunk(188);
        let playback = PlaybackState::new();
        let buffer = playback.ensure_buffer(300);
        playback.set_playing(true);

        let _pump = start_pump(&fake, &playback);
        tokio::time::sleep(Duration::from_millis(110)).await;

        assert_eq!(buffer.available(), 299);
        assert_eq!(playback.dropped_bytes(), 2 * 188 - 299);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_stops_when_device_released() {
        let fake = FakeTuner::new();
        let playback = PlaybackState::new();
        playback.ensure_buffer(1024);
        playback.set_playing(true);

        let device: Arc<dyn TunerDevice> = fake.clone();
        let pump = StreamPump::start(
            &Handle::current(),
            Arc::downgrade(&device),
            Arc::clone(&playback),
            PumpConfig::default(),
        );
        drop(device);
        drop(fake);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(pump.is_finished());
    }
}
