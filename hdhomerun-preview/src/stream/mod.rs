//! Live TS relay from the tuner to the media player.
//!
//! This module provides:
//! - [`RingBuffer`]: bounded, lossy byte buffer between producer and consumer
//! - [`StreamPump`]: timer task moving tuner data into the ring buffer
//! - [`PlaybackBridge`]: the player-facing read side of the ring buffer
//! - [`PlaybackState`]: playing flag and buffer shared by the three

pub mod bridge;
pub mod buffer;
pub mod pump;

pub use bridge::PlaybackBridge;
pub use buffer::{RingBuffer, DEFAULT_RING_BUFFER_SIZE, TS_PACKET_SIZE};
pub use pump::{PumpConfig, StreamPump};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Playback flag and ring buffer for one tuner session.
///
/// The pump only writes while holding this state's lock and seeing
/// `playing == true`, so once [`PlaybackState::set_playing`]`(false)`
/// returns no further write can land.
#[derive(Default)]
pub struct PlaybackState {
    inner: Mutex<PlaybackInner>,
    dropped_bytes: AtomicU64,
}

#[derive(Default)]
struct PlaybackInner {
    playing: bool,
    buffer: Option<Arc<RingBuffer>>,
}

impl PlaybackState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().playing
    }

    pub fn set_playing(&self, playing: bool) {
        self.inner.lock().playing = playing;
    }

    /// Return the ring buffer, allocating it with `capacity` on first use.
    pub fn ensure_buffer(&self, capacity: usize) -> Arc<RingBuffer> {
        let mut inner = self.inner.lock();
        Arc::clone(inner.buffer.get_or_insert_with(|| Arc::new(RingBuffer::new(capacity))))
    }

    /// The ring buffer, if allocated.
    pub fn buffer(&self) -> Option<Arc<RingBuffer>> {
        self.inner.lock().buffer.clone()
    }

    /// The ring buffer, only while playing.
    pub fn live_buffer(&self) -> Option<Arc<RingBuffer>> {
        let inner = self.inner.lock();
        if inner.playing {
            inner.buffer.clone()
        } else {
            None
        }
    }

    /// Run `f` against the buffer while holding the state lock.
    ///
    /// Returns `None` without calling `f` when not playing or no buffer exists.
    pub fn with_live_buffer<R>(&self, f: impl FnOnce(&RingBuffer) -> R) -> Option<R> {
        let inner = self.inner.lock();
        match (&inner.buffer, inner.playing) {
            (Some(buffer), true) => Some(f(buffer)),
            _ => None,
        }
    }

    /// Release the ring buffer. Implies not playing.
    pub fn release_buffer(&self) {
        let mut inner = self.inner.lock();
        inner.playing = false;
        inner.buffer = None;
    }

    /// Record bytes the ring buffer could not accept.
    pub fn add_dropped(&self, count: usize) {
        self.dropped_bytes.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Total bytes dropped since the session was created.
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_buffer_requires_playing() {
        let state = PlaybackState::new();
        assert!(state.live_buffer().is_none());

        let buffer = state.ensure_buffer(1024);
        assert!(state.live_buffer().is_none());
        assert!(state.with_live_buffer(|b| b.write(&[1])).is_none());

        state.set_playing(true);
        assert!(Arc::ptr_eq(&state.live_buffer().unwrap(), &buffer));
        assert_eq!(state.with_live_buffer(|b| b.write(&[1, 2])), Some(2));

        state.release_buffer();
        assert!(!state.is_playing());
        assert!(state.buffer().is_none());
    }

    #[test]
    fn test_ensure_buffer_is_lazy_and_reused() {
        let state = PlaybackState::new();
        let first = state.ensure_buffer(1024);
        let second = state.ensure_buffer(4096);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.capacity(), 1024);
    }
}
