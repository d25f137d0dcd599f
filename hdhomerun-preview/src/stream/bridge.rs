//! Player-facing read side of the playback ring buffer.

use std::sync::Arc;

use log::debug;

use crate::media::StreamSource;
use crate::stream::PlaybackState;

/// Adapts the session's ring buffer to the player's pull callbacks.
///
/// Reads never block. An empty buffer reads as `Some(0)`; once playback is
/// stopped `read` returns `None` so the player sees end of stream.
pub struct PlaybackBridge {
    playback: Arc<PlaybackState>,
}

impl PlaybackBridge {
    pub fn new(playback: Arc<PlaybackState>) -> Self {
        Self { playback }
    }
}

impl StreamSource for PlaybackBridge {
    fn open(&self) -> bool {
        debug!("[Bridge] Opened by player");
        true
    }

    fn read(&self, buf: &mut [u8]) -> Option<usize> {
        self.playback.live_buffer().map(|buffer| buffer.read_into(buf))
    }

    fn seek(&self, _offset: u64) -> bool {
        // Live stream
        false
    }

    fn close(&self) {
        debug!("[Bridge] Closed by player");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_reports_end_when_stopped() {
        let playback = PlaybackState::new();
        let bridge = PlaybackBridge::new(Arc::clone(&playback));
        let mut buf = [0u8; 16];
        assert_eq!(bridge.read(&mut buf), None);

        let buffer = playback.ensure_buffer(64);
        playback.set_playing(true);
        buffer.write(&[1, 2, 3]);
        playback.set_playing(false);
        assert_eq!(bridge.read(&mut buf), None);
        assert_eq!(buffer.available(), 3);
    }

    #[test]
    fn test_read_drains_in_order() {
        let playback = PlaybackState::new();
        let buffer = playback.ensure_buffer(64);
        playback.set_playing(true);
        buffer.write(&[1, 2, 3, 4, 5]);

        let bridge = PlaybackBridge::new(playback);
        let mut buf = [0u8; 3];
        assert!(bridge.open());
        assert_eq!(bridge.read(&mut buf), Some(3));
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(bridge.read(&mut buf), Some(2));
        assert_eq!(&buf[..2], &[4, 5]);
        // Empty but still live
        assert_eq!(bridge.read(&mut buf), Some(0));
    }

    #[test]
    fn test_seek_unsupported() {
        let bridge = PlaybackBridge::new(PlaybackState::new());
        assert!(!bridge.seek(0));
        assert!(!bridge.seek(1024));
    }
}
