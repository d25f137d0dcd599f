//! Media playback backends.
//!
//! A player pulls TS bytes through a [`StreamSource`] (open/read/seek/close)
//! and renders them onto a platform [`VideoSurface`].

mod libvlc;

pub use libvlc::LibVlc;

use std::sync::Arc;

use log::debug;
use thiserror::Error;

/// Playback backend errors.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The media library could not be loaded or is missing a symbol.
    #[error("Failed to load media library: {0}")]
    LibraryLoad(String),

    /// The player instance could not be created.
    #[error("Failed to create player: {0}")]
    PlayerCreate(String),

    /// The callback media object could not be created.
    #[error("Failed to create media: {0}")]
    MediaCreate(String),

    /// The video surface could not be attached.
    #[error("Video surface not supported: {0}")]
    Surface(String),

    /// Playback did not start.
    #[error("Failed to start playback: {0}")]
    Play(String),
}

/// Native window handle the player renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSurface {
    /// X11 window id.
    XWindow(u32),
    /// Win32 `HWND`, as an integer.
    Hwnd(isize),
    /// macOS `NSView*`, as an integer.
    NsView(usize),
}

/// Pull-based byte source handed to a player.
///
/// Implementations must be callable from any thread the player uses.
pub trait StreamSource: Send + Sync {
    /// Called once when the player opens the media.
    fn open(&self) -> bool;

    /// Fill `buf` with up to `buf.len()` bytes.
    ///
    /// `Some(0)` means no data yet and the player should retry. `None` means
    /// the stream has ended.
    fn read(&self, buf: &mut [u8]) -> Option<usize>;

    /// Seek to an absolute offset. Returns false when unsupported.
    fn seek(&self, offset: u64) -> bool;

    /// Called once when the player is done with the media.
    fn close(&self);
}

/// Creates player instances.
pub trait MediaBackend: Send + Sync {
    fn create_player(&self) -> Result<Box<dyn MediaPlayer>, MediaError>;
}

/// One player instance.
///
/// Dropping the player releases it together with any attached media.
pub trait MediaPlayer: Send {
    /// Create a media object reading from `source` and attach it.
    fn attach_source(&mut self, source: Arc<dyn StreamSource>) -> Result<(), MediaError>;

    /// Render into `surface`.
    fn attach_surface(&mut self, surface: VideoSurface) -> Result<(), MediaError>;

    fn play(&mut self) -> Result<(), MediaError>;

    fn stop(&mut self);

    /// Detach and release the current media object, if any.
    fn release_media(&mut self);
}

/// Backend that accepts every request and renders nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMedia;

impl MediaBackend for NullMedia {
    fn create_player(&self) -> Result<Box<dyn MediaPlayer>, MediaError> {
        Ok(Box::new(NullPlayer { source: None }))
    }
}

struct NullPlayer {
    source: Option<Arc<dyn StreamSource>>,
}

impl MediaPlayer for NullPlayer {
    fn attach_source(&mut self, source: Arc<dyn StreamSource>) -> Result<(), MediaError> {
        self.source = Some(source);
        Ok(())
    }

    fn attach_surface(&mut self, surface: VideoSurface) -> Result<(), MediaError> {
        Err(MediaError::Surface(format!("{:?} ignored by null backend", surface)))
    }

    fn play(&mut self) -> Result<(), MediaError> {
        match &self.source {
            Some(source) if source.open() => {
                debug!("[Media] Null player started");
                Ok(())
            }
            Some(_) => Err(MediaError::Play("source refused to open".to_string())),
            None => Err(MediaError::Play("no media attached".to_string())),
        }
    }

    fn stop(&mut self) {
        if let Some(source) = &self.source {
            source.close();
        }
    }

    fn release_media(&mut self) {
        self.source = None;
    }
}
