//! `libvlc` media backend with callback-driven input.
//!
//! The library is loaded at runtime. The TS stream is handed to VLC via
//! `libvlc_media_new_callbacks`; the opaque pointer is the stream source,
//! which the media wrapper keeps alive until VLC has let go of it.

use std::ffi::{c_char, c_int, c_void, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::Arc;
use std::time::Duration;

use libloading::Library;
use log::{debug, error, info};

use super::{MediaBackend, MediaError, MediaPlayer, StreamSource, VideoSurface};

/// File name tried when no explicit library path is configured.
pub const DEFAULT_LIBRARY_NAME: &str = if cfg!(target_os = "windows") {
    "libvlc.dll"
} else if cfg!(target_os = "macos") {
    "libvlc.dylib"
} else {
    "libvlc.so.5"
};

/// Read callback retry interval while the source is live but empty.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(10);

type OpenCb = unsafe extern "C" fn(opaque: *mut c_void, datap: *mut *mut c_void, sizep: *mut u64) -> c_int;
type ReadCb = unsafe extern "C" fn(opaque: *mut c_void, buf: *mut u8, len: usize) -> isize;
type SeekCb = unsafe extern "C" fn(opaque: *mut c_void, offset: u64) -> c_int;
type CloseCb = unsafe extern "C" fn(opaque: *mut c_void);

type NewFn = unsafe extern "C" fn(argc: c_int, argv: *const *const c_char) -> *mut c_void;
type ReleaseFn = unsafe extern "C" fn(obj: *mut c_void);
type PlayerNewFn = unsafe extern "C" fn(instance: *mut c_void) -> *mut c_void;
type MediaNewCallbacksFn = unsafe extern "C" fn(
    instance: *mut c_void,
    open_cb: OpenCb,
    read_cb: ReadCb,
    seek_cb: SeekCb,
    close_cb: CloseCb,
    opaque: *mut c_void,
) -> *mut c_void;
type SetMediaFn = unsafe extern "C" fn(mp: *mut c_void, md: *mut c_void);
type SetXWindowFn = unsafe extern "C" fn(mp: *mut c_void, drawable: u32);
type SetHandleFn = unsafe extern "C" fn(mp: *mut c_void, handle: *mut c_void);
type PlayFn = unsafe extern "C" fn(mp: *mut c_void) -> c_int;

struct VlcApi {
    new: NewFn,
    release: ReleaseFn,
    player_new: PlayerNewFn,
    player_release: ReleaseFn,
    media_new_callbacks: MediaNewCallbacksFn,
    media_release: ReleaseFn,
    set_media: SetMediaFn,
    set_xwindow: SetXWindowFn,
    set_hwnd: SetHandleFn,
    set_nsobject: SetHandleFn,
    play: PlayFn,
    stop: ReleaseFn,
    _lib: Library,
}

impl VlcApi {
    fn load(path: &Path) -> Result<Self, MediaError> {
        info!("[VLC] Loading {:?}...", path);
        unsafe {
            let lib = Library::new(path).map_err(|e| {
                let msg = format!("{}: {}", path.display(), e);
                error!("[VLC] {}", msg);
                MediaError::LibraryLoad(msg)
            })?;

            Ok(Self {
                new: symbol(&lib, b"libvlc_new\0")?,
                release: symbol(&lib, b"libvlc_release\0")?,
                player_new: symbol(&lib, b"libvlc_media_player_new\0")?,
                player_release: symbol(&lib, b"libvlc_media_player_release\0")?,
                media_new_callbacks: symbol(&lib, b"libvlc_media_new_callbacks\0")?,
                media_release: symbol(&lib, b"libvlc_media_release\0")?,
                set_media: symbol(&lib, b"libvlc_media_player_set_media\0")?,
                set_xwindow: symbol(&lib, b"libvlc_media_player_set_xwindow\0")?,
                set_hwnd: symbol(&lib, b"libvlc_media_player_set_hwnd\0")?,
                set_nsobject: symbol(&lib, b"libvlc_media_player_set_nsobject\0")?,
                play: symbol(&lib, b"libvlc_media_player_play\0")?,
                stop: symbol(&lib, b"libvlc_media_player_stop\0")?,
                _lib: lib,
            })
        }
    }
}

/// Safety: `T` must match the C signature of `name`.
unsafe fn symbol<T: Copy>(lib: &Library, name: &[u8]) -> Result<T, MediaError> {
    lib.get::<T>(name).map(|sym| *sym).map_err(|e| {
        let name = String::from_utf8_lossy(&name[..name.len().saturating_sub(1)]);
        MediaError::LibraryLoad(format!("missing symbol {}: {}", name, e))
    })
}

// =============================================================================
// Input callbacks
// =============================================================================

/// Recover the stream source from the opaque pointer.
///
/// Safety: `opaque` must come from [`VlcMedia::new`] and the media must be alive.
unsafe fn source_from<'a>(opaque: *mut c_void) -> &'a Arc<dyn StreamSource> {
    &*(opaque as *const Arc<dyn StreamSource>)
}

unsafe extern "C" fn open_cb(opaque: *mut c_void, datap: *mut *mut c_void, sizep: *mut u64) -> c_int {
    *datap = opaque;
    *sizep = u64::MAX; // live stream, size unknown
    catch_unwind(AssertUnwindSafe(|| unsafe { if source_from(opaque).open() { 0 } else { -1 } })).unwrap_or(-1)
}

/// libvlc reads 0 as end of stream, so an empty live source is polled until
/// data arrives or the source ends.
unsafe extern "C" fn read_cb(opaque: *mut c_void, buf: *mut u8, len: usize) -> isize {
    if buf.is_null() || len == 0 {
        return 0;
    }
    catch_unwind(AssertUnwindSafe(|| unsafe {
        let dest = std::slice::from_raw_parts_mut(buf, len);
        let source = source_from(opaque);
        loop {
            match source.read(dest) {
                Some(0) => std::thread::sleep(READ_POLL_INTERVAL),
                Some(n) => return n as isize,
                None => return 0,
            }
        }
    }))
    .unwrap_or(-1)
}

unsafe extern "C" fn seek_cb(opaque: *mut c_void, offset: u64) -> c_int {
    catch_unwind(AssertUnwindSafe(|| unsafe { if source_from(opaque).seek(offset) { 0 } else { -1 } })).unwrap_or(-1)
}

unsafe extern "C" fn close_cb(opaque: *mut c_void) {
    let _ = catch_unwind(AssertUnwindSafe(|| unsafe { source_from(opaque).close() }));
}

// =============================================================================
// Instance / player / media wrappers
// =============================================================================

struct VlcInstance {
    api: Arc<VlcApi>,
    raw: NonNull<c_void>,
}

// Safety: libvlc instances are thread-safe.
unsafe impl Send for VlcInstance {}
unsafe impl Sync for VlcInstance {}

impl Drop for VlcInstance {
    fn drop(&mut self) {
        unsafe { (self.api.release)(self.raw.as_ptr()) };
        debug!("[VLC] Instance released");
    }
}

/// Media object plus the source its callbacks dereference.
struct VlcMedia {
    api: Arc<VlcApi>,
    raw: NonNull<c_void>,
    /// Boxed so the opaque pointer stays stable; dropped after `raw` is released.
    _source: Box<Arc<dyn StreamSource>>,
}

impl VlcMedia {
    fn new(instance: &VlcInstance, source: Arc<dyn StreamSource>) -> Result<Self, MediaError> {
        let source = Box::new(source);
        let opaque = &*source as *const Arc<dyn StreamSource> as *mut c_void;
        let api = &instance.api;
        let raw = unsafe {
            (api.media_new_callbacks)(instance.raw.as_ptr(), open_cb, read_cb, seek_cb, close_cb, opaque)
        };
        let raw = NonNull::new(raw)
            .ok_or_else(|| MediaError::MediaCreate("libvlc_media_new_callbacks returned null".to_string()))?;
        Ok(Self {
            api: Arc::clone(api),
            raw,
            _source: source,
        })
    }
}

impl Drop for VlcMedia {
    fn drop(&mut self) {
        unsafe { (self.api.media_release)(self.raw.as_ptr()) };
    }
}

/// Media backend backed by a dynamically loaded `libvlc`.
pub struct LibVlc {
    instance: Arc<VlcInstance>,
}

impl LibVlc {
    /// Load the library and create one libvlc instance with `args`.
    pub fn load(path: Option<&Path>, args: &[String]) -> Result<Self, MediaError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_LIBRARY_NAME));
        let api = Arc::new(VlcApi::load(path)?);

        let args: Vec<CString> = args
            .iter()
            .map(|a| CString::new(a.as_str()))
            .collect::<Result<_, _>>()
            .map_err(|e| MediaError::PlayerCreate(format!("invalid libvlc argument: {}", e)))?;
        let argv: Vec<*const c_char> = args.iter().map(|a| a.as_ptr()).collect();

        let raw = unsafe { (api.new)(argv.len() as c_int, argv.as_ptr()) };
        let raw = NonNull::new(raw).ok_or_else(|| MediaError::PlayerCreate("libvlc_new returned null".to_string()))?;
        info!("[VLC] Instance created");

        Ok(Self {
            instance: Arc::new(VlcInstance { api, raw }),
        })
    }
}

impl MediaBackend for LibVlc {
    fn create_player(&self) -> Result<Box<dyn MediaPlayer>, MediaError> {
        let api = &self.instance.api;
        let raw = unsafe { (api.player_new)(self.instance.raw.as_ptr()) };
        let raw = NonNull::new(raw)
            .ok_or_else(|| MediaError::PlayerCreate("libvlc_media_player_new returned null".to_string()))?;
        Ok(Box::new(VlcPlayer {
            instance: Arc::clone(&self.instance),
            raw,
            media: None,
        }))
    }
}

struct VlcPlayer {
    instance: Arc<VlcInstance>,
    raw: NonNull<c_void>,
    media: Option<VlcMedia>,
}

// Safety: libvlc media players may be driven from any thread.
unsafe impl Send for VlcPlayer {}

impl MediaPlayer for VlcPlayer {
    fn attach_source(&mut self, source: Arc<dyn StreamSource>) -> Result<(), MediaError> {
        self.release_media();
        let media = VlcMedia::new(&self.instance, source)?;
        unsafe { (self.instance.api.set_media)(self.raw.as_ptr(), media.raw.as_ptr()) };
        self.media = Some(media);
        Ok(())
    }

    fn attach_surface(&mut self, surface: VideoSurface) -> Result<(), MediaError> {
        let api = &self.instance.api;
        let mp = self.raw.as_ptr();
        unsafe {
            match surface {
                VideoSurface::XWindow(xid) => (api.set_xwindow)(mp, xid),
                VideoSurface::Hwnd(hwnd) => (api.set_hwnd)(mp, hwnd as *mut c_void),
                VideoSurface::NsView(view) => (api.set_nsobject)(mp, view as *mut c_void),
            }
        }
        debug!("[VLC] Video output attached to {:?}", surface);
        Ok(())
    }

    fn play(&mut self) -> Result<(), MediaError> {
        if self.media.is_none() {
            return Err(MediaError::Play("no media attached".to_string()));
        }
        let ret = unsafe { (self.instance.api.play)(self.raw.as_ptr()) };
        if ret == 0 {
            Ok(())
        } else {
            Err(MediaError::Play(format!("libvlc_media_player_play returned {}", ret)))
        }
    }

    fn stop(&mut self) {
        unsafe { (self.instance.api.stop)(self.raw.as_ptr()) };
    }

    fn release_media(&mut self) {
        if let Some(media) = self.media.take() {
            // Detach first so no callback can reach the source once it is dropped
            unsafe { (self.instance.api.set_media)(self.raw.as_ptr(), ptr::null_mut()) };
            drop(media);
        }
    }
}

impl Drop for VlcPlayer {
    fn drop(&mut self) {
        self.stop();
        self.release_media();
        unsafe { (self.instance.api.player_release)(self.raw.as_ptr()) };
        debug!("[VLC] Player released");
    }
}
