//! `libhdhomerun` tuner backend.
//!
//! The library is loaded at runtime so the crate builds and tests without
//! it installed.

use std::ffi::{c_char, c_int, c_uint, c_void, CString};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use hdhomerun_model::{ChannelMap, DetectedProgram, DeviceId, TuneSpec};
use libloading::Library;
use log::{debug, error, info, trace};
use parking_lot::Mutex;

use super::{ScanAdvance, TunerBackend, TunerDevice, TunerError};

/// File name tried when no explicit library path is configured.
pub const DEFAULT_LIBRARY_NAME: &str = if cfg!(target_os = "windows") {
    "hdhomerun.dll"
} else if cfg!(target_os = "macos") {
    "libhdhomerun.dylib"
} else {
    "libhdhomerun.so"
};

const CHANNELSCAN_MAX_PROGRAM_COUNT: usize = 64;

// FFI layouts from hdhomerun_types.h

#[allow(dead_code)]
#[repr(C)]
struct TunerStatus {
    channel: [c_char; 32],
    lock_str: [c_char; 32],
    signal_present: bool,
    lock_supported: bool,
    lock_unsupported: bool,
    signal_strength: c_uint,
    signal_to_noise_quality: c_uint,
    symbol_error_quality: c_uint,
    raw_bits_per_second: u32,
    packets_per_second: u32,
}

#[allow(dead_code)]
#[repr(C)]
struct ChannelscanProgram {
    program_str: [c_char; 64],
    program_number: u16,
    virtual_major: u16,
    virtual_minor: u16,
    program_type: u16,
    name: [c_char; 32],
}

#[allow(dead_code)]
#[repr(C)]
struct ChannelscanResult {
    channel_str: [c_char; 64],
    channelmap: u32,
    frequency: u32,
    status: TunerStatus,
    program_count: c_int,
    programs: [ChannelscanProgram; CHANNELSCAN_MAX_PROGRAM_COUNT],
    transport_stream_id_detected: bool,
    original_network_id_detected: bool,
    transport_stream_id: u16,
    original_network_id: u16,
}

impl ChannelscanResult {
    fn zeroed() -> Box<Self> {
        // Safety: every field is an integer, bool or array of those; all-zero is valid.
        Box::new(unsafe { std::mem::zeroed() })
    }
}

type DeviceCreateFn =
    unsafe extern "C" fn(device_id: u32, device_ip: u32, tuner: c_uint, dbg: *mut c_void) -> *mut c_void;
type DeviceFn = unsafe extern "C" fn(hd: *mut c_void);
type StreamStartFn = unsafe extern "C" fn(hd: *mut c_void) -> c_int;
type StreamRecvFn =
    unsafe extern "C" fn(hd: *mut c_void, max_size: usize, pactual_size: *mut usize) -> *mut u8;
type SetStringFn = unsafe extern "C" fn(hd: *mut c_void, value: *const c_char) -> c_int;
type ChannelscanStepFn = unsafe extern "C" fn(hd: *mut c_void, result: *mut ChannelscanResult) -> c_int;

/// Resolved entry points. The library stays loaded as long as this lives.
struct Api {
    device_create: DeviceCreateFn,
    device_destroy: DeviceFn,
    stream_start: StreamStartFn,
    stream_recv: StreamRecvFn,
    stream_flush: DeviceFn,
    stream_stop: DeviceFn,
    set_tuner_channel: SetStringFn,
    channelscan_init: SetStringFn,
    channelscan_advance: ChannelscanStepFn,
    channelscan_detect: ChannelscanStepFn,
    _lib: Library,
}

impl Api {
    fn load(path: &Path) -> Result<Self, TunerError> {
        info!("[HDHomeRun] Loading {:?}...", path);
        unsafe {
            let lib = Library::new(path).map_err(|e| {
                let msg = format!("{}: {}", path.display(), e);
                error!("[HDHomeRun] {}", msg);
                TunerError::LibraryLoad(msg)
            })?;

            Ok(Self {
                device_create: symbol(&lib, b"hdhomerun_device_create\0")?,
                device_destroy: symbol(&lib, b"hdhomerun_device_destroy\0")?,
                stream_start: symbol(&lib, b"hdhomerun_device_stream_start\0")?,
                stream_recv: symbol(&lib, b"hdhomerun_device_stream_recv\0")?,
                stream_flush: symbol(&lib, b"hdhomerun_device_stream_flush\0")?,
                stream_stop: symbol(&lib, b"hdhomerun_device_stream_stop\0")?,
                set_tuner_channel: symbol(&lib, b"hdhomerun_device_set_tuner_channel\0")?,
                channelscan_init: symbol(&lib, b"hdhomerun_device_channelscan_init\0")?,
                channelscan_advance: symbol(&lib, b"hdhomerun_device_channelscan_advance\0")?,
                channelscan_detect: symbol(&lib, b"hdhomerun_device_channelscan_detect\0")?,
                _lib: lib,
            })
        }
    }
}

/// Copy a function pointer out of the library.
///
/// Safety: `T` must match the C signature of `name`.
unsafe fn symbol<T: Copy>(lib: &Library, name: &[u8]) -> Result<T, TunerError> {
    lib.get::<T>(name).map(|sym| *sym).map_err(|e| {
        let name = String::from_utf8_lossy(&name[..name.len().saturating_sub(1)]);
        TunerError::LibraryLoad(format!("missing symbol {}: {}", name, e))
    })
}

/// Read a NUL-terminated string out of a fixed-size C buffer.
fn fixed_str(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Identifier for a scanned program: virtual channel, else program number.
fn program_identifier(program: &ChannelscanProgram) -> String {
    match (program.virtual_major, program.virtual_minor, program.program_number) {
        (0, _, 0) => String::new(),
        (0, _, number) => number.to_string(),
        (major, 0, _) => major.to_string(),
        (major, minor, _) => format!("{}.{}", major, minor),
    }
}

/// Tuner backend backed by a dynamically loaded `libhdhomerun`.
#[derive(Clone)]
pub struct LibHdhomerun {
    api: Arc<Api>,
}

impl LibHdhomerun {
    /// Load the library from `path`, or from the default name.
    pub fn load(path: Option<&Path>) -> Result<Self, TunerError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_LIBRARY_NAME));
        Ok(Self {
            api: Arc::new(Api::load(path)?),
        })
    }
}

impl TunerBackend for LibHdhomerun {
    fn open(&self, device_id: DeviceId, tuner_index: u32) -> Result<Arc<dyn TunerDevice>, TunerError> {
        let hd = unsafe { (self.api.device_create)(device_id.as_u32(), 0, tuner_index, ptr::null_mut()) };
        let hd = NonNull::new(hd).ok_or_else(|| {
            error!("[HDHomeRun] hdhomerun_device_create returned null for {}-{}", device_id, tuner_index);
            TunerError::OpenFailed {
                device: device_id,
                tuner: tuner_index,
            }
        })?;

        info!("[HDHomeRun] Opened tuner {}-{}", device_id, tuner_index);
        Ok(Arc::new(HdhomerunDevice {
            api: Arc::clone(&self.api),
            label: format!("{}-{}", device_id, tuner_index),
            inner: Mutex::new(DeviceInner {
                hd,
                scan_result: ChannelscanResult::zeroed(),
            }),
        }))
    }
}

struct DeviceInner {
    hd: NonNull<c_void>,
    /// Filled by advance, read back by detect.
    scan_result: Box<ChannelscanResult>,
}

// Safety: the device pointer is only used while holding the mutex.
unsafe impl Send for DeviceInner {}

/// One open device/tuner pair.
struct HdhomerunDevice {
    api: Arc<Api>,
    label: String,
    inner: Mutex<DeviceInner>,
}

impl TunerDevice for HdhomerunDevice {
    fn stream_start(&self) -> Result<(), TunerError> {
        let inner = self.inner.lock();
        let ret = unsafe { (self.api.stream_start)(inner.hd.as_ptr()) };
        if ret > 0 {
            info!("[HDHomeRun] Stream started on {}", self.label);
            Ok(())
        } else {
            let msg = format!("hdhomerun_device_stream_start returned {} on {}", ret, self.label);
            error!("[HDHomeRun] {}", msg);
            Err(TunerError::StreamStart(msg))
        }
    }

    fn stream_recv(&self, buf: &mut [u8]) -> usize {
        let inner = self.inner.lock();
        let mut actual: usize = 0;
        let data = unsafe { (self.api.stream_recv)(inner.hd.as_ptr(), buf.len(), &mut actual) };
        if data.is_null() || actual == 0 {
            return 0;
        }

        // Guard against a library returning more than requested
        let n = actual.min(buf.len());
        unsafe {
            ptr::copy_nonoverlapping(data, buf.as_mut_ptr(), n);
        }
        trace!("[HDHomeRun] Received {} bytes", n);
        n
    }

    fn stream_flush(&self) {
        let inner = self.inner.lock();
        unsafe { (self.api.stream_flush)(inner.hd.as_ptr()) };
    }

    fn stream_stop(&self) {
        let inner = self.inner.lock();
        unsafe { (self.api.stream_stop)(inner.hd.as_ptr()) };
        debug!("[HDHomeRun] Stream stopped on {}", self.label);
    }

    fn set_channel(&self, spec: &TuneSpec) -> Result<(), TunerError> {
        let channel = CString::new(spec.as_str()).map_err(|e| TunerError::TuneFailed {
            channel: spec.to_string(),
            reason: e.to_string(),
        })?;

        let inner = self.inner.lock();
        let ret = unsafe { (self.api.set_tuner_channel)(inner.hd.as_ptr(), channel.as_ptr()) };
        match ret {
            r if r > 0 => {
                info!("[HDHomeRun] {} tuned to {}", self.label, spec);
                Ok(())
            }
            0 => Err(TunerError::TuneFailed {
                channel: spec.to_string(),
                reason: "rejected by device".to_string(),
            }),
            _ => Err(TunerError::TuneFailed {
                channel: spec.to_string(),
                reason: "communication error".to_string(),
            }),
        }
    }

    fn channelscan_init(&self, map: ChannelMap) -> Result<(), TunerError> {
        let name = map.scan_name();
        let channelmap = CString::new(name).map_err(|e| TunerError::ScanInit {
            map: name,
            reason: e.to_string(),
        })?;

        let inner = self.inner.lock();
        let ret = unsafe { (self.api.channelscan_init)(inner.hd.as_ptr(), channelmap.as_ptr()) };
        if ret > 0 {
            debug!("[HDHomeRun] Channel scan initialised with {} on {}", name, self.label);
            Ok(())
        } else {
            Err(TunerError::ScanInit {
                map: name,
                reason: format!("hdhomerun_device_channelscan_init returned {}", ret),
            })
        }
    }

    fn channelscan_advance(&self) -> Result<ScanAdvance, TunerError> {
        let mut inner = self.inner.lock();
        let hd = inner.hd.as_ptr();
        let result: *mut ChannelscanResult = &mut *inner.scan_result;
        let ret = unsafe { (self.api.channelscan_advance)(hd, result) };

        match ret {
            r if r > 0 => Ok(ScanAdvance::Tuned {
                channel: fixed_str(&inner.scan_result.channel_str),
                frequency: inner.scan_result.frequency,
            }),
            0 => Ok(ScanAdvance::Finished),
            r => Err(TunerError::ScanAdvance(format!(
                "hdhomerun_device_channelscan_advance returned {}",
                r
            ))),
        }
    }

    fn channelscan_detect(&self) -> Result<Vec<DetectedProgram>, TunerError> {
        let mut inner = self.inner.lock();
        let hd = inner.hd.as_ptr();
        let result: *mut ChannelscanResult = &mut *inner.scan_result;
        let ret = unsafe { (self.api.channelscan_detect)(hd, result) };

        if ret < 0 {
            return Err(TunerError::ScanDetect(format!(
                "hdhomerun_device_channelscan_detect returned {}",
                ret
            )));
        }
        if ret == 0 {
            return Ok(Vec::new());
        }

        let scan = &inner.scan_result;
        let count = usize::try_from(scan.program_count)
            .unwrap_or(0)
            .min(CHANNELSCAN_MAX_PROGRAM_COUNT);
        Ok(scan.programs[..count]
            .iter()
            .map(|p| DetectedProgram::new(program_identifier(p), fixed_str(&p.name)))
            .collect())
    }
}

impl Drop for HdhomerunDevice {
    fn drop(&mut self) {
        let inner = self.inner.lock();
        unsafe { (self.api.device_destroy)(inner.hd.as_ptr()) };
        debug!("[HDHomeRun] Released tuner {}", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(number: u16, major: u16, minor: u16) -> ChannelscanProgram {
        let mut p: ChannelscanProgram = unsafe { std::mem::zeroed() };
        p.program_number = number;
        p.virtual_major = major;
        p.virtual_minor = minor;
        p
    }

    #[test]
    fn test_program_identifier() {
        assert_eq!(program_identifier(&program(3, 5, 1)), "5.1");
        assert_eq!(program_identifier(&program(3, 7, 0)), "7");
        assert_eq!(program_identifier(&program(1025, 0, 0)), "1025");
        assert_eq!(program_identifier(&program(0, 0, 0)), "");
    }

    #[test]
    fn test_fixed_str_stops_at_nul() {
        let mut raw = [0 as c_char; 32];
        for (i, b) in b"KQED\0junk".iter().enumerate() {
            raw[i] = *b as c_char;
        }
        assert_eq!(fixed_str(&raw), "KQED");
        assert_eq!(fixed_str(&[0 as c_char; 4]), "");
    }

    #[test]
    fn test_load_missing_library() {
        let err = LibHdhomerun::load(Some(Path::new("/nonexistent/libhdhomerun.so")))
            .err()
            .unwrap();
        assert!(matches!(err, TunerError::LibraryLoad(_)));
    }
}
