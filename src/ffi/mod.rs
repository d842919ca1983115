//! FFI exports for the display shell
//!
//! All functions in this module are exported with `#[no_mangle]`
//! and use C-compatible types. Handles are opaque boxes owned by the caller
//! until passed to the matching `_destroy`/`_release` function.

use std::ffi::{c_char, CStr, CString};
use std::ptr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::decoder::{FfmpegBackend, FrameSize, RgbFrame};
use crate::events::PlayerEvent;
use crate::session::config::{OverflowPolicy, SessionConfig};
use crate::session::StreamPlayer;

// Thread-local error storage
thread_local! {
    static LAST_ERROR: std::cell::RefCell<Option<CString>> = const { std::cell::RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Borrow a C string argument; `None` (with last error set) when null or not UTF-8
unsafe fn str_arg<'a>(value: *const c_char, name: &str) -> Option<&'a str> {
    if value.is_null() {
        set_last_error(&format!("{} is null", name));
        return None;
    }
    match CStr::from_ptr(value).to_str() {
        Ok(s) => Some(s),
        Err(_) => {
            set_last_error(&format!("Invalid UTF-8 in {}", name));
            None
        }
    }
}

// =============================================================================
// Result Type
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwsResult {
    Success = 0,
    ErrorInvalidHandle = 1,
    ErrorInvalidArgument = 2,
}

// =============================================================================
// Configuration
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HwsSessionConfig {
    /// Packet queue capacity, 0 keeps the default
    pub queue_capacity: u32,
    /// 0=Block, 1=DropOldest, 2=DropNewest
    pub overflow_policy: u8,
    pub force_tcp: bool,
    /// Socket receive buffer in bytes, 0 keeps the default
    pub buffer_size: u32,
    /// Demux delay bound in microseconds, 0 keeps the default
    pub max_delay_us: u64,
    pub elevated_priority: bool,
}

impl From<&HwsSessionConfig> for SessionConfig {
    fn from(c: &HwsSessionConfig) -> Self {
        let mut config = SessionConfig::default();
        if c.queue_capacity > 0 {
            config.queue_capacity = c.queue_capacity as usize;
        }
        config.overflow_policy = match c.overflow_policy {
            0 => OverflowPolicy::Block,
            2 => OverflowPolicy::DropNewest,
            _ => OverflowPolicy::DropOldest,
        };
        config.transport.force_tcp = c.force_tcp;
        if c.buffer_size > 0 {
            config.transport.buffer_size = c.buffer_size;
        }
        if c.max_delay_us > 0 {
            config.transport.max_delay_us = c.max_delay_us;
        }
        config.elevated_priority = c.elevated_priority;
        config
    }
}

// =============================================================================
// Opaque Handles
// =============================================================================

/// Opaque player handle
pub struct HwsPlayerHandle {
    player: StreamPlayer<FfmpegBackend>,
    // Backing store of the last polled error message
    event_message: Mutex<Option<CString>>,
}

/// Opaque frame handle; keeps the frame alive while the shell reads it
pub struct HwsFrameHandle {
    frame: Arc<RgbFrame>,
}

// =============================================================================
// Library
// =============================================================================

/// Get last error message
#[no_mangle]
pub extern "C" fn hws_get_last_error() -> *const c_char {
    LAST_ERROR.with(|e| e.borrow().as_ref().map(|s| s.as_ptr()).unwrap_or(ptr::null()))
}

/// Clear last error
#[no_mangle]
pub extern "C" fn hws_clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Initialize logging and the network layer.
/// Call once at application startup.
#[no_mangle]
pub extern "C" fn hws_init() {
    crate::init();
}

static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

/// Get library version
#[no_mangle]
pub extern "C" fn hws_get_version() -> *const c_char {
    VERSION.as_ptr() as *const c_char
}

// =============================================================================
// Player Lifecycle
// =============================================================================

/// Create a player. `config` may be null for defaults.
#[no_mangle]
pub extern "C" fn hws_player_create(config: *const HwsSessionConfig) -> *mut HwsPlayerHandle {
    let config = if config.is_null() {
        SessionConfig::default()
    } else {
        unsafe { SessionConfig::from(&*config) }
    };

    Box::into_raw(Box::new(HwsPlayerHandle {
        player: StreamPlayer::new(FfmpegBackend::new(), config),
        event_message: Mutex::new(None),
    }))
}

/// Destroy a player, stopping its session first
#[no_mangle]
pub extern "C" fn hws_player_destroy(handle: *mut HwsPlayerHandle) {
    if !handle.is_null() {
        unsafe {
            drop(Box::from_raw(handle));
        }
    }
}

/// Start playing `url`. Failures arrive later as error events.
#[no_mangle]
pub extern "C" fn hws_player_play(handle: *mut HwsPlayerHandle, url: *const c_char) -> HwsResult {
    if handle.is_null() {
        return HwsResult::ErrorInvalidHandle;
    }
    let url = match unsafe { str_arg(url, "url") } {
        Some(url) => url,
        None => return HwsResult::ErrorInvalidArgument,
    };

    let handle = unsafe { &*handle };
    handle.player.play(url);
    HwsResult::Success
}

/// Stop the current session. Idempotent.
#[no_mangle]
pub extern "C" fn hws_player_stop(handle: *mut HwsPlayerHandle) -> HwsResult {
    if handle.is_null() {
        return HwsResult::ErrorInvalidHandle;
    }
    let handle = unsafe { &*handle };
    handle.player.stop();
    HwsResult::Success
}

/// Check whether a session is running
#[no_mangle]
pub extern "C" fn hws_player_is_running(handle: *const HwsPlayerHandle) -> bool {
    if handle.is_null() {
        return false;
    }
    let handle = unsafe { &*handle };
    handle.player.is_running()
}

// =============================================================================
// Events
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwsEventKind {
    None = 0,
    FrameReady = 1,
    Error = 2,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HwsEvent {
    pub kind: HwsEventKind,
    /// Error text, valid until the next poll on the same handle; null otherwise
    pub message: *const c_char,
}

/// Take the next pending event without blocking.
/// Returns false (kind None) when the queue is empty. At most 64 events are
/// held; frame notifications beyond that are dropped until the shell polls.
#[no_mangle]
pub extern "C" fn hws_player_poll_event(
    handle: *mut HwsPlayerHandle,
    out_event: *mut HwsEvent,
) -> bool {
    if handle.is_null() || out_event.is_null() {
        return false;
    }
    let handle = unsafe { &*handle };

    let mut message = handle.event_message.lock();
    *message = None;

    let event = match handle.player.events().try_recv() {
        Ok(PlayerEvent::FrameReady) => HwsEvent {
            kind: HwsEventKind::FrameReady,
            message: ptr::null(),
        },
        Ok(PlayerEvent::Error(text)) => {
            *message = CString::new(text.replace('\0', " ")).ok();
            HwsEvent {
                kind: HwsEventKind::Error,
                message: message.as_ref().map(|s| s.as_ptr()).unwrap_or(ptr::null()),
            }
        }
        Err(_) => HwsEvent {
            kind: HwsEventKind::None,
            message: ptr::null(),
        },
    };

    unsafe {
        *out_event = event;
    }
    event.kind != HwsEventKind::None
}

// =============================================================================
// Frames
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone)]
pub struct HwsFrame {
    /// Packed RGB24 pixel data
    pub data: *const u8,
    /// Data size in bytes
    pub data_size: usize,
    pub width: u32,
    pub height: u32,
    /// Bytes per row
    pub stride: u32,
    /// Presentation timestamp in microseconds, `i64::MIN` if unknown
    pub pts_us: i64,
    pub frame_number: u64,
}

/// Image-provider entry point: the current frame at its native size.
///
/// The requested size is advisory and ignored. Returns null with 0x0 when
/// no frame has been published yet.
#[no_mangle]
pub extern "C" fn hws_player_request_image(
    handle: *const HwsPlayerHandle,
    id: *const c_char,
    requested_width: u32,
    requested_height: u32,
    out_width: *mut u32,
    out_height: *mut u32,
) -> *mut HwsFrameHandle {
    if handle.is_null() {
        set_last_error("Player handle is null");
        return ptr::null_mut();
    }
    let handle = unsafe { &*handle };

    let id = if id.is_null() {
        ""
    } else {
        unsafe { CStr::from_ptr(id) }.to_str().unwrap_or("")
    };
    let requested = FrameSize::new(requested_width, requested_height);
    let requested = (!requested.is_empty()).then_some(requested);

    let snapshot = handle.player.frame_sink().request_image(id, requested);
    unsafe {
        if !out_width.is_null() {
            *out_width = snapshot.size.width;
        }
        if !out_height.is_null() {
            *out_height = snapshot.size.height;
        }
    }

    match snapshot.frame {
        Some(frame) => Box::into_raw(Box::new(HwsFrameHandle { frame })),
        None => ptr::null_mut(),
    }
}

/// Get frame data from handle
#[no_mangle]
pub extern "C" fn hws_frame_get_data(frame_handle: *const HwsFrameHandle, out_frame: *mut HwsFrame) {
    if frame_handle.is_null() || out_frame.is_null() {
        return;
    }

    let frame = unsafe { &(*frame_handle).frame };

    unsafe {
        *out_frame = HwsFrame {
            data: frame.data().as_ptr(),
            data_size: frame.data_size(),
            width: frame.width(),
            height: frame.height(),
            stride: frame.stride(),
            pts_us: frame.pts_us().unwrap_or(i64::MIN),
            frame_number: frame.frame_number(),
        };
    }
}

/// Release frame handle
#[no_mangle]
pub extern "C" fn hws_frame_release(frame_handle: *mut HwsFrameHandle) {
    if !frame_handle.is_null() {
        unsafe {
            drop(Box::from_raw(frame_handle));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle() {
        assert_eq!(
            hws_player_play(ptr::null_mut(), ptr::null()),
            HwsResult::ErrorInvalidHandle
        );
        assert_eq!(hws_player_stop(ptr::null_mut()), HwsResult::ErrorInvalidHandle);
        assert!(!hws_player_is_running(ptr::null()));
        assert!(hws_player_request_image(
            ptr::null(),
            ptr::null(),
            0,
            0,
            ptr::null_mut(),
            ptr::null_mut()
        )
        .is_null());
        hws_player_destroy(ptr::null_mut());
        hws_frame_release(ptr::null_mut());
    }

    #[test]
    fn test_version() {
        let version = hws_get_version();
        assert!(!version.is_null());
        let version = unsafe { CStr::from_ptr(version) }.to_str().unwrap();
        assert_eq!(version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_play_rejects_null_url() {
        let handle = hws_player_create(ptr::null());
        hws_clear_last_error();
        assert_eq!(
            hws_player_play(handle, ptr::null()),
            HwsResult::ErrorInvalidArgument
        );
        assert!(!hws_get_last_error().is_null());
        assert!(!hws_player_is_running(handle));
        hws_player_destroy(handle);
    }

    #[test]
    fn test_request_image_before_first_frame() {
        let handle = hws_player_create(ptr::null());
        let id = CString::new("live").unwrap();
        let (mut width, mut height) = (1u32, 1u32);

        let frame = hws_player_request_image(handle, id.as_ptr(), 640, 480, &mut width, &mut height);
        assert!(frame.is_null());
        assert_eq!((width, height), (0, 0));

        let mut event = HwsEvent {
            kind: HwsEventKind::FrameReady,
            message: ptr::null(),
        };
        assert!(!hws_player_poll_event(handle, &mut event));
        assert_eq!(event.kind, HwsEventKind::None);
        hws_player_destroy(handle);
    }

    #[test]
    fn test_frame_data_describes_native_frame() {
        let handle = HwsFrameHandle {
            frame: Arc::new(RgbFrame::test_frame(8, 4, 3)),
        };
        let mut out = HwsFrame {
            data: ptr::null(),
            data_size: 0,
            width: 0,
            height: 0,
            stride: 0,
            pts_us: 0,
            frame_number: 0,
        };
        hws_frame_get_data(&handle, &mut out);

        assert!(!out.data.is_null());
        assert_eq!(out.data_size, 8 * 4 * 3);
        assert_eq!((out.width, out.height, out.stride), (8, 4, 24));
        assert_eq!(out.frame_number, 3);
    }

    #[test]
    fn test_config_conversion() {
        let config = SessionConfig::from(&HwsSessionConfig {
            queue_capacity: 0,
            overflow_policy: 0,
            force_tcp: false,
            buffer_size: 0,
            max_delay_us: 500_000,
            elevated_priority: false,
        });
        assert_eq!(config.queue_capacity, SessionConfig::default().queue_capacity);
        assert_eq!(config.overflow_policy, OverflowPolicy::Block);
        assert!(!config.transport.force_tcp);
        assert_eq!(config.transport.max_delay_us, 500_000);
    }
}
