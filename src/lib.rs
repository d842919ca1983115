//! hwstream-core - GPU-accelerated RTSP streaming decode pipeline
//!
//! This crate turns a network video stream (H.264/HEVC over RTSP) into
//! display-ready RGB frames:
//! - Network demuxing and CUDA decoding via ffmpeg-next
//! - Bounded packet queue between the demux and decode threads
//! - Single-slot frame sink read by the display shell
//! - Frame-ready / error notifications over a channel
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │           FFI Layer                  │
//! │  (C exports via #[no_mangle])        │
//! └─────────────────────────────────────┘
//!                  │
//!                  ▼
//! ┌─────────────────────────────────────┐
//! │         Session Module               │
//! │  (StreamPlayer, demux thread)        │
//! └─────────────────────────────────────┘
//!          │                  │
//!          ▼                  ▼
//! ┌─────────────────┐  ┌────────────────┐
//! │  Packet Queue   │─▶│ Decode Worker  │
//! └─────────────────┘  └────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────┐
//! │   Frame Sink  +  Event Channel       │
//! └─────────────────────────────────────┘
//! ```

pub mod decoder;
pub mod error;
pub mod events;
#[cfg(feature = "ffmpeg")]
pub mod ffi;
pub mod queue;
pub mod session;
pub mod sink;
pub mod threading;

// Re-export main types
pub use decoder::{CodecKind, FrameSize, MediaBackend, RgbFrame, StreamInfo};
#[cfg(feature = "ffmpeg")]
pub use decoder::FfmpegBackend;
pub use error::{Error, Result};
pub use events::PlayerEvent;
pub use queue::{PacketQueue, PushOutcome};
pub use session::config::{OverflowPolicy, SessionConfig};
pub use session::StreamPlayer;
pub use sink::{FrameSink, FrameSnapshot};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library (call once at startup)
pub fn init() {
    // Initialize logging with info level by default if RUST_LOG is not set
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).try_init();

    #[cfg(feature = "ffmpeg")]
    decoder::init_network();

    log::info!("hwstream-core {} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_init() {
        init();
        init();
    }
}
