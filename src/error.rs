//! Error types for hwstream-core

use thiserror::Error;

/// Result type alias for hwstream-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the streaming pipeline.
///
/// The `Display` text is what the shell receives through
/// [`PlayerEvent::Error`](crate::events::PlayerEvent::Error).
#[derive(Error, Debug)]
pub enum Error {
    /// Input could not be opened
    #[error("Unable to open input {url}: {reason}")]
    OpenInput { url: String, reason: String },

    /// Stream probing failed
    #[error("Unable to find stream info: {0}")]
    StreamInfo(String),

    /// Container carries no video stream
    #[error("Unable to find video stream (no video stream in input)")]
    NoVideoStream,

    /// Codec has no hardware decode path
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Hardware decoder is not compiled into the linked FFmpeg
    #[error("Unable to find hardware decoder {0}")]
    DecoderNotFound(String),

    /// Decoder context could not be allocated or configured
    #[error("Unable to allocate codec context: {0}")]
    ContextAllocation(String),

    /// Hardware device context creation failed
    #[error("Unable to create {device} device context: {reason}")]
    DeviceContext { device: String, reason: String },

    /// Decoder open failed
    #[error("Unable to open codec: {0}")]
    CodecOpen(String),

    /// Decoder refused a packet
    #[error("Packet rejected by decoder: {0}")]
    PacketRejected(String),

    /// Read from the network source failed
    #[error("Stream read failed: {0}")]
    Read(String),

    /// Blocking call aborted because the session is stopping
    #[error("Interrupted by stop request")]
    Interrupted,

    /// Frame allocation failed
    #[error("Unable to allocate frame")]
    FrameAllocation,

    /// Hardware to system memory transfer failed
    #[error("Error transferring the frame to system memory: {0}")]
    Transfer(String),

    /// Color-space or scale conversion failed
    #[error("Frame conversion failed: {0}")]
    Conversion(String),

    /// Decoder failed while emitting frames
    #[error("Decode failed: {0}")]
    Decode(String),

    /// IO error (thread spawn)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures of the session initialization sequence
    pub fn is_initialization(&self) -> bool {
        matches!(
            self,
            Error::OpenInput { .. }
                | Error::StreamInfo(_)
                | Error::NoVideoStream
                | Error::UnsupportedCodec(_)
                | Error::DecoderNotFound(_)
                | Error::ContextAllocation(_)
                | Error::DeviceContext { .. }
                | Error::CodecOpen(_)
        )
    }

    /// True for conditions the pipeline absorbs without tearing down
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::PacketRejected(_) | Error::Read(_) | Error::Interrupted
        )
    }
}
