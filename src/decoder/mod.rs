//! Demux/decode backend abstraction
//!
//! The pipeline is written against three seams:
//! - [`Demuxer`] reads compressed packets from the network source,
//! - [`VideoDecoder`] turns packets into frames and frames into [`RgbFrame`]s,
//! - [`MediaBackend`] runs the initialization sequence that produces both.
//!
//! The FFmpeg/CUDA implementation lives in [`ffmpeg_decoder`].

use crate::error::Result;
use crate::session::config::SessionConfig;
use crate::threading::RunFlag;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_decoder;
mod frame;
mod info;
#[cfg(test)]
pub(crate) mod mock;

#[cfg(feature = "ffmpeg")]
pub(crate) use frame::pts_to_us;
pub use frame::{FrameSize, RgbFrame, RGB_BYTES_PER_PIXEL};
pub use info::{frame_rate_from, CodecKind, StreamInfo};

#[cfg(feature = "ffmpeg")]
pub use ffmpeg_decoder::{init_network, FfmpegBackend, FfmpegDecoder, FfmpegDemuxer};

/// Compressed access unit as produced by the demuxer
pub trait CompressedPacket: Send + 'static {
    /// Index of the container stream the packet belongs to
    fn stream_index(&self) -> usize;
}

/// Reads compressed packets from an opened source
pub trait Demuxer: Send {
    type Packet: CompressedPacket;

    /// Read the next packet of any stream.
    ///
    /// `Ok(None)` means end of stream; `Err` is a read failure the caller
    /// may retry.
    fn read_packet(&mut self) -> Result<Option<Self::Packet>>;
}

/// A frame as emitted by the decoder
#[derive(Debug)]
pub enum DecodedFrame<H, S> {
    /// Pixel data lives in GPU memory and must be transferred first
    Hardware(H),
    /// Pixel data is already in system memory
    System(S),
}

impl<H, S> DecodedFrame<H, S> {
    pub fn is_hardware(&self) -> bool {
        matches!(self, DecodedFrame::Hardware(_))
    }
}

/// Hardware decoder plus the conversion to display RGB
pub trait VideoDecoder: Send {
    type Packet: CompressedPacket;
    type HardwareFrame;
    type SystemFrame;

    /// Submit a packet. An error means the decoder rejected it.
    fn send_packet(&mut self, packet: &Self::Packet) -> Result<()>;

    /// Next frame the decoder is ready to emit, `Ok(None)` when drained
    fn receive_frame(
        &mut self,
    ) -> Result<Option<DecodedFrame<Self::HardwareFrame, Self::SystemFrame>>>;

    /// Copy a GPU-resident frame into a newly allocated system-memory frame
    fn transfer(&mut self, frame: &Self::HardwareFrame) -> Result<Self::SystemFrame>;

    /// Convert a system-memory frame to packed RGB24 at its native size.
    ///
    /// The conversion context is created on the first call and reused.
    fn convert(&mut self, frame: &Self::SystemFrame) -> Result<RgbFrame>;
}

/// Everything the initialization sequence hands to a session
pub struct OpenedStream<D, V> {
    pub demuxer: D,
    pub decoder: V,
    pub info: StreamInfo,
}

/// Source of demuxer/decoder pairs for a URL
pub trait MediaBackend: Send + Sync + 'static {
    type Packet: CompressedPacket;
    type Demuxer: Demuxer<Packet = Self::Packet> + 'static;
    type Decoder: VideoDecoder<Packet = Self::Packet> + 'static;

    /// Open `url` and prepare the hardware decoder for its first video stream.
    ///
    /// Blocking calls inside must give up once `run` is cleared. On error,
    /// everything acquired so far is released before returning.
    fn open(
        &self,
        url: &str,
        config: &SessionConfig,
        run: &RunFlag,
    ) -> Result<OpenedStream<Self::Demuxer, Self::Decoder>>;
}
