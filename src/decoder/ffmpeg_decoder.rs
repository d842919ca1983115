//! FFmpeg/CUDA backend using ffmpeg-next
//!
//! Opening runs the initialization sequence: network input with transport
//! options and an interrupt callback, stream probing, video stream
//! selection, hardware decoder lookup and CUDA device attachment. The
//! returned demuxer and decoder are then driven by the session threads.

use std::ffi::{c_void, CString};
use std::os::raw::c_int;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::ffi;
use ffmpeg_next::format::context::Input as FormatContext;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::media::Type as MediaType;
use ffmpeg_next::software::scaling::{Context as ScalerContext, Flags as ScalerFlags};
use ffmpeg_next::util::frame::video::Video as VideoFrameFFmpeg;
use ffmpeg_next::{Dictionary, Rational};

use super::{
    frame_rate_from, pts_to_us, CodecKind, CompressedPacket, DecodedFrame, Demuxer, MediaBackend,
    OpenedStream, RgbFrame, StreamInfo, VideoDecoder,
};
use crate::error::{Error, Result};
use crate::session::config::{HardwareDevice, SessionConfig};
use crate::threading::RunFlag;

static NETWORK_INIT: Once = Once::new();

/// Initialize FFmpeg and its network layer. Runs once per process.
pub fn init_network() {
    NETWORK_INIT.call_once(|| {
        if let Err(e) = ffmpeg::init() {
            log::error!("FFmpeg init failed: {}", e);
        }
        let ret = unsafe { ffi::avformat_network_init() };
        if ret < 0 {
            log::error!("Network initialization failed: {}", ffmpeg::Error::from(ret));
        } else {
            log::debug!("FFmpeg network layer initialized");
        }
    });
}

/// Interrupt callback: non-zero aborts the blocking FFmpeg call in progress
unsafe extern "C" fn interrupt_requested(opaque: *mut c_void) -> c_int {
    if opaque.is_null() {
        return 0;
    }
    let running = &*(opaque as *const AtomicBool);
    (!running.load(Ordering::Acquire)) as c_int
}

/// Real base frame rate of the stream, falling back to the average rate
fn stream_frame_rate(real: Rational, average: Rational) -> f64 {
    let rate = frame_rate_from(real.numerator(), real.denominator());
    if rate > 0.0 {
        rate
    } else {
        frame_rate_from(average.numerator(), average.denominator())
    }
}

fn device_type(device: HardwareDevice) -> ffi::AVHWDeviceType {
    match device {
        HardwareDevice::Cuda => ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA,
    }
}

/// Owned reference to a hardware device context
struct HwDeviceContext {
    ptr: *mut ffi::AVBufferRef,
}

impl HwDeviceContext {
    fn new(device: HardwareDevice) -> Result<Self> {
        let mut ctx: *mut ffi::AVBufferRef = ptr::null_mut();
        let ret = unsafe {
            ffi::av_hwdevice_ctx_create(
                &mut ctx,
                device_type(device),
                ptr::null(),
                ptr::null_mut(),
                0,
            )
        };

        if ret < 0 || ctx.is_null() {
            return Err(Error::DeviceContext {
                device: device.name().to_string(),
                reason: ffmpeg::Error::from(ret).to_string(),
            });
        }

        log::debug!("Created {} device context", device.name());
        Ok(Self { ptr: ctx })
    }

    fn as_ptr(&self) -> *mut ffi::AVBufferRef {
        self.ptr
    }
}

impl Drop for HwDeviceContext {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                ffi::av_buffer_unref(&mut self.ptr);
            }
        }
    }
}

/// Open `url` with transport options and the interrupt callback bound to `run`
fn open_input(url: &str, config: &SessionConfig, run: &RunFlag) -> Result<FormatContext> {
    let open_error = |reason: String| Error::OpenInput {
        url: url.to_string(),
        reason,
    };

    let c_url = CString::new(url).map_err(|e| open_error(e.to_string()))?;

    let mut options = Dictionary::new();
    for (key, value) in config.transport.to_options() {
        options.set(key, &value);
    }

    unsafe {
        let mut ctx = ffi::avformat_alloc_context();
        if ctx.is_null() {
            return Err(open_error("unable to allocate format context".to_string()));
        }
        (*ctx).interrupt_callback = ffi::AVIOInterruptCB {
            callback: Some(interrupt_requested),
            opaque: run.as_ptr() as *mut c_void,
        };

        let mut opts = options.disown();
        let ret = ffi::avformat_open_input(&mut ctx, c_url.as_ptr(), ptr::null(), &mut opts);
        // Entries FFmpeg did not consume
        let unused = Dictionary::own(opts);
        for (key, _) in unused.iter() {
            log::debug!("Demuxer ignored option '{}'", key);
        }

        // On failure FFmpeg frees the context itself
        if ret < 0 {
            return Err(match ffmpeg::Error::from(ret) {
                ffmpeg::Error::Exit => Error::Interrupted,
                e => open_error(e.to_string()),
            });
        }

        Ok(FormatContext::wrap(ctx))
    }
}

fn codec_kind(id: ffmpeg::codec::Id) -> Result<CodecKind> {
    match id {
        ffmpeg::codec::Id::H264 => Ok(CodecKind::H264),
        ffmpeg::codec::Id::HEVC => Ok(CodecKind::Hevc),
        other => Err(Error::UnsupportedCodec(format!("{:?}", other))),
    }
}

/// Backend that opens network sources with FFmpeg and decodes on the GPU
#[derive(Debug, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        init_network();
        Self
    }
}

impl MediaBackend for FfmpegBackend {
    type Packet = ffmpeg::Packet;
    type Demuxer = FfmpegDemuxer;
    type Decoder = FfmpegDecoder;

    fn open(
        &self,
        url: &str,
        config: &SessionConfig,
        run: &RunFlag,
    ) -> Result<OpenedStream<FfmpegDemuxer, FfmpegDecoder>> {
        init_network();

        let mut input = open_input(url, config, run)?;
        log::debug!("Opened input: {}", url);

        let ret = unsafe { ffi::avformat_find_stream_info(input.as_mut_ptr(), ptr::null_mut()) };
        if ret < 0 {
            return Err(match ffmpeg::Error::from(ret) {
                ffmpeg::Error::Exit => Error::Interrupted,
                e => Error::StreamInfo(e.to_string()),
            });
        }

        // First video stream in container order
        let stream = input
            .streams()
            .find(|stream| stream.parameters().medium() == MediaType::Video)
            .ok_or(Error::NoVideoStream)?;

        let stream_index = stream.index();
        let params = stream.parameters();
        let codec = codec_kind(params.id())?;
        let time_base = stream.time_base();

        let frame_rate = stream_frame_rate(stream.rate(), stream.avg_frame_rate());

        let (width, height) = unsafe { ((*params.as_ptr()).width, (*params.as_ptr()).height) };

        let decoder_name = codec.hardware_decoder_name(config.device);
        let decoder_codec = ffmpeg::decoder::find_by_name(decoder_name)
            .ok_or_else(|| Error::DecoderNotFound(decoder_name.to_string()))?;

        let mut decoder_ctx = CodecContext::new_with_codec(decoder_codec);
        decoder_ctx
            .set_parameters(params)
            .map_err(|e| Error::ContextAllocation(e.to_string()))?;

        let device = HwDeviceContext::new(config.device)?;
        unsafe {
            (*decoder_ctx.as_mut_ptr()).hw_device_ctx = ffi::av_buffer_ref(device.as_ptr());
        }

        let decoder = decoder_ctx
            .decoder()
            .video()
            .map_err(|e| Error::CodecOpen(e.to_string()))?;

        if !run.is_running() {
            return Err(Error::Interrupted);
        }

        let container_format = input
            .format()
            .name()
            .split(',')
            .next()
            .unwrap_or("unknown")
            .to_string();

        let info = StreamInfo {
            url: url.to_string(),
            stream_index,
            codec,
            decoder_name: decoder_name.to_string(),
            width: width.max(0) as u32,
            height: height.max(0) as u32,
            frame_rate,
            container_format,
        };

        Ok(OpenedStream {
            demuxer: FfmpegDemuxer {
                input,
                _interrupt: run.clone(),
            },
            decoder: FfmpegDecoder {
                decoder,
                converter: RgbConverter::new(),
                _device: device,
                time_base,
            },
            info,
        })
    }
}

impl CompressedPacket for ffmpeg::Packet {
    fn stream_index(&self) -> usize {
        self.stream()
    }
}

/// Packet reader over an opened input
pub struct FfmpegDemuxer {
    input: FormatContext,
    // Target of the interrupt callback; declared after `input` so it outlives it
    _interrupt: RunFlag,
}

// SAFETY: the format context is only touched from the thread that owns the
// demuxer; the interrupt target is an Arc'd atomic.
unsafe impl Send for FfmpegDemuxer {}

impl Demuxer for FfmpegDemuxer {
    type Packet = ffmpeg::Packet;

    fn read_packet(&mut self) -> Result<Option<ffmpeg::Packet>> {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => Ok(Some(packet)),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(ffmpeg::Error::Exit) => Err(Error::Interrupted),
            Err(e) => Err(Error::Read(e.to_string())),
        }
    }
}

/// RGB24 conversion bound to the format and size of the first frame it sees
struct RgbConverter {
    scaler: Option<ScalerContext>,
    frame_number: u64,
}

impl RgbConverter {
    fn new() -> Self {
        Self {
            scaler: None,
            frame_number: 0,
        }
    }

    fn convert(&mut self, frame: &VideoFrameFFmpeg, pts_us: Option<i64>) -> Result<RgbFrame> {
        let (format, width, height) = (frame.format(), frame.width(), frame.height());

        if self.scaler.is_none() {
            let scaler = ScalerContext::get(
                format,
                width,
                height,
                Pixel::RGB24,
                width,
                height,
                ScalerFlags::BILINEAR,
            )
            .map_err(|e| Error::Conversion(format!("unable to create scaler: {}", e)))?;
            log::info!("Scaler initialized: {:?} {}x{} -> RGB24", format, width, height);
            self.scaler = Some(scaler);
        }

        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| Error::Conversion("scaler unavailable".to_string()))?;

        let input = scaler.input();
        if input.format != format || input.width != width || input.height != height {
            return Err(Error::Conversion(format!(
                "frame changed from {:?} {}x{} to {:?} {}x{}",
                input.format, input.width, input.height, format, width, height
            )));
        }

        let mut rgb = VideoFrameFFmpeg::empty();
        scaler
            .run(frame, &mut rgb)
            .map_err(|e| Error::Conversion(e.to_string()))?;

        self.frame_number += 1;
        RgbFrame::from_strided(
            rgb.data(0),
            rgb.stride(0),
            width,
            height,
            pts_us,
            self.frame_number,
        )
    }
}

/// Hardware decoder plus its RGB24 converter
pub struct FfmpegDecoder {
    decoder: ffmpeg::decoder::Video,
    converter: RgbConverter,
    // The codec context holds its own reference; this one is released last
    _device: HwDeviceContext,
    time_base: Rational,
}

// SAFETY: the decoder, scaler and device reference are owned exclusively by
// the decode thread once handed over.
unsafe impl Send for FfmpegDecoder {}

impl FfmpegDecoder {
    fn pts_us(&self, frame: &VideoFrameFFmpeg) -> Option<i64> {
        frame
            .pts()
            .map(|pts| pts_to_us(pts, self.time_base.numerator(), self.time_base.denominator()))
    }
}

impl VideoDecoder for FfmpegDecoder {
    type Packet = ffmpeg::Packet;
    type HardwareFrame = VideoFrameFFmpeg;
    type SystemFrame = VideoFrameFFmpeg;

    fn send_packet(&mut self, packet: &ffmpeg::Packet) -> Result<()> {
        self.decoder
            .send_packet(packet)
            .map_err(|e| Error::PacketRejected(e.to_string()))
    }

    fn receive_frame(
        &mut self,
    ) -> Result<Option<DecodedFrame<VideoFrameFFmpeg, VideoFrameFFmpeg>>> {
        let mut frame = VideoFrameFFmpeg::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => {}
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                return Ok(None)
            }
            Err(ffmpeg::Error::Eof) => return Ok(None),
            Err(e) => return Err(Error::Decode(e.to_string())),
        }

        let on_device = unsafe { !(*frame.as_ptr()).hw_frames_ctx.is_null() };
        if on_device {
            Ok(Some(DecodedFrame::Hardware(frame)))
        } else {
            Ok(Some(DecodedFrame::System(frame)))
        }
    }

    fn transfer(&mut self, frame: &VideoFrameFFmpeg) -> Result<VideoFrameFFmpeg> {
        let mut sw_frame = VideoFrameFFmpeg::empty();
        if unsafe { sw_frame.as_ptr().is_null() } {
            return Err(Error::FrameAllocation);
        }

        let ret = unsafe { ffi::av_hwframe_transfer_data(sw_frame.as_mut_ptr(), frame.as_ptr(), 0) };
        if ret < 0 {
            return Err(Error::Transfer(ffmpeg::Error::from(ret).to_string()));
        }

        unsafe {
            (*sw_frame.as_mut_ptr()).pts = (*frame.as_ptr()).pts;
        }
        Ok(sw_frame)
    }

    fn convert(&mut self, frame: &VideoFrameFFmpeg) -> Result<RgbFrame> {
        let pts_us = self.pts_us(frame);
        self.converter.convert(frame, pts_us)
    }
}
