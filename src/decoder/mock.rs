//! Scripted in-memory backend for pipeline tests

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::{
    CodecKind, CompressedPacket, DecodedFrame, Demuxer, MediaBackend, OpenedStream, RgbFrame,
    StreamInfo, VideoDecoder,
};
use crate::error::{Error, Result};
use crate::session::config::SessionConfig;
use crate::threading::RunFlag;

pub const VIDEO_STREAM: usize = 0;
pub const AUDIO_STREAM: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockPacket {
    pub id: u64,
    pub stream_index: usize,
}

impl MockPacket {
    pub fn video(id: u64) -> Self {
        Self {
            id,
            stream_index: VIDEO_STREAM,
        }
    }
}

impl CompressedPacket for MockPacket {
    fn stream_index(&self) -> usize {
        self.stream_index
    }
}

pub struct MockHwFrame(u64);
pub struct MockSwFrame(u64);

/// Counts live demuxers/decoders so tests can assert nothing leaks
#[derive(Clone, Default)]
pub struct LiveCounter(Arc<AtomicUsize>);

impl LiveCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn guard(&self) -> LiveGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        LiveGuard(self.0.clone())
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Behaviour knobs and observation points shared with the test
#[derive(Clone)]
pub struct MockScript {
    /// Fail `open` with this error
    pub open_error: Option<fn() -> Error>,
    /// Video packets produced before end of stream; `None` streams forever
    pub video_packets: Option<u64>,
    /// Every n-th read is an audio packet
    pub audio_every: Option<u64>,
    /// Every read fails
    pub read_always_fails: bool,
    /// Pause per read, like a paced network source
    pub read_delay: Duration,
    /// Every n-th submission is rejected
    pub reject_every: Option<u64>,
    /// The n-th transfer fails
    pub fail_transfer_at: Option<u64>,
    /// Decoder emits system-resident frames
    pub system_frames: bool,
    pub width: u32,
    pub height: u32,
    /// Video packet ids in submission order
    pub submitted: Arc<Mutex<Vec<u64>>>,
    pub transfers: Arc<AtomicU64>,
    pub opens: Arc<AtomicUsize>,
    pub live: LiveCounter,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            open_error: None,
            video_packets: None,
            audio_every: None,
            read_always_fails: false,
            read_delay: Duration::from_millis(1),
            reject_every: None,
            fail_transfer_at: None,
            system_frames: false,
            width: 64,
            height: 48,
            submitted: Arc::default(),
            transfers: Arc::default(),
            opens: Arc::default(),
            live: LiveCounter::default(),
        }
    }
}

pub struct MockDemuxer {
    script: MockScript,
    reads: u64,
    next_video_id: u64,
    _live: LiveGuard,
}

impl MockDemuxer {
    pub fn new(script: MockScript) -> Self {
        let live = script.live.guard();
        Self {
            script,
            reads: 0,
            next_video_id: 1,
            _live: live,
        }
    }
}

impl Demuxer for MockDemuxer {
    type Packet = MockPacket;

    fn read_packet(&mut self) -> Result<Option<MockPacket>> {
        thread::sleep(self.script.read_delay);
        if self.script.read_always_fails {
            return Err(Error::Read("connection reset".to_string()));
        }

        if let Some(limit) = self.script.video_packets {
            if self.next_video_id > limit {
                return Ok(None);
            }
        }

        self.reads += 1;
        if let Some(every) = self.script.audio_every {
            if self.reads % every == 0 {
                return Ok(Some(MockPacket {
                    id: 0,
                    stream_index: AUDIO_STREAM,
                }));
            }
        }

        let packet = MockPacket::video(self.next_video_id);
        self.next_video_id += 1;
        Ok(Some(packet))
    }
}

pub struct MockDecoder {
    script: MockScript,
    attempts: u64,
    pending: Option<u64>,
    frame_number: u64,
    _live: LiveGuard,
}

impl MockDecoder {
    pub fn new(script: MockScript) -> Self {
        let live = script.live.guard();
        Self {
            script,
            attempts: 0,
            pending: None,
            frame_number: 0,
            _live: live,
        }
    }
}

impl VideoDecoder for MockDecoder {
    type Packet = MockPacket;
    type HardwareFrame = MockHwFrame;
    type SystemFrame = MockSwFrame;

    fn send_packet(&mut self, packet: &MockPacket) -> Result<()> {
        self.attempts += 1;
        if let Some(every) = self.script.reject_every {
            if self.attempts % every == 0 {
                return Err(Error::PacketRejected("EAGAIN".to_string()));
            }
        }
        assert_eq!(packet.stream_index, VIDEO_STREAM, "audio reached the decoder");
        self.script.submitted.lock().push(packet.id);
        self.pending = Some(packet.id);
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<DecodedFrame<MockHwFrame, MockSwFrame>>> {
        Ok(self.pending.take().map(|id| {
            if self.script.system_frames {
                DecodedFrame::System(MockSwFrame(id))
            } else {
                DecodedFrame::Hardware(MockHwFrame(id))
            }
        }))
    }

    fn transfer(&mut self, frame: &MockHwFrame) -> Result<MockSwFrame> {
        let count = self.script.transfers.fetch_add(1, Ordering::SeqCst) + 1;
        if self.script.fail_transfer_at == Some(count) {
            return Err(Error::Transfer("cuMemcpy2D failed".to_string()));
        }
        Ok(MockSwFrame(frame.0))
    }

    fn convert(&mut self, frame: &MockSwFrame) -> Result<RgbFrame> {
        self.frame_number += 1;
        let (w, h) = (self.script.width, self.script.height);
        let data = vec![(frame.0 % 256) as u8; RgbFrame::expected_size(w, h)];
        RgbFrame::from_packed(data, w, h, Some(frame.0 as i64 * 40_000), self.frame_number)
    }
}

pub struct MockBackend {
    pub script: MockScript,
}

impl MockBackend {
    pub fn new(script: MockScript) -> Self {
        Self { script }
    }
}

impl MediaBackend for MockBackend {
    type Packet = MockPacket;
    type Demuxer = MockDemuxer;
    type Decoder = MockDecoder;

    fn open(
        &self,
        url: &str,
        _config: &SessionConfig,
        _run: &RunFlag,
    ) -> Result<OpenedStream<MockDemuxer, MockDecoder>> {
        self.script.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(make_error) = self.script.open_error {
            return Err(make_error());
        }

        Ok(OpenedStream {
            demuxer: MockDemuxer::new(self.script.clone()),
            decoder: MockDecoder::new(self.script.clone()),
            info: StreamInfo {
                url: url.to_string(),
                stream_index: VIDEO_STREAM,
                codec: CodecKind::H264,
                decoder_name: "mock_cuvid".to_string(),
                width: self.script.width,
                height: self.script.height,
                frame_rate: 25.0,
                container_format: "mock".to_string(),
            },
        })
    }
}
