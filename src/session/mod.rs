//! Playback sessions
//!
//! [`StreamPlayer`] is the control surface the shell talks to (`play`/`stop`,
//! frame sink, event channel). Each successful `play` creates one
//! [`StreamSession`], which owns two threads:
//!
//! ```text
//!  demux-N thread                      decode-N thread
//! ┌──────────────────┐  PacketQueue  ┌──────────────────┐  FrameSink
//! │ backend.open()   │ ───────────▶ │ send / receive   │ ──────────▶ shell
//! │ read_packet loop │              │ transfer/convert │  FrameReady
//! └──────────────────┘              └──────────────────┘
//! ```
//!
//! The sink, queue and event channel belong to the player and outlive sessions.

pub mod config;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};

use crate::decoder::{CompressedPacket, Demuxer, MediaBackend, OpenedStream, StreamInfo};
use crate::error::Result;
use crate::events::{self, EventSender, PlayerEvent};
use crate::queue::{PacketQueue, PushOutcome};
use crate::sink::FrameSink;
use crate::threading::{self, DecodeWorker, RunFlag, WorkerSummary};

use config::{ReadRetryPolicy, SessionConfig};

type WorkerSlot = Arc<Mutex<Option<JoinHandle<WorkerSummary>>>>;

/// One `play` run: the demux thread, the decode thread and their run flag
pub struct StreamSession<P: CompressedPacket> {
    id: u64,
    url: String,
    run: RunFlag,
    producer: Option<JoinHandle<()>>,
    consumer: WorkerSlot,
    info: Arc<RwLock<Option<StreamInfo>>>,
    queue: Arc<PacketQueue<P>>,
}

impl<P: CompressedPacket> StreamSession<P> {
    fn start<B: MediaBackend<Packet = P>>(
        id: u64,
        url: String,
        backend: Arc<B>,
        config: SessionConfig,
        queue: Arc<PacketQueue<P>>,
        sink: Arc<FrameSink>,
        events: EventSender,
    ) -> Result<Self> {
        let run = RunFlag::running();
        let consumer: WorkerSlot = Arc::new(Mutex::new(None));
        let info = Arc::new(RwLock::new(None));

        let producer = Producer {
            id,
            url: url.clone(),
            backend,
            config,
            queue: queue.clone(),
            sink,
            events,
            run: run.clone(),
            consumer: consumer.clone(),
            info: info.clone(),
        };

        let handle = thread::Builder::new()
            .name(format!("demux-{}", id))
            .spawn(move || producer.run())?;

        log::info!("Session {} started for {}", id, url);

        Ok(Self {
            id,
            url,
            run,
            producer: Some(handle),
            consumer,
            info,
            queue,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// True while the demux thread is alive
    pub fn is_running(&self) -> bool {
        self.producer
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.info.read().clone()
    }

    /// Clear the run flag and join both threads. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.run.clear();
        self.queue.close();

        if let Some(producer) = self.producer.take() {
            if producer.join().is_err() {
                log::error!("Session {} demux thread panicked", self.id);
            }
        }

        // Taken after the producer exits, so the slot can no longer be filled
        join_worker(self.id, &self.consumer);
    }
}

fn join_worker(id: u64, slot: &WorkerSlot) {
    let consumer = slot.lock().take();
    if let Some(consumer) = consumer {
        match consumer.join() {
            Ok(summary) => log::info!(
                "Session {} decode summary: {} submitted, {} rejected, {} frames, {:?}",
                id,
                summary.packets_submitted,
                summary.packets_rejected,
                summary.frames_published,
                summary.exit
            ),
            Err(_) => log::error!("Session {} decode thread panicked", id),
        }
    }
}

impl<P: CompressedPacket> Drop for StreamSession<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State moved into the demux thread
struct Producer<B: MediaBackend> {
    id: u64,
    url: String,
    backend: Arc<B>,
    config: SessionConfig,
    queue: Arc<PacketQueue<B::Packet>>,
    sink: Arc<FrameSink>,
    events: EventSender,
    run: RunFlag,
    consumer: WorkerSlot,
    info: Arc<RwLock<Option<StreamInfo>>>,
}

impl<B: MediaBackend> Producer<B> {
    fn run(self) {
        let opened = match self.backend.open(&self.url, &self.config, &self.run) {
            Ok(opened) => opened,
            Err(e) => {
                if self.run.is_running() {
                    self.events.error(e.to_string());
                } else {
                    log::debug!("Session {} initialization aborted by stop: {}", self.id, e);
                }
                self.run.clear();
                return;
            }
        };

        let OpenedStream {
            mut demuxer,
            decoder,
            info,
        } = opened;

        if !self.run.is_running() {
            log::debug!("Session {} stopped during initialization", self.id);
            return;
        }

        log::info!(
            "Session {}: {} {}x{} @ {:.2} fps via {} (stream {}, {})",
            self.id,
            info.codec,
            info.width,
            info.height,
            info.frame_rate,
            info.decoder_name,
            info.stream_index,
            info.container_format
        );
        let stream_index = info.stream_index;
        *self.info.write() = Some(info);

        let worker = DecodeWorker::new(
            decoder,
            self.queue.clone(),
            self.sink.clone(),
            self.events.clone(),
            self.run.clone(),
            self.config.pop_timeout,
        );
        match worker.spawn(self.id) {
            Ok(handle) => *self.consumer.lock() = Some(handle),
            Err(e) => {
                self.events.error(e.to_string());
                self.run.clear();
                return;
            }
        }

        if self.config.elevated_priority && threading::raise_current_thread_priority() {
            log::debug!("Session {} demux thread running at elevated priority", self.id);
        }

        let failure = demux_loop(
            &mut demuxer,
            stream_index,
            &self.queue,
            &self.run,
            &self.config.read_retry,
        );
        log::debug!("Session {} demux loop exited", self.id);

        if let Some(message) = failure {
            // The worker must be gone before the error goes out, so no frame follows it
            self.run.clear();
            self.queue.close();
            join_worker(self.id, &self.consumer);
            self.events.error(message);
        }
    }
}

/// Read packets until stopped, queueing those of the selected stream.
///
/// Returns the failure message when read retries ran out.
fn demux_loop<D: Demuxer>(
    demuxer: &mut D,
    stream_index: usize,
    queue: &PacketQueue<D::Packet>,
    run: &RunFlag,
    retry: &ReadRetryPolicy,
) -> Option<String> {
    let mut failures = 0u32;

    while run.is_running() {
        match demuxer.read_packet() {
            Ok(Some(packet)) => {
                failures = 0;
                // Packets of other streams are released here
                if packet.stream_index() != stream_index {
                    continue;
                }
                match queue.push(packet) {
                    PushOutcome::Queued => {}
                    PushOutcome::DroppedOldest | PushOutcome::DroppedNewest => {
                        log::debug!(
                            "Packet queue full, {} packets dropped so far",
                            queue.dropped_count()
                        );
                    }
                    PushOutcome::Closed => return None,
                }
            }
            Ok(None) => {
                log::info!("End of stream");
                return None;
            }
            Err(e) => {
                if !run.is_running() {
                    return None;
                }
                failures += 1;
                if retry.exhausted(failures) {
                    return Some(format!("{} ({} consecutive failures)", e, failures));
                }
                let backoff = retry.backoff_for(failures);
                log::warn!("{}; retrying in {:?}", e, backoff);
                run.sleep(backoff);
            }
        }
    }
    None
}

struct PlayerState<P: CompressedPacket> {
    url: Option<String>,
    session: Option<StreamSession<P>>,
    next_session_id: u64,
}

/// Control surface for the display shell
pub struct StreamPlayer<B: MediaBackend> {
    backend: Arc<B>,
    config: SessionConfig,
    queue: Arc<PacketQueue<B::Packet>>,
    sink: Arc<FrameSink>,
    events: EventSender,
    events_rx: Receiver<PlayerEvent>,
    state: Mutex<PlayerState<B::Packet>>,
}

impl<B: MediaBackend> StreamPlayer<B> {
    pub fn new(backend: B, config: SessionConfig) -> Self {
        let (events, events_rx) = events::channel();
        let queue = Arc::new(PacketQueue::new(
            config.queue_capacity,
            config.overflow_policy,
        ));

        Self {
            backend: Arc::new(backend),
            config,
            queue,
            sink: Arc::new(FrameSink::new()),
            events,
            events_rx,
            state: Mutex::new(PlayerState {
                url: None,
                session: None,
                next_session_id: 1,
            }),
        }
    }

    /// Start playing `url`, or only retarget if a session is already running.
    ///
    /// Failures are reported through [`events`](Self::events).
    pub fn play(&self, url: impl Into<String>) {
        let url = url.into();
        let mut state = self.state.lock();
        state.url = Some(url.clone());

        if let Some(session) = state.session.as_ref() {
            if session.is_running() {
                log::info!(
                    "Session {} already running, target URL set to {}",
                    session.id(),
                    url
                );
                return;
            }
        }

        // A finished session still holds its decode thread
        if let Some(mut finished) = state.session.take() {
            finished.stop();
        }

        let discarded = self.queue.reopen();
        if discarded > 0 {
            log::debug!("Discarded {} stale packets", discarded);
        }

        let id = state.next_session_id;
        state.next_session_id += 1;

        match StreamSession::start(
            id,
            url,
            self.backend.clone(),
            self.config.clone(),
            self.queue.clone(),
            self.sink.clone(),
            self.events.clone(),
        ) {
            Ok(session) => state.session = Some(session),
            Err(e) => self.events.error(e.to_string()),
        }
    }

    /// Stop the current session and release its resources. Idempotent.
    pub fn stop(&self) {
        let session = self.state.lock().session.take();
        match session {
            Some(mut session) => {
                log::info!("Stopping session {}", session.id());
                session.stop();
            }
            None => log::debug!("stop: no session"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .session
            .as_ref()
            .map(StreamSession::is_running)
            .unwrap_or(false)
    }

    /// Most recent URL passed to `play`
    pub fn url(&self) -> Option<String> {
        self.state.lock().url.clone()
    }

    pub fn session_id(&self) -> Option<u64> {
        self.state.lock().session.as_ref().map(StreamSession::id)
    }

    /// Stream properties once the current session finished initialization
    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.state
            .lock()
            .session
            .as_ref()
            .and_then(StreamSession::stream_info)
    }

    pub fn frame_sink(&self) -> Arc<FrameSink> {
        self.sink.clone()
    }

    /// "frame ready" / "error occurred" notifications
    pub fn events(&self) -> &Receiver<PlayerEvent> {
        &self.events_rx
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Packets discarded by the queue's overflow policy
    pub fn dropped_packets(&self) -> u64 {
        self.queue.dropped_count()
    }
}

impl<B: MediaBackend> Drop for StreamPlayer<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
