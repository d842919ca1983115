//! Threading module: the decode worker and the shared run flag
//!
//! Each session runs two threads: the demux loop (producer, see
//! [`crate::session`]) and the [`DecodeWorker`] (consumer). Both observe the
//! same [`RunFlag`]; the worker re-checks it at least once per queue wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::decoder::{DecodedFrame, RgbFrame, VideoDecoder};
use crate::error::Result;
use crate::events::EventSender;
use crate::queue::PacketQueue;
use crate::sink::FrameSink;

/// Shared "should run" flag of one session
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// A flag that starts out set
    pub fn running() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Raw pointer to the flag, valid while any clone is alive
    pub fn as_ptr(&self) -> *const AtomicBool {
        Arc::as_ptr(&self.0)
    }

    /// Sleep up to `duration`, waking early once the flag clears.
    /// Returns whether the flag is still set.
    pub fn sleep(&self, duration: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(10);
        let mut remaining = duration;
        while !remaining.is_zero() && self.is_running() {
            let step = remaining.min(SLICE);
            thread::sleep(step);
            remaining -= step;
        }
        self.is_running()
    }
}

/// Why a decode worker returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// The run flag was cleared
    Stopped,
    /// A fatal decode-path error ended the loop
    Fatal(String),
}

/// Counters reported when a decode worker exits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub packets_submitted: u64,
    pub packets_rejected: u64,
    pub frames_published: u64,
    pub exit: WorkerExit,
}

/// Consumer side of a session: drains the packet queue, decodes, converts
/// and publishes frames.
pub struct DecodeWorker<V: VideoDecoder> {
    decoder: V,
    queue: Arc<PacketQueue<V::Packet>>,
    sink: Arc<FrameSink>,
    events: EventSender,
    run: RunFlag,
    pop_timeout: Duration,
    packets_submitted: u64,
    packets_rejected: u64,
    frames_published: u64,
}

impl<V: VideoDecoder + 'static> DecodeWorker<V> {
    pub fn new(
        decoder: V,
        queue: Arc<PacketQueue<V::Packet>>,
        sink: Arc<FrameSink>,
        events: EventSender,
        run: RunFlag,
        pop_timeout: Duration,
    ) -> Self {
        Self {
            decoder,
            queue,
            sink,
            events,
            run,
            pop_timeout,
            packets_submitted: 0,
            packets_rejected: 0,
            frames_published: 0,
        }
    }

    /// Run the worker on its own thread
    pub fn spawn(self, session_id: u64) -> Result<JoinHandle<WorkerSummary>> {
        let handle = thread::Builder::new()
            .name(format!("decode-{}", session_id))
            .spawn(move || self.run())?;
        Ok(handle)
    }

    /// Worker loop. The decoder (and its device context) is dropped on return.
    pub fn run(mut self) -> WorkerSummary {
        log::debug!("Decode worker started");

        let exit = self.decode_loop();
        match &exit {
            WorkerExit::Stopped => log::debug!("Decode worker stopped"),
            WorkerExit::Fatal(message) => log::warn!("Decode worker terminated: {}", message),
        }

        WorkerSummary {
            packets_submitted: self.packets_submitted,
            packets_rejected: self.packets_rejected,
            frames_published: self.frames_published,
            exit,
        }
    }

    fn decode_loop(&mut self) -> WorkerExit {
        while self.run.is_running() {
            let batch = self.queue.pop_all(self.pop_timeout);
            if batch.is_empty() {
                continue;
            }

            log::trace!("Decoding batch of {} packets", batch.len());
            for packet in batch {
                if !self.run.is_running() {
                    break;
                }
                if let Err(e) = self.process_packet(&packet) {
                    let message = e.to_string();
                    self.events.error(message.clone());
                    return WorkerExit::Fatal(message);
                }
            }
        }
        WorkerExit::Stopped
    }

    /// Submit one packet and publish every frame it releases.
    /// Only fatal errors are returned.
    fn process_packet(&mut self, packet: &V::Packet) -> Result<()> {
        if let Err(e) = self.decoder.send_packet(packet) {
            if !e.is_transient() {
                return Err(e);
            }
            self.packets_rejected += 1;
            log::debug!("Dropping packet: {}", e);
            return Ok(());
        }
        self.packets_submitted += 1;

        loop {
            let decoded = match self.decoder.receive_frame() {
                Ok(Some(decoded)) => decoded,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Stopped draining decoder: {}", e);
                    break;
                }
            };

            let system = match decoded {
                DecodedFrame::Hardware(frame) => self.decoder.transfer(&frame)?,
                DecodedFrame::System(frame) => frame,
            };
            let converted = self.decoder.convert(&system)?;
            self.publish(converted);
        }
        Ok(())
    }

    fn publish(&mut self, frame: RgbFrame) {
        log::trace!(
            "Publishing frame {} ({}x{})",
            frame.frame_number(),
            frame.width(),
            frame.height()
        );
        self.sink.update(frame);
        self.frames_published += 1;
        self.events.frame_ready();
    }
}

/// Ask the scheduler to favour the calling thread.
///
/// Returns false where unsupported or not permitted.
pub fn raise_current_thread_priority() -> bool {
    #[cfg(target_os = "linux")]
    {
        // On Linux nice values are per thread when addressed by tid
        let tid = unsafe { libc::syscall(libc::SYS_gettid) } as libc::id_t;
        let ret = unsafe { libc::setpriority(libc::PRIO_PROCESS, tid, -10) };
        if ret != 0 {
            log::debug!(
                "Unable to raise thread priority: {}",
                std::io::Error::last_os_error()
            );
            return false;
        }
        true
    }

    #[cfg(not(target_os = "linux"))]
    {
        log::debug!("Thread priority elevation not supported on this platform");
        false
    }
}
