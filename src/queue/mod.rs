//! Packet queue between the demux loop and the decode worker
//!
//! One producer, one consumer, FIFO. The queue is a bounded crossbeam channel;
//! what happens when it is full is decided by [`OverflowPolicy`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};

use crate::session::config::OverflowPolicy;

/// Slice a blocked producer waits before re-checking for close
const BLOCK_POLL: Duration = Duration::from_millis(100);

/// Result of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended to the tail
    Queued,
    /// Appended after evicting the head
    DroppedOldest,
    /// Queue full, incoming packet discarded
    DroppedNewest,
    /// Queue closed, packet discarded
    Closed,
}

/// Bounded FIFO of compressed packets
pub struct PacketQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    policy: OverflowPolicy,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl<T> PacketQueue<T> {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            policy,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a packet and wake the consumer
    pub fn push(&self, packet: T) -> PushOutcome {
        if self.is_closed() {
            return PushOutcome::Closed;
        }

        match self.policy {
            OverflowPolicy::Block => self.push_blocking(packet),
            OverflowPolicy::DropNewest => match self.tx.try_send(packet) {
                Ok(()) => PushOutcome::Queued,
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    PushOutcome::DroppedNewest
                }
                Err(TrySendError::Disconnected(_)) => PushOutcome::Closed,
            },
            OverflowPolicy::DropOldest => self.push_evicting(packet),
        }
    }

    fn push_blocking(&self, mut packet: T) -> PushOutcome {
        loop {
            match self.tx.send_timeout(packet, BLOCK_POLL) {
                Ok(()) => return PushOutcome::Queued,
                Err(SendTimeoutError::Timeout(returned)) => {
                    if self.is_closed() {
                        return PushOutcome::Closed;
                    }
                    packet = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => return PushOutcome::Closed,
            }
        }
    }

    fn push_evicting(&self, mut packet: T) -> PushOutcome {
        let mut evicted = false;
        loop {
            match self.tx.try_send(packet) {
                Ok(()) => {
                    return if evicted {
                        PushOutcome::DroppedOldest
                    } else {
                        PushOutcome::Queued
                    };
                }
                Err(TrySendError::Full(returned)) => {
                    packet = returned;
                    // The consumer may have drained in between; then just retry
                    if self.rx.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        evicted = true;
                    }
                }
                Err(TrySendError::Disconnected(_)) => return PushOutcome::Closed,
            }
        }
    }

    /// Wait up to `timeout` for packets, then drain everything queued at that moment.
    ///
    /// Returns an empty batch on timeout so the caller can re-check its run flag.
    pub fn pop_all(&self, timeout: Duration) -> Vec<T> {
        let first = match self.rx.recv_timeout(timeout) {
            Ok(packet) => packet,
            Err(_) => return Vec::new(),
        };

        let pending = self.rx.len();
        let mut batch = Vec::with_capacity(pending + 1);
        batch.push(first);
        batch.extend(self.rx.try_iter().take(pending));
        batch
    }

    /// Stop accepting packets; a producer blocked in `push` returns `Closed`
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Discard leftovers from a previous session and accept packets again
    pub fn reopen(&self) -> usize {
        let discarded = self.clear();
        self.closed.store(false, Ordering::Release);
        discarded
    }

    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(0)
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Packets discarded by the overflow policy since creation
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
