//! Single-slot holder of the most recently converted frame
//!
//! The decode worker is the only writer; the display layer reads through
//! [`FrameSink::read`] or the image-provider style [`FrameSink::request_image`].
//! Frames are swapped in whole under the lock, so readers never see a
//! partially written frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::decoder::{FrameSize, RgbFrame};

/// What a reader gets back from the sink
#[derive(Debug, Clone, Default)]
pub struct FrameSnapshot {
    /// Current frame, `None` until the first publication
    pub frame: Option<Arc<RgbFrame>>,

    /// Native size of `frame`, zero when empty
    pub size: FrameSize,
}

impl FrameSnapshot {
    pub fn is_available(&self) -> bool {
        self.frame.is_some()
    }
}

/// Latest-frame slot shared between the decode worker and the display layer
#[derive(Default)]
pub struct FrameSink {
    current: Mutex<Option<Arc<RgbFrame>>>,
    published: AtomicU64,
}

impl FrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame; returns the publication count
    pub fn update(&self, frame: RgbFrame) -> u64 {
        let frame = Arc::new(frame);
        let previous = {
            let mut current = self.current.lock();
            current.replace(frame)
        };
        // The old frame is released outside the lock
        drop(previous);
        self.published.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Current frame and its native size
    pub fn read(&self) -> FrameSnapshot {
        let frame = self.current.lock().clone();
        let size = frame
            .as_ref()
            .map(|frame| frame.size())
            .unwrap_or_else(FrameSize::zero);
        FrameSnapshot { frame, size }
    }

    /// Image-provider contract: `id` is opaque and `requested` is ignored,
    /// the native frame is always returned. Scaling belongs to the caller.
    pub fn request_image(&self, id: &str, requested: Option<FrameSize>) -> FrameSnapshot {
        let snapshot = self.read();
        if !snapshot.is_available() {
            log::debug!("No frame available for image request '{}'", id);
        } else if let Some(requested) = requested.filter(|size| *size != snapshot.size) {
            log::trace!(
                "Image request '{}' for {}x{}, serving native {}x{}",
                id,
                requested.width,
                requested.height,
                snapshot.size.width,
                snapshot.size.height
            );
        }
        snapshot
    }

    /// Forget the current frame
    pub fn clear(&self) {
        self.current.lock().take();
    }

    /// Number of frames published since creation
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }
}
