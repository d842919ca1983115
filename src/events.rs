//! Push notifications from the pipeline to the display layer

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Events held for a shell that is not polling
pub const EVENT_CAPACITY: usize = 64;

/// Notification raised by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// A new frame was published; re-pull it from the sink
    FrameReady,
    /// Fatal initialization or decode failure
    Error(String),
}

impl PlayerEvent {
    pub fn is_frame_ready(&self) -> bool {
        matches!(self, PlayerEvent::FrameReady)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            PlayerEvent::Error(message) => Some(message),
            PlayerEvent::FrameReady => None,
        }
    }
}

/// Sending half shared by the demux and decode threads.
///
/// Never blocks. When the shell stops polling, new `FrameReady` events are
/// dropped once the channel is full; an error evicts the oldest queued event
/// so it is always delivered.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<PlayerEvent>,
    backlog: Receiver<PlayerEvent>,
}

impl EventSender {
    pub fn frame_ready(&self) {
        // Full: a queued FrameReady already tells the shell to re-pull the sink
        let _ = self.tx.try_send(PlayerEvent::FrameReady);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        log::error!("{}", message);

        let mut event = PlayerEvent::Error(message);
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(evicted) = self.backlog.try_recv() {
                        log::debug!("Event channel full, evicted {:?}", evicted);
                    }
                    event = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// Create a connected sender/receiver pair holding at most [`EVENT_CAPACITY`] events
pub fn channel() -> (EventSender, Receiver<PlayerEvent>) {
    let (tx, rx) = bounded(EVENT_CAPACITY);
    (
        EventSender {
            tx,
            backlog: rx.clone(),
        },
        rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_order() {
        let (events, rx) = channel();
        events.frame_ready();
        events.error("Unable to open input");
        events.frame_ready();

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![
                PlayerEvent::FrameReady,
                PlayerEvent::Error("Unable to open input".to_string()),
                PlayerEvent::FrameReady,
            ]
        );
        assert_eq!(received[1].error_message(), Some("Unable to open input"));
    }

    #[test]
    fn test_send_without_receiver() {
        let (events, rx) = channel();
        drop(rx);
        events.frame_ready();
        events.error("ignored");
    }

    #[test]
    fn test_unpolled_frames_stay_bounded() {
        let (events, rx) = channel();
        for _ in 0..EVENT_CAPACITY * 4 {
            events.frame_ready();
        }
        assert_eq!(rx.len(), EVENT_CAPACITY);
        assert!(rx.try_iter().all(|e| e.is_frame_ready()));
    }

    #[test]
    fn test_error_delivered_when_full() {
        let (events, rx) = channel();
        for _ in 0..EVENT_CAPACITY {
            events.frame_ready();
        }
        events.error("Decode failed: device lost");

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), EVENT_CAPACITY);
        assert_eq!(
            received.last().and_then(PlayerEvent::error_message),
            Some("Decode failed: device lost")
        );
    }
}
