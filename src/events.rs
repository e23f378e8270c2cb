//! Event stream: the four event types observers consume over the queue's
//! progress channel. The core never depends on an observer being
//! present — broadcasting with zero subscribers is a no-op, and a subscriber
//! that falls behind only loses old events, never blocks a worker.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::orchestrator::ProcessingResult;

/// One event emitted by the Worker Pool over the lifetime of a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndexEvent {
    FileStart { file_id: String, path: String },
    FileProgress { file_id: String, progress: u8, current_step: String },
    FileComplete { file_id: String, result: ProcessingResult },
    FileFailed { file_id: String, error_message: String },
}

const CHANNEL_CAPACITY: usize = 1024;

/// Publish side of the bus, cloned into every worker task. `send` never
/// blocks and never requires a subscriber; observers here are optional and
/// may be zero-or-many.
#[derive(Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<IndexEvent>,
}

impl EventPublisher {
    pub fn publish(&self, event: IndexEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber { receiver: self.sender.subscribe() }
    }
}

/// Subscribe side of the bus. A slow subscriber drops the oldest events
/// rather than stalling publishers; `recv` surfaces that as a lag count it
/// swallows, since observers here are best-effort by design.
pub struct EventSubscriber {
    receiver: broadcast::Receiver<IndexEvent>,
}

impl EventSubscriber {
    pub async fn recv(&mut self) -> Option<IndexEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Construct a fresh publisher; every `subscribe()` call hands back an
/// independent receiver so late-joining observers only miss events that
/// predate their subscription.
pub fn channel() -> EventPublisher {
    let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
    EventPublisher { sender }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_recv_round_trips() {
        let publisher = channel();
        let mut subscriber = publisher.subscribe();
        publisher.publish(IndexEvent::FileStart {
            file_id: "f1".to_string(),
            path: "a.ts".to_string(),
        });

        match subscriber.recv().await {
            Some(IndexEvent::FileStart { file_id, path }) => {
                assert_eq!(file_id, "f1");
                assert_eq!(path, "a.ts");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let publisher = channel();
        publisher.publish(IndexEvent::FileFailed {
            file_id: "f1".to_string(),
            error_message: "boom".to_string(),
        });
    }

    #[tokio::test]
    async fn independent_subscribers_each_see_every_event() {
        let publisher = channel();
        let mut a = publisher.subscribe();
        let mut b = publisher.subscribe();
        publisher.publish(IndexEvent::FileProgress {
            file_id: "f1".to_string(),
            progress: 50,
            current_step: "parse".to_string(),
        });

        assert!(a.recv().await.is_some());
        assert!(b.recv().await.is_some());
    }
}
