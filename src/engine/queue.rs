// src/engine/queue.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::types::ChangeEvent;

/// Events buffered per root before the producer starts dropping.
pub const QUEUE_CAPACITY: usize = 10_000;

/// Producer half of a root's event queue.
///
/// `push` never blocks: it is called from the notify delivery thread. When
/// the queue is full the event is dropped and counted.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<ChangeEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// Returns false once the consumer is gone.
    pub fn push(&self, event: ChangeEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(ev)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if total == 1 {
                    warn!(path = %ev.path.display(), "event queue full; dropping events until it drains");
                } else {
                    debug!(path = %ev.path.display(), dropped = total, "event queue full; dropping event");
                }
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Events dropped on overflow so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// A bounded queue for one watched root.
pub fn event_queue(capacity: usize) -> (EventSender, mpsc::Receiver<ChangeEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        EventSender {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_drops_and_counts() {
        let (tx, mut rx) = event_queue(2);
        for i in 0..5 {
            assert!(tx.push(ChangeEvent::modified(format!("/r/{i}.txt"))));
        }
        assert_eq!(tx.dropped(), 3);
        assert_eq!(rx.try_recv().unwrap().path.to_str(), Some("/r/0.txt"));
        assert_eq!(rx.try_recv().unwrap().path.to_str(), Some("/r/1.txt"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn push_reports_closed_consumer() {
        let (tx, rx) = event_queue(4);
        drop(rx);
        assert!(!tx.push(ChangeEvent::created("/r/a")));
    }
}
