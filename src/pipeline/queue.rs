//! Bounded media queue between the packet intake and the active sink
//!
//! Pushing never blocks: when the queue is full the newest packet is rejected.
//! The consumer half wakes up as soon as data arrives or after a timeout.

use crate::pipeline::types::QueuedPacket;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// Result of a non-blocking push
#[derive(Debug)]
pub enum PushOutcome {
    Queued,
    /// The queue was full, the packet is handed back and discarded by the caller
    Dropped(QueuedPacket),
    /// The consumer half is gone
    Closed(QueuedPacket),
}

/// Create a queue holding at most `capacity` packets.
pub fn media_queue(capacity: usize) -> (QueueSender, QueueDrain) {
    let (tx, rx) = mpsc::channel::<QueuedPacket>(capacity.max(1));
    (
        QueueSender { tx },
        QueueDrain {
            rx,
            disconnected: false,
        },
    )
}

/// Producer half, cloned once per track
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::Sender<QueuedPacket>,
}

impl QueueSender {
    pub fn try_push(&self, item: QueuedPacket) -> PushOutcome {
        match self.tx.try_send(item) {
            Ok(()) => PushOutcome::Queued,
            Err(TrySendError::Full(item)) => PushOutcome::Dropped(item),
            Err(TrySendError::Closed(item)) => PushOutcome::Closed(item),
        }
    }

    /// Packets currently waiting in the queue
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consumer half, owned by the active sink
#[derive(Debug)]
pub struct QueueDrain {
    rx: mpsc::Receiver<QueuedPacket>,
    disconnected: bool,
}

impl QueueDrain {
    /// Take one packet if any is waiting.
    pub fn try_pop(&mut self) -> Option<QueuedPacket> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.disconnected = true;
                None
            }
        }
    }

    /// Wait up to `wait` for a packet, then take whatever else is already
    /// queued, at most `limit` packets in total.
    ///
    /// An empty batch means nothing arrived in time and the cycle is skipped.
    pub async fn next_batch(&mut self, wait: Duration, limit: usize) -> Vec<QueuedPacket> {
        let mut batch = Vec::new();

        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(item)) => batch.push(item),
            Ok(None) => {
                self.disconnected = true;
                return batch;
            }
            Err(_) => return batch,
        }

        while batch.len() < limit.max(1) {
            match self.try_pop() {
                Some(item) => batch.push(item),
                None => break,
            }
        }

        batch
    }

    /// True once every producer is gone and the queue has been emptied
    pub fn is_closed(&self) -> bool {
        self.disconnected
    }
}
