use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use super::record::ParameterRecord;

/// Producer side of the delivery queue. Cheap to clone.
///
/// Every pushed record bumps a pending counter that only the consumer's
/// [`QueueConsumer::task_done`] brings back down, so [`DeliveryQueue::join`]
/// resolves once everything pushed so far has reached a terminal outcome.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<ParameterRecord>,
    pending: Arc<watch::Sender<usize>>,
}

/// Consumer side, owned by exactly one worker.
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::UnboundedReceiver<ParameterRecord>,
    pending: Arc<watch::Sender<usize>>,
}

pub fn channel() -> (DeliveryQueue, QueueConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (pending, _) = watch::channel(0usize);
    let pending = Arc::new(pending);

    (
        DeliveryQueue { tx, pending: pending.clone() },
        QueueConsumer { rx, pending },
    )
}

impl DeliveryQueue {
    /// Never blocks. Hands the record back if the consumer has gone away.
    pub fn push(&self, record: ParameterRecord) -> Result<(), ParameterRecord> {
        // Count first so a fast consumer can never take the counter below zero.
        self.pending.send_modify(|n| *n += 1);
        self.tx.send(record).map_err(|err| {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
            err.0
        })
    }

    /// Records pushed but not yet completed (queued or in a batch).
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Resolves once the pending count reaches zero.
    pub async fn join(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl QueueConsumer {
    /// Waits up to `timeout` for the next record. `None` means nothing arrived.
    pub async fn pop(&mut self, timeout: Duration) -> Option<ParameterRecord> {
        tokio::time::timeout(timeout, self.rx.recv()).await.ok().flatten()
    }

    pub fn try_pop(&mut self) -> Option<ParameterRecord> {
        self.rx.try_recv().ok()
    }

    /// Marks `count` popped records as finished.
    pub fn task_done(&self, count: usize) {
        self.pending.send_modify(|n| *n = n.saturating_sub(count));
    }
}
