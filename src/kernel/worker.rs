use std::sync::Arc;

use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use super::queue::{DeliveryQueue, QueueConsumer};
use super::record::{ParameterPayload, ParameterRecord};
use super::telemetry::event::{DeliveryEvent, FlushTrigger};
use super::telemetry::recorder::{self, SharedRecorder};
use crate::config::DeliverySettings;
use crate::error::{DeliveryWarning, DropReason, ServiceError};
use crate::services::ExperimentService;

/// Where a worker's batches go and where its outcomes are reported.
pub struct DeliveryTarget {
    pub experiment_id: String,
    pub page_url: String,
    pub service: Arc<dyn ExperimentService>,
    pub telemetry: SharedRecorder,
}

impl DeliveryTarget {
    fn record(&self, event: DeliveryEvent) {
        recorder::record(&self.telemetry, event);
    }

    fn give_up(&self, record: ParameterRecord, reason: DropReason) {
        let warning = DeliveryWarning {
            parameter_name: record.name,
            parameter_value: record.value.to_string(),
            page_url: self.page_url.clone(),
            retry_count: record.retry_count,
            reason,
        };
        warn!(experiment_id = %self.experiment_id, "{}", warning);
        self.record(DeliveryEvent::Dropped(warning));
    }
}

/// Background task that turns queued records into parameter batches.
///
/// Sole consumer of its queue and sole producer of retried records, so the
/// only synchronisation it needs is the queue's own.
///
/// If the task is dropped before it finished draining (the runtime shut
/// down under it), whatever it still holds is sent once more from a
/// dedicated thread before the drop returns.
pub struct BatchingWorker {
    target: DeliveryTarget,
    queue: DeliveryQueue,
    consumer: QueueConsumer,
    settings: DeliverySettings,
    cancel: CancellationToken,
    buffer: Vec<ParameterRecord>,
    backoff: Vec<ParameterRecord>,
    drained: bool,
    // Declared last: fires only after `Drop` has dealt with leftovers.
    _stopped: DropGuard,
}

impl BatchingWorker {
    /// `cancel` asks the worker to drain and stop; `stopped` is cancelled
    /// once it has, however it went away.
    pub fn new(
        target: DeliveryTarget,
        (queue, consumer): (DeliveryQueue, QueueConsumer),
        settings: DeliverySettings,
        cancel: CancellationToken,
        stopped: CancellationToken,
    ) -> Self {
        Self {
            target,
            queue,
            consumer,
            settings,
            cancel,
            buffer: Vec::with_capacity(settings.batch_size),
            backoff: Vec::new(),
            drained: false,
            _stopped: stopped.drop_guard(),
        }
    }

    pub async fn run(mut self) {
        info!(experiment_id = %self.target.experiment_id, "delivery worker started");

        loop {
            let popped = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                popped = self.consumer.pop(self.settings.flush_interval) => popped,
            };

            match popped {
                Some(record) => {
                    self.buffer.push(record);
                    if self.buffer.len() >= self.settings.batch_size {
                        self.flush(FlushTrigger::Size).await;
                    }
                }
                None => {
                    if !self.buffer.is_empty() {
                        self.flush(FlushTrigger::Interval).await;
                    }
                }
            }
        }

        self.drain().await;
        self.drained = true;
        info!(experiment_id = %self.target.experiment_id, "delivery worker stopped");
    }

    /// Empties the queue without waiting on the flush interval. Retried
    /// records land back in the queue, so keep going until a pass finds
    /// nothing left.
    async fn drain(&mut self) {
        debug!(experiment_id = %self.target.experiment_id, pending = self.queue.pending(), "draining");
        loop {
            while let Some(record) = self.consumer.try_pop() {
                self.buffer.push(record);
                if self.buffer.len() >= self.settings.batch_size {
                    self.flush(FlushTrigger::Size).await;
                }
            }
            if self.buffer.is_empty() {
                break;
            }
            self.flush(FlushTrigger::Shutdown).await;
        }
    }

    async fn flush(&mut self, trigger: FlushTrigger) {
        let size = self.buffer.len();
        self.target.record(DeliveryEvent::BatchFlushed { size, trigger });

        // The batch stays in `buffer` while in flight so an interrupted
        // worker still knows about it.
        let payload: Vec<ParameterPayload> = self.buffer.iter().map(ParameterPayload::from).collect();
        let outcome = self
            .target
            .service
            .append_parameters(&self.target.experiment_id, &payload)
            .await;
        let batch = std::mem::take(&mut self.buffer);

        match outcome {
            Ok(()) => {
                debug!(experiment_id = %self.target.experiment_id, size, ?trigger, "batch delivered");
                self.target.record(DeliveryEvent::BatchDelivered { size });
            }
            Err(err) if !err.is_retryable_delivery() => {
                warn!(experiment_id = %self.target.experiment_id, size, error = %err, "batch rejected");
                self.target.record(DeliveryEvent::BatchRejected { size });
                let reason = err.to_string();
                for record in batch {
                    self.target.give_up(record, DropReason::Rejected(reason.clone()));
                }
            }
            Err(err) => {
                warn!(experiment_id = %self.target.experiment_id, size, error = %err, "batch failed, will retry");
                self.target.record(DeliveryEvent::BatchFailed { size });
                self.retry(batch, &err).await;
            }
        }

        // Requeued copies are already counted, so this never hits zero early.
        self.consumer.task_done(size);
    }

    async fn retry(&mut self, batch: Vec<ParameterRecord>, err: &ServiceError) {
        for record in batch {
            let record = record.retried();
            if record.retry_count >= self.settings.max_retries {
                self.target.give_up(record, DropReason::RetriesExhausted);
            } else {
                self.backoff.push(record);
            }
        }

        if self.backoff.is_empty() {
            return;
        }

        debug!(count = self.backoff.len(), error = %err, delay = ?self.settings.retry_delay, "requeueing after backoff");
        tokio::time::sleep(self.settings.retry_delay).await;
        for record in std::mem::take(&mut self.backoff) {
            let retry_count = record.retry_count;
            // Our own consumer is alive, so the push cannot bounce.
            if self.queue.push(record).is_ok() {
                self.target.record(DeliveryEvent::Requeued { retry_count });
            }
        }
    }
}

impl Drop for BatchingWorker {
    fn drop(&mut self) {
        if self.drained || std::thread::panicking() {
            return;
        }

        let mut leftovers = std::mem::take(&mut self.buffer);
        leftovers.append(&mut self.backoff);
        while let Some(record) = self.consumer.try_pop() {
            leftovers.push(record);
        }
        if leftovers.is_empty() {
            return;
        }

        let count = leftovers.len();
        warn!(experiment_id = %self.target.experiment_id, count, "delivery worker interrupted, sending leftovers");
        let target = &self.target;
        let batch_size = self.settings.batch_size;
        // The runtime we were spawned on is going away, so deliver from a
        // fresh one on a thread of our own and wait for it.
        let delivered = std::thread::scope(|scope| {
            scope
                .spawn(move || deliver_leftovers(target, leftovers, batch_size))
                .join()
        });
        if delivered.is_err() {
            error!(experiment_id = %self.target.experiment_id, count, "leftover delivery panicked");
        }
        self.consumer.task_done(count);
    }
}

/// One attempt per batch, no backoff. Failures become warnings.
fn deliver_leftovers(target: &DeliveryTarget, records: Vec<ParameterRecord>, batch_size: usize) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "unable to start exit runtime");
            for record in records {
                target.give_up(record, DropReason::Interrupted(e.to_string()));
            }
            return;
        }
    };

    runtime.block_on(async {
        let mut records = records.into_iter();
        loop {
            let batch: Vec<ParameterRecord> = records.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                break;
            }
            let size = batch.len();
            target.record(DeliveryEvent::BatchFlushed { size, trigger: FlushTrigger::Shutdown });

            let payload: Vec<ParameterPayload> = batch.iter().map(ParameterPayload::from).collect();
            match target.service.append_parameters(&target.experiment_id, &payload).await {
                Ok(()) => target.record(DeliveryEvent::BatchDelivered { size }),
                Err(err) => {
                    target.record(DeliveryEvent::BatchRejected { size });
                    let reason = err.to_string();
                    for record in batch {
                        target.give_up(record, DropReason::Interrupted(reason.clone()));
                    }
                }
            }
        }
    });
}
