use crate::error::DeliveryWarning;

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryEvent {
    Enqueued,

    BatchFlushed {
        size: usize,
        trigger: FlushTrigger,
    },

    BatchDelivered {
        size: usize,
    },

    /// Non-retryable status; every item of the batch is dropped.
    BatchRejected {
        size: usize,
    },

    /// Retryable failure; items are requeued or dropped individually.
    BatchFailed {
        size: usize,
    },

    Requeued {
        retry_count: u32,
    },

    Dropped(DeliveryWarning),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Buffer reached the batch size.
    Size,
    /// Flush interval elapsed with a partial buffer.
    Interval,
    Shutdown,
}
