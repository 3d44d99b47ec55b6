use std::collections::VecDeque;
use super::event::{DeliveryEvent, FlushTrigger};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliverySnapshot {
    pub enqueued: u64,
    pub flush_stats: FlushStats,
    pub outcome_stats: OutcomeStats,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushStats {
    pub total: u64,
    pub by_size: u64,
    pub by_interval: u64,
    pub at_shutdown: u64,
    pub total_items: u64,
    pub avg_batch_size: f64,
    pub max_batch_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutcomeStats {
    pub delivered_batches: u64,
    pub delivered_items: u64,
    pub rejected_batches: u64,
    pub failed_batches: u64,
    pub requeued: u64,
    pub dropped: u64,
}

pub fn compute_snapshot(events: &VecDeque<DeliveryEvent>) -> DeliverySnapshot {
    let mut snap = DeliverySnapshot::default();

    for event in events {
        match event {
            DeliveryEvent::Enqueued => snap.enqueued += 1,
            DeliveryEvent::BatchFlushed { size, trigger } => {
                snap.flush_stats.total += 1;
                snap.flush_stats.total_items += *size as u64;
                if *size > snap.flush_stats.max_batch_size {
                    snap.flush_stats.max_batch_size = *size;
                }
                match trigger {
                    FlushTrigger::Size => snap.flush_stats.by_size += 1,
                    FlushTrigger::Interval => snap.flush_stats.by_interval += 1,
                    FlushTrigger::Shutdown => snap.flush_stats.at_shutdown += 1,
                }
            }
            DeliveryEvent::BatchDelivered { size } => {
                snap.outcome_stats.delivered_batches += 1;
                snap.outcome_stats.delivered_items += *size as u64;
            }
            DeliveryEvent::BatchRejected { .. } => snap.outcome_stats.rejected_batches += 1,
            DeliveryEvent::BatchFailed { .. } => snap.outcome_stats.failed_batches += 1,
            DeliveryEvent::Requeued { .. } => snap.outcome_stats.requeued += 1,
            DeliveryEvent::Dropped(_) => snap.outcome_stats.dropped += 1,
        }
    }

    if snap.flush_stats.total > 0 {
        snap.flush_stats.avg_batch_size = snap.flush_stats.total_items as f64 / snap.flush_stats.total as f64;
    }

    snap
}
