use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::event::DeliveryEvent;
use super::metrics::{compute_snapshot, DeliverySnapshot};
use crate::error::DeliveryWarning;

const MAX_EVENTS: usize = 10_000;

/// Shared between a session (reader) and its worker (writer).
pub type SharedRecorder = Arc<Mutex<TelemetryRecorder>>;

#[derive(Debug)]
pub struct TelemetryRecorder {
    buffer: VecDeque<DeliveryEvent>,
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn shared() -> SharedRecorder {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn record(&mut self, event: DeliveryEvent) {
        if self.buffer.len() >= MAX_EVENTS {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }

    pub fn snapshot(&self) -> DeliverySnapshot {
        // Delegate to pure functional metrics module
        compute_snapshot(&self.buffer)
    }

    pub fn warnings(&self) -> Vec<DeliveryWarning> {
        self.buffer
            .iter()
            .filter_map(|event| match event {
                DeliveryEvent::Dropped(warning) => Some(warning.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Records through a shared handle; a poisoned lock only costs the event.
pub(crate) fn record(recorder: &SharedRecorder, event: DeliveryEvent) {
    if let Ok(mut guard) = recorder.lock() {
        guard.record(event);
    }
}
