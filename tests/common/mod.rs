#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use experimenthq::kernel::record::ParameterPayload;
use experimenthq::services::{CreateExperimentRequest, ExperimentService, ExperimentStatus};
use experimenthq::{DeliverySettings, ServiceError};

/// Scripted stand-in for the ExperimentHQ API.
///
/// Each call pops the next scripted outcome for its endpoint; an empty
/// script means success.
#[derive(Default)]
pub struct MockService {
    pub experiment_id: String,
    create_script: Mutex<VecDeque<Result<(), ServiceError>>>,
    append_script: Mutex<VecDeque<Result<(), ServiceError>>>,
    status_script: Mutex<VecDeque<Result<(), ServiceError>>>,
    pub create_calls: Mutex<Vec<CreateExperimentRequest>>,
    pub batches: Mutex<Vec<Vec<ParameterPayload>>>,
    pub status_updates: Mutex<Vec<(String, ExperimentStatus)>>,
    append_delay: Mutex<Option<Duration>>,
    append_panics: AtomicBool,
}

impl MockService {
    pub fn new(experiment_id: &str) -> Arc<Self> {
        Arc::new(Self {
            experiment_id: experiment_id.to_string(),
            ..Self::default()
        })
    }

    pub fn fail_create(&self, err: ServiceError) {
        self.create_script.lock().unwrap().push_back(Err(err));
    }

    pub fn fail_append(&self, err: ServiceError) {
        self.append_script.lock().unwrap().push_back(Err(err));
    }

    pub fn succeed_append(&self) {
        self.append_script.lock().unwrap().push_back(Ok(()));
    }

    pub fn fail_status(&self, err: ServiceError) {
        self.status_script.lock().unwrap().push_back(Err(err));
    }

    /// Every batch takes `delay` to answer.
    pub fn slow_append(&self, delay: Duration) {
        *self.append_delay.lock().unwrap() = Some(delay);
    }

    pub fn panic_on_append(&self) {
        self.append_panics.store(true, Ordering::SeqCst);
    }

    /// Names per delivered-or-attempted batch, in call order.
    pub fn batch_names(&self) -> Vec<Vec<String>> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .map(|batch| batch.iter().map(|p| p.parameter_name.clone()).collect())
            .collect()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    fn next(script: &Mutex<VecDeque<Result<(), ServiceError>>>) -> Result<(), ServiceError> {
        script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

#[async_trait]
impl ExperimentService for MockService {
    async fn create_experiment(&self, request: &CreateExperimentRequest) -> Result<String, ServiceError> {
        self.create_calls.lock().unwrap().push(request.clone());
        Self::next(&self.create_script)?;
        Ok(self.experiment_id.clone())
    }

    async fn append_parameters(&self, _experiment_id: &str, batch: &[ParameterPayload]) -> Result<(), ServiceError> {
        if self.append_panics.load(Ordering::SeqCst) {
            panic!("append_parameters blew up");
        }
        let delay = *self.append_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.batches.lock().unwrap().push(batch.to_vec());
        Self::next(&self.append_script)
    }

    async fn update_status(&self, experiment_id: &str, status: ExperimentStatus) -> Result<(), ServiceError> {
        self.status_updates.lock().unwrap().push((experiment_id.to_string(), status));
        Self::next(&self.status_script)
    }
}

pub fn server_error() -> ServiceError {
    ServiceError::from_status(503, "service unavailable")
}

/// Defaults with the constants spelled out, so tests read against them.
pub fn settings() -> DeliverySettings {
    DeliverySettings {
        batch_size: 10,
        flush_interval: Duration::from_secs(10),
        max_retries: 3,
        retry_delay: Duration::from_secs(1),
        handle_signals: false,
    }
}
