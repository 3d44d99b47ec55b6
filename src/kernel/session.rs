use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::hook::TerminationHook;
use super::queue::{self, DeliveryQueue};
use super::record::{ParameterRecord, ParameterValue};
use super::telemetry::event::DeliveryEvent;
use super::telemetry::metrics::DeliverySnapshot;
use super::telemetry::recorder::{self, SharedRecorder, TelemetryRecorder};
use super::validator::NotionType;
use super::worker::{BatchingWorker, DeliveryTarget};
use crate::config::{DeliverySettings, ExperimentOptions, NOTION_BASE_URL};
use crate::error::{ShutdownError, StartupError, ValidationError};
use crate::services::{CreateExperimentRequest, ExperimentService, ExperimentStatus};

/// One running experiment: a remote record plus the worker feeding it.
///
/// Created with [`Experiment::start`], or through a
/// [`SessionRegistry`](super::registry::SessionRegistry) when only one
/// experiment should be live at a time.
pub struct Experiment {
    experiment_id: String,
    options: ExperimentOptions,
    service: Arc<dyn ExperimentService>,
    queue: DeliveryQueue,
    cancel: CancellationToken,
    stopped: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    telemetry: SharedRecorder,
}

impl Experiment {
    /// Registers the experiment remotely and spawns its delivery worker.
    ///
    /// Registration is attempted up to `settings.max_retries` times,
    /// `settings.retry_delay` apart. 401, 403, 404 and 408 end it at once.
    /// Must be called from within a tokio runtime.
    ///
    /// With `settings.handle_signals` on, the experiment is enrolled in the
    /// process-wide [`TerminationHook`] so Ctrl-C or SIGTERM still drains it.
    pub async fn start(
        options: ExperimentOptions,
        service: Arc<dyn ExperimentService>,
        settings: DeliverySettings,
    ) -> Result<Self, StartupError> {
        let experiment_id = register(&options, service.as_ref(), &settings).await?;
        info!(%experiment_id, project = %options.project, "experiment started");

        let (queue, consumer) = queue::channel();
        let cancel = CancellationToken::new();
        let stopped = CancellationToken::new();
        let telemetry = TelemetryRecorder::shared();

        let target = DeliveryTarget {
            experiment_id: experiment_id.clone(),
            page_url: page_url(&experiment_id),
            service: service.clone(),
            telemetry: telemetry.clone(),
        };
        let worker = BatchingWorker::new(
            target,
            (queue.clone(), consumer),
            settings,
            cancel.clone(),
            stopped.clone(),
        );
        let handle = tokio::spawn(worker.run());

        let experiment = Self {
            experiment_id,
            options,
            service,
            queue,
            cancel,
            stopped,
            worker: Mutex::new(Some(handle)),
            telemetry,
        };
        if settings.handle_signals {
            let hook = TerminationHook::global();
            hook.enrol(&experiment);
            hook.listen();
        }
        Ok(experiment)
    }

    /// Validates and queues a parameter. Never waits on the network.
    ///
    /// Only validation problems are returned; anything that goes wrong
    /// during delivery shows up as a [`DeliveryWarning`](crate::error::DeliveryWarning).
    pub fn log_parameter(
        &self,
        name: impl Into<String>,
        value: impl Into<ParameterValue>,
        notion_type: Option<NotionType>,
    ) -> Result<(), ValidationError> {
        let record = ParameterRecord::new(name, value, notion_type);
        if record.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if let Some(kind) = notion_type {
            kind.validate(&record.value)?;
        }

        match self.queue.push(record) {
            Ok(()) => recorder::record(&self.telemetry, DeliveryEvent::Enqueued),
            Err(record) => warn!(
                experiment_id = %self.experiment_id,
                parameter = %record.name,
                "experiment already ended, parameter not logged"
            ),
        }
        Ok(())
    }

    /// Stops the worker after it has drained the queue, then marks the
    /// experiment as finished.
    ///
    /// Every caller returns only once the queue is empty and the worker has
    /// stopped, including callers that arrive while another `end()` is still
    /// draining. The Finished update is sent once and is best effort: a
    /// failure is logged and does not turn into an error.
    pub async fn end(&self) -> Result<(), ShutdownError> {
        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        self.cancel.cancel();

        let Some(handle) = handle else {
            debug!(experiment_id = %self.experiment_id, "experiment already ending, waiting for drain");
            self.stopped.cancelled().await;
            return Ok(());
        };

        if handle.await.is_err() {
            return Err(ShutdownError::WorkerPanicked {
                experiment_id: self.experiment_id.clone(),
            });
        }

        match self
            .service
            .update_status(&self.experiment_id, ExperimentStatus::Finished)
            .await
        {
            Ok(()) => info!(experiment_id = %self.experiment_id, "experiment finished"),
            Err(e) => warn!(
                experiment_id = %self.experiment_id,
                error = %e,
                "parameters drained but experiment could not be marked finished"
            ),
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.experiment_id
    }

    pub fn options(&self) -> &ExperimentOptions {
        &self.options
    }

    /// Notion page backing this experiment, for fixing dropped values by hand.
    pub fn page_url(&self) -> String {
        page_url(&self.experiment_id)
    }

    /// Records queued or in flight.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.is_cancelled()
    }

    /// Waits until everything logged so far has been delivered or dropped.
    pub async fn flushed(&self) {
        self.queue.join().await;
    }

    pub fn telemetry(&self) -> DeliverySnapshot {
        self.telemetry
            .lock()
            .map(|recorder| recorder.snapshot())
            .unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<crate::error::DeliveryWarning> {
        self.telemetry
            .lock()
            .map(|recorder| recorder.warnings())
            .unwrap_or_default()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn stopped_token(&self) -> CancellationToken {
        self.stopped.clone()
    }
}

impl fmt::Debug for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("experiment_id", &self.experiment_id)
            .field("project", &self.options.project)
            .field("pending", &self.queue.pending())
            .finish_non_exhaustive()
    }
}

impl Drop for Experiment {
    /// An experiment dropped without `end()` still drains. On a
    /// multi-threaded runtime the drop waits for it; elsewhere the worker
    /// finishes in the background, or delivers its leftovers itself if the
    /// runtime shuts down first.
    fn drop(&mut self) {
        if self.stopped.is_cancelled() {
            return;
        }
        self.cancel.cancel();

        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                warn!(experiment_id = %self.experiment_id, "experiment dropped without end(), draining");
                let stopped = self.stopped.clone();
                tokio::task::block_in_place(|| handle.block_on(stopped.cancelled()));
            }
            _ => warn!(
                experiment_id = %self.experiment_id,
                "experiment dropped without end(), draining in background"
            ),
        }
    }
}

fn page_url(experiment_id: &str) -> String {
    format!("{}{}", NOTION_BASE_URL, experiment_id)
}

async fn register(
    options: &ExperimentOptions,
    service: &dyn ExperimentService,
    settings: &DeliverySettings,
) -> Result<String, StartupError> {
    let request = CreateExperimentRequest::from(options);
    let mut attempt = 1;
    loop {
        match service.create_experiment(&request).await {
            Ok(id) => return Ok(id),
            Err(err) if err.is_terminal_startup() || attempt >= settings.max_retries => {
                return Err(StartupError::from_service(err, attempt));
            }
            Err(err) => {
                warn!(attempt, error = %err, "experiment registration failed, retrying");
                tokio::time::sleep(settings.retry_delay).await;
                attempt += 1;
            }
        }
    }
}
