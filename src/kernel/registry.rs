use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::session::Experiment;
use crate::config::{DeliverySettings, ExperimentOptions};
use crate::error::StartupError;
use crate::services::ExperimentService;

/// Holds the single active experiment.
///
/// Installing a new experiment retires the previous one first. Retiring is
/// best effort: a failed shutdown is logged and the replacement goes ahead.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    active: Mutex<Option<Arc<Experiment>>>,
}

static GLOBAL: OnceLock<SessionRegistry> = OnceLock::new();

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by [`crate::start`].
    pub fn global() -> &'static SessionRegistry {
        GLOBAL.get_or_init(SessionRegistry::new)
    }

    /// Starts an experiment and makes it the active one.
    ///
    /// Nothing is retired when registration fails.
    pub async fn start(
        &self,
        options: ExperimentOptions,
        service: Arc<dyn ExperimentService>,
        settings: DeliverySettings,
    ) -> Result<Arc<Experiment>, StartupError> {
        let experiment = Experiment::start(options, service, settings).await?;
        Ok(self.replace(experiment).await)
    }

    /// Installs `experiment`, shutting down whichever one was active.
    pub async fn replace(&self, experiment: Experiment) -> Arc<Experiment> {
        let experiment = Arc::new(experiment);
        let mut slot = self.active.lock().await;

        if let Some(previous) = slot.take() {
            info!(
                previous = %previous.id(),
                next = %experiment.id(),
                "retiring active experiment"
            );
            if let Err(e) = previous.end().await {
                warn!(error = %e, "previous experiment did not shut down cleanly");
            }
        }

        *slot = Some(experiment.clone());
        experiment
    }

    pub async fn active(&self) -> Option<Arc<Experiment>> {
        self.active.lock().await.clone()
    }

    /// Ends the active experiment, if any, and empties the slot.
    pub async fn shutdown(&self) {
        let previous = self.active.lock().await.take();
        if let Some(experiment) = previous {
            if let Err(e) = experiment.end().await {
                error!(error = %e, "experiment shutdown failed");
            }
        }
    }
}
