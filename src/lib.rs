pub mod config;
pub mod error;
pub mod kernel;
pub mod services;

use std::sync::Arc;

pub use config::{ClientConfig, DeliverySettings, ExperimentOptions};
pub use error::{DeliveryWarning, DropReason, ServiceError, ShutdownError, StartupError, ValidationError};
pub use kernel::hook::TerminationHook;
pub use kernel::record::ParameterValue;
pub use kernel::registry::SessionRegistry;
pub use kernel::session::Experiment;
pub use kernel::validator::NotionType;
pub use services::{ExperimentService, HttpExperimentService};

/// Starts an experiment against the HTTP API with default delivery settings
/// and makes it the process-wide active one, retiring any previous experiment.
///
/// The experiment is enrolled in the [`TerminationHook`], so Ctrl-C, SIGTERM
/// and runtime shutdown all drain it before the process goes away.
pub async fn start(client: &ClientConfig, options: ExperimentOptions) -> Result<Arc<Experiment>, StartupError> {
    let service = Arc::new(HttpExperimentService::new(client));
    SessionRegistry::global()
        .start(options, service, DeliverySettings::default())
        .await
}
