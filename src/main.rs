use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use experimenthq::{
    ClientConfig, DeliverySettings, ExperimentOptions, HttpExperimentService, NotionType,
    ParameterValue, SessionRegistry,
};

const USAGE: &str = "usage: experimenthq <project> [name=value[:notion_type]]...";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Setup Logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    // 2. Configuration
    let mut args = std::env::args().skip(1);
    let Some(project) = args.next() else {
        bail!(USAGE);
    };
    let parameters = args.map(|arg| parse_parameter(&arg)).collect::<Result<Vec<_>>>()?;

    let client = ClientConfig::from_env()?;
    let settings = DeliverySettings::from_env()?;
    tracing::debug!(?client, ?settings, "configuration loaded");

    // 3. Start the experiment
    let registry = SessionRegistry::global();
    let service = Arc::new(HttpExperimentService::new(&client));
    let experiment = registry
        .start(ExperimentOptions::new(project), service, settings)
        .await?;
    tracing::info!(page = %experiment.page_url(), "logging to experiment");

    // 4. Log
    for (name, value, kind) in parameters {
        experiment.log_parameter(name, value, kind)?;
    }

    // 5. Drain. Ctrl-C is handled by the termination hook, which drains too.
    experiment.flushed().await;
    registry.shutdown().await;

    let warnings = experiment.warnings();
    let stats = experiment.telemetry();
    tracing::info!(
        delivered = stats.outcome_stats.delivered_items,
        dropped = warnings.len(),
        "done"
    );
    Ok(())
}

fn parse_parameter(arg: &str) -> Result<(String, ParameterValue, Option<NotionType>)> {
    let Some((name, rest)) = arg.split_once('=') else {
        bail!("expected name=value, got `{}`\n{}", arg, USAGE);
    };

    let (raw, kind) = match rest.rsplit_once(':') {
        Some((raw, kind)) => match kind.parse::<NotionType>() {
            Ok(kind) => (raw, Some(kind)),
            // Not a type suffix, e.g. a URL with a port.
            Err(_) => (rest, None),
        },
        None => (rest, None),
    };

    Ok((name.to_string(), ParameterValue::infer(raw), kind))
}
