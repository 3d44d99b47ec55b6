use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ClientConfig, ExperimentOptions};
use crate::error::ServiceError;
use crate::kernel::record::ParameterPayload;

/// Remote status of an experiment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperimentStatus {
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateExperimentRequest {
    pub project: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl From<&ExperimentOptions> for CreateExperimentRequest {
    fn from(options: &ExperimentOptions) -> Self {
        Self {
            project: options.project.clone(),
            name: options.name.clone(),
            description: options.description.clone(),
            tags: options.tags.clone(),
        }
    }
}

#[derive(Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Serialize)]
struct StatusUpdate {
    status: ExperimentStatus,
}

/// The calls the session and its worker make against ExperimentHQ.
#[async_trait]
pub trait ExperimentService: Send + Sync {
    /// Registers a new experiment and returns its id.
    async fn create_experiment(&self, request: &CreateExperimentRequest) -> Result<String, ServiceError>;

    async fn append_parameters(&self, experiment_id: &str, batch: &[ParameterPayload]) -> Result<(), ServiceError>;

    async fn update_status(&self, experiment_id: &str, status: ExperimentStatus) -> Result<(), ServiceError>;
}

/// reqwest-backed client for the ExperimentHQ REST API.
#[derive(Clone)]
pub struct HttpExperimentService {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpExperimentService {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(config.request_timeout)
                .build()
                .unwrap_or_default(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn check(response: Response) -> Result<Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ServiceError::from_status(status.as_u16(), message))
    }
}

impl fmt::Debug for HttpExperimentService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpExperimentService")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ExperimentService for HttpExperimentService {
    async fn create_experiment(&self, request: &CreateExperimentRequest) -> Result<String, ServiceError> {
        let response = self.client.post(self.url("experiments"))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let body = Self::check(response).await?.text().await?;
        let parsed: CreateExperimentResponse = serde_json::from_str(&body)
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

        debug!(experiment_id = %parsed.experiment_id, "experiment registered");
        Ok(parsed.experiment_id)
    }

    async fn append_parameters(&self, experiment_id: &str, batch: &[ParameterPayload]) -> Result<(), ServiceError> {
        let response = self.client.post(self.url(&format!("experiments/{}/parameters", experiment_id)))
            .bearer_auth(&self.api_key)
            .json(batch)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn update_status(&self, experiment_id: &str, status: ExperimentStatus) -> Result<(), ServiceError> {
        let response = self.client.patch(self.url(&format!("experiments/{}", experiment_id)))
            .bearer_auth(&self.api_key)
            .json(&StatusUpdate { status })
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
