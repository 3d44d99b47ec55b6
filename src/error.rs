use std::fmt;

use thiserror::Error;

use crate::kernel::validator::NotionType;

/// Raised synchronously by `log_parameter` before anything is queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("parameter name must not be empty")]
    EmptyName,

    #[error("unknown notion type `{0}`")]
    UnknownType(String),

    #[error("value `{value}` is not a valid {kind}")]
    InvalidValue { kind: NotionType, value: String },
}

/// Errors reported by the remote experiment service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid API key")]
    Unauthorized,

    #[error("maximum number of experiments reached")]
    QuotaExceeded,

    #[error("ExperimentHQ database not found")]
    NotFound,

    #[error("request timed out")]
    Timeout,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unexpected status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// Maps a non-success HTTP status and its body onto the taxonomy.
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            400 => ServiceError::BadRequest(message),
            401 => ServiceError::Unauthorized,
            403 => ServiceError::QuotaExceeded,
            404 => ServiceError::NotFound,
            408 => ServiceError::Timeout,
            _ => ServiceError::Status { code, message },
        }
    }

    /// 401, 400 and 404 on a parameter batch will not go away by resending.
    pub fn is_retryable_delivery(&self) -> bool {
        !matches!(
            self,
            ServiceError::Unauthorized | ServiceError::BadRequest(_) | ServiceError::NotFound
        )
    }

    /// 401, 403, 404 and 408 abort experiment registration immediately.
    pub fn is_terminal_startup(&self) -> bool {
        matches!(
            self,
            ServiceError::Unauthorized
                | ServiceError::QuotaExceeded
                | ServiceError::NotFound
                | ServiceError::Timeout
        )
    }
}

/// Session construction failed; nothing was queued or spawned.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid API key")]
    InvalidApiKey,

    #[error("maximum number of experiments reached")]
    QuotaExceeded,

    #[error("ExperimentHQ database not found")]
    DatabaseNotFound,

    #[error("experiment registration timed out")]
    Timeout,

    #[error("failed to start experiment after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: ServiceError,
    },
}

impl StartupError {
    pub(crate) fn from_service(err: ServiceError, attempts: u32) -> Self {
        match err {
            ServiceError::Unauthorized => StartupError::InvalidApiKey,
            ServiceError::QuotaExceeded => StartupError::QuotaExceeded,
            ServiceError::NotFound => StartupError::DatabaseNotFound,
            ServiceError::Timeout => StartupError::Timeout,
            source => StartupError::RetriesExhausted { attempts, source },
        }
    }
}

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("delivery worker for experiment {experiment_id} panicked")]
    WorkerPanicked { experiment_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value `{value}` for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Emitted (never thrown) whenever the worker gives up on a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryWarning {
    pub parameter_name: String,
    pub parameter_value: String,
    pub page_url: String,
    pub retry_count: u32,
    pub reason: DropReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Rejected with a non-retryable status.
    Rejected(String),
    RetriesExhausted,
    /// The runtime went away mid-retry; one last attempt failed.
    Interrupted(String),
}

impl fmt::Display for DeliveryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to log parameter `{}` with value: `{}`",
            self.parameter_name, self.parameter_value
        )?;
        match &self.reason {
            DropReason::Rejected(reason) => write!(f, " ({})", reason)?,
            DropReason::RetriesExhausted => write!(f, " after {} attempts", self.retry_count)?,
            DropReason::Interrupted(reason) => write!(f, " before shutdown ({})", reason)?,
        }
        write!(
            f,
            ". Please add it manually to the corresponding Notion page: {}.",
            self.page_url
        )
    }
}
