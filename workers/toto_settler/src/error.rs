use reqwest::StatusCode;

/// Failures surfaced by a [`DataService`](crate::service::DataService).
///
/// The variants map onto the worker's handling policy: `Auth` and `Transient`
/// abandon the current stage, everything else is scoped to a single record.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("transient service failure: {0}")]
    Transient(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflicting update: {0}")]
    Conflict(String),
    #[error("rejected by service: {0}")]
    Validation(String),
    #[error("invalid {collection} record {id}: {reason}")]
    InvalidRecord {
        collection: &'static str,
        id: String,
        reason: String,
    },
}

impl ServiceError {
    /// Classifies a non-success HTTP status.
    pub fn from_status(status: StatusCode, context: impl Into<String>) -> Self {
        let context = format!("HTTP {}: {}", status.as_u16(), context.into());
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Auth(context),
            StatusCode::NOT_FOUND => ServiceError::NotFound(context),
            StatusCode::CONFLICT => ServiceError::Conflict(context),
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
                ServiceError::Transient(context)
            }
            s if s.is_server_error() => ServiceError::Transient(context),
            s if s.is_client_error() => ServiceError::Validation(context),
            _ => ServiceError::Transient(context),
        }
    }

    pub fn invalid_record(
        collection: &'static str,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ServiceError::InvalidRecord {
            collection,
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ServiceError::Auth(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }

    /// Id of the offending record for schema violations.
    pub fn record_id(&self) -> Option<&str> {
        match self {
            ServiceError::InvalidRecord { id, .. } => Some(id),
            _ => None,
        }
    }

    /// True when the failure should abandon the rest of the stage rather than
    /// just the record being processed.
    pub fn aborts_stage(&self) -> bool {
        self.is_auth() || self.is_transient()
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ServiceError::from_status(status, err.to_string()),
            None => ServiceError::Transient(format!("HTTP request failed: {}", err)),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}
