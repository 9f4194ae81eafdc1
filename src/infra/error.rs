use thiserror::Error;

/// Failures while wiring the cache to its outer infrastructure.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("failed to build http client: {message}")]
    HttpClient { message: String },
    #[error("`{resource}` is not a collection below `{base_url}`: {reason}")]
    InvalidResource {
        base_url: String,
        resource: String,
        reason: String,
    },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn http_client(message: impl Into<String>) -> Self {
        Self::HttpClient {
            message: message.into(),
        }
    }

    pub fn invalid_resource(
        base_url: &url::Url,
        resource: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidResource {
            base_url: base_url.to_string(),
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
