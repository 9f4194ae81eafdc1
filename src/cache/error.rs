//! Error values carried by load states and returned from write paths.
//!
//! Every error here is `Clone + Eq` because it is stored inside
//! [`LoadState::Error`](super::LoadState) and handed to many observers.

use thiserror::Error;

/// Requested model type has no registered store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown model type `{model_type}`")]
pub struct UnknownTypeError {
    pub model_type: String,
}

impl UnknownTypeError {
    pub fn new(model_type: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
        }
    }
}

/// A single field that failed validation during denormalization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failure reported by a [`ModelApi`](super::ModelApi) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("backend responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed backend response: {0}")]
    Decode(String),
    #[error("invalid request: {0}")]
    Request(String),
}

impl ApiError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(message.into())
    }

    /// HTTP status when the failure came from a backend response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("invalid {model_type} payload: {}", join_field_errors(.errors))]
    Validation {
        model_type: String,
        errors: Vec<FieldError>,
    },
    #[error("{count} invalid {model_type} models came from backend")]
    InvalidModels { model_type: String, count: usize },
    #[error("{model_type} `{id}` was not found on backend in default list")]
    NotFound { model_type: String, id: String },
    #[error("{model_type} response carried id `{received}` but `{expected}` was requested")]
    Consistency {
        model_type: String,
        expected: String,
        received: String,
    },
    #[error(transparent)]
    UnknownType(#[from] UnknownTypeError),
    #[error(transparent)]
    Transport(#[from] ApiError),
    #[error("registry backing the {model_type} store has been dropped")]
    Detached { model_type: String },
}

impl CacheError {
    pub fn validation(model_type: impl Into<String>, errors: Vec<FieldError>) -> Self {
        Self::Validation {
            model_type: model_type.into(),
            errors,
        }
    }

    pub fn missing_id(model_type: impl Into<String>) -> Self {
        Self::validation(model_type, vec![FieldError::new("id", "missing string id")])
    }

    pub fn invalid_models(model_type: impl Into<String>, count: usize) -> Self {
        Self::InvalidModels {
            model_type: model_type.into(),
            count,
        }
    }

    pub fn not_found(model_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            model_type: model_type.into(),
            id: id.into(),
        }
    }

    pub fn consistency(
        model_type: impl Into<String>,
        expected: impl Into<String>,
        received: impl Into<String>,
    ) -> Self {
        Self::Consistency {
            model_type: model_type.into(),
            expected: expected.into(),
            received: received.into(),
        }
    }

    pub fn detached(model_type: impl Into<String>) -> Self {
        Self::Detached {
            model_type: model_type.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_field() {
        let error = CacheError::validation(
            "Post",
            vec![
                FieldError::new("title", "required field is missing"),
                FieldError::new("author", "expected link, got boolean"),
            ],
        );

        assert_eq!(
            error.to_string(),
            "invalid Post payload: title: required field is missing; author: expected link, got boolean"
        );
    }

    #[test]
    fn transport_errors_convert_and_keep_status() {
        let error: CacheError = ApiError::status(503, "maintenance").into();

        assert!(error.is_transport());
        match error {
            CacheError::Transport(api) => assert_eq!(api.status_code(), Some(503)),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
