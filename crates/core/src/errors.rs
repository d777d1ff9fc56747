use rust_decimal::Decimal;
use thiserror::Error;

/// Input-schema failures raised before a request reaches the accounting backend.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("`{field}` is required")]
    MissingField { field: &'static str },
    #[error("`{field}` must be a positive amount, got {value}")]
    NonPositiveAmount { field: &'static str, value: Decimal },
    #[error("`{field}` must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
}

/// Failure paths that the assistant recovers from without surfacing an error.
///
/// Callers never see these as errors; they are reported next to the
/// user-facing response so logs and tests can tell which path was taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    ModelUnavailable,
    MalformedModelResponse,
    InsufficientEntities,
    ExternalOperationFailure,
    Validation,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelUnavailable => "model_unavailable",
            Self::MalformedModelResponse => "malformed_model_response",
            Self::InsufficientEntities => "insufficient_entities",
            Self::ExternalOperationFailure => "external_operation_failure",
            Self::Validation => "validation",
        }
    }

    /// Validation failures are reported to the user the same way as backend
    /// rejections.
    pub fn user_facing(self) -> Self {
        match self {
            Self::Validation => Self::ExternalOperationFailure,
            other => other,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::errors::{FailureKind, ValidationError};

    #[test]
    fn validation_is_reported_as_external_failure() {
        assert_eq!(FailureKind::Validation.user_facing(), FailureKind::ExternalOperationFailure);
        assert_eq!(
            FailureKind::InsufficientEntities.user_facing(),
            FailureKind::InsufficientEntities
        );
    }

    #[test]
    fn validation_messages_name_the_field() {
        let error =
            ValidationError::NonPositiveAmount { field: "amount", value: Decimal::new(-5, 0) };
        assert_eq!(error.to_string(), "`amount` must be a positive amount, got -5");
        assert_eq!(
            ValidationError::MissingField { field: "client" }.to_string(),
            "`client` is required"
        );
    }

    #[test]
    fn failure_kinds_render_as_snake_case() {
        assert_eq!(FailureKind::ModelUnavailable.to_string(), "model_unavailable");
        assert_eq!(FailureKind::MalformedModelResponse.as_str(), "malformed_model_response");
    }
}
