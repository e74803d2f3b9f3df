//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use coophub_domain::error::{CoopHubError, ValidationError};

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps [`CoopHubError`] to an HTTP response with appropriate status code.
#[derive(Debug)]
pub struct ApiError(CoopHubError);

impl From<CoopHubError> for ApiError {
    fn from(err: CoopHubError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            CoopHubError::Validation(err) => (StatusCode::BAD_REQUEST, validation_message(err)),
            CoopHubError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string()),
            CoopHubError::Storage(err) => {
                tracing::error!(error = %err, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// The error message followed by its sources, so a bad cron expression
/// reports which field was wrong.
fn validation_message(err: &ValidationError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use coophub_domain::error::NotFoundError;

    #[test]
    fn should_map_validation_to_bad_request() {
        let response = ApiError::from(ValidationError::NoChanges).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn should_map_not_found_to_404() {
        let err = CoopHubError::from(NotFoundError {
            entity: "Schedule",
            id: "x".to_string(),
        });
        assert_eq!(ApiError::from(err).into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn should_include_source_chain_in_validation_message() {
        let err = coophub_domain::cron::CronExpression::parse("* * *").unwrap_err();
        let message = validation_message(&ValidationError::InvalidScheduleExpression {
            expression: "* * *".to_string(),
            source: err,
        });
        assert!(message.starts_with("invalid schedule expression"));
        assert!(message.contains("expected 5 fields"));
    }
}
