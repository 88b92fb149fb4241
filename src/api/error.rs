use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::{CateringError, FieldErrors};

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<FieldErrors>,
}

impl CateringError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::MockPaymentRejected => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PaymentAlreadyCompleted(_) => StatusCode::CONFLICT,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CateringError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, errors) = match self {
            Self::Validation(errors) => ("Validation failed".to_string(), Some(errors)),
            Self::Gateway(err) => {
                tracing::error!(error = %err, "Payment gateway failure");
                ("Payment service is unavailable, please try again".to_string(), None)
            }
            Self::Storage(err) => {
                tracing::error!(error = %err, "Storage failure");
                ("Internal server error".to_string(), None)
            }
            Self::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("Internal server error".to_string(), None)
            }
            Self::Unauthorized(reason) => {
                tracing::warn!("Unauthorized: {}", reason);
                (reason, None)
            }
            other => (other.to_string(), None),
        };
        (status, Json(ErrorBody { success: false, message, errors })).into_response()
    }
}

impl From<JsonRejection> for CateringError {
    fn from(rejection: JsonRejection) -> Self {
        CateringError::invalid("body", rejection.body_text())
    }
}

impl From<QueryRejection> for CateringError {
    fn from(rejection: QueryRejection) -> Self {
        CateringError::invalid("query", rejection.body_text())
    }
}
