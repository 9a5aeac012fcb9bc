// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The HTTP error envelope: `{error: {code, message, trace_id}}`.
//!
//! Internal detail never leaks: the envelope message is the error's
//! display form, which is written for operators, and `internal` errors
//! are reduced to their code.

use apiary_core::{ApiaryError, TraceId};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// An error response carrying the request's trace id.
pub struct ErrorEnvelope {
    pub error: ApiaryError,
    pub trace_id: TraceId,
}

impl ErrorEnvelope {
    pub fn new(error: ApiaryError, trace_id: TraceId) -> Self {
        Self { error, trace_id }
    }
}

fn status_for(error: &ApiaryError) -> StatusCode {
    match error {
        ApiaryError::DbUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ApiaryError::NotFound(_) => StatusCode::NOT_FOUND,
        ApiaryError::SpecInvalid(_)
        | ApiaryError::ValidationFailed(_)
        | ApiaryError::SqlRejected(_)
        | ApiaryError::SqlBindMissing(_)
        | ApiaryError::Config(_) => StatusCode::BAD_REQUEST,
        ApiaryError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ApiaryError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        let message = match &self.error {
            ApiaryError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        let body = Json(json!({
            "error": {
                "code": self.error.code(),
                "message": message,
                "trace_id": self.trace_id.as_str(),
            }
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_covers_the_documented_codes() {
        assert_eq!(
            status_for(&ApiaryError::DbUnavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&ApiaryError::NotFound("bot".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ApiaryError::SpecInvalid("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ApiaryError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
