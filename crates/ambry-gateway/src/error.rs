// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error-to-status mapping for the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use ambry_core::AmbryError;

/// Single-line error body returned by write endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Wrapper making `AmbryError` an axum response.
pub struct ApiError(pub AmbryError);

impl From<AmbryError> for ApiError {
    fn from(e: AmbryError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AmbryError::Validation(_) => StatusCode::BAD_REQUEST,
            AmbryError::NotFound(_) => StatusCode::NOT_FOUND,
            AmbryError::State(_) | AmbryError::Conflict(_) => StatusCode::CONFLICT,
            AmbryError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AmbryError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AmbryError::Vcs(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AmbryError::StorageUnavailable { .. } | AmbryError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
