use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::engine::LedgerError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("malformed query string: {0}")]
    MalformedQuery(String),

    #[error("malformed path: {0}")]
    MalformedPath(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedBody(_) | ApiError::MalformedQuery(_) | ApiError::MalformedPath(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Ledger(e) => ledger_status(e),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MalformedBody(_) => "malformed_body",
            ApiError::MalformedQuery(_) => "malformed_query",
            ApiError::MalformedPath(_) => "malformed_path",
            ApiError::Ledger(e) => e.kind(),
        }
    }
}

fn ledger_status(e: &LedgerError) -> StatusCode {
    use LedgerError::*;
    match e {
        InvalidDateRange { .. } | InvalidQuantity { .. } | Invalid(_) | LimitExceeded(_) => {
            StatusCode::BAD_REQUEST
        }
        InvalidCredentials => StatusCode::UNAUTHORIZED,
        RoomNotFound(_) | BookingNotFound(_) | UserNotFound(_) | ServiceNotFound(_)
        | PaymentNotFound(_) => StatusCode::NOT_FOUND,
        DateConflict { .. }
        | RoomUnderMaintenance(_)
        | AlreadyCancelled(_)
        | InvalidTransition { .. }
        | DuplicateRoomNumber(_)
        | DuplicateEmail(_)
        | RoomHasBookings(_)
        | ServiceUnavailable(_)
        | PaymentAlreadySettled(_)
        | BookingNotPayable { .. } => StatusCode::CONFLICT,
        Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            error,
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::MalformedBody(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::MalformedQuery(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::MalformedPath(rejection.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
