use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

/// Failures of a match operation, reported to the offending connection only.
///
/// Every variant is raised before the room is mutated, so an error never leaves
/// partial state behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// The connection has not identified itself yet.
    #[error("connection is not identified")]
    NotAuthenticated,
    /// Both seats are held by other players.
    #[error("match is full")]
    RoomFull,
    /// No live room exists under the given id.
    #[error("match not found")]
    RoomNotFound,
    /// The action is not permitted in the current phase.
    #[error("action not allowed in the current phase")]
    NotActive,
    /// The player already answered the current question.
    #[error("question already answered")]
    AlreadyAnswered,
    /// The player already holds a live match.
    #[error("player is already in a match")]
    AlreadyInMatch,
    /// The question source failed; recovered through the built-in set.
    #[error("question source unavailable")]
    ContentSourceUnavailable,
    /// The player does not hold a seat in this room.
    #[error("player is not part of this match")]
    NotParticipant,
    /// The answer targets another question than the one open.
    #[error("answer for question {got} but question {expected} is open")]
    StaleAnswer {
        /// Index of the open question, if any.
        expected: i64,
        /// Index carried by the answer.
        got: usize,
    },
    /// The inbound frame could not be understood.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl MatchError {
    /// Stable machine-readable code sent in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            MatchError::NotAuthenticated => "not_authenticated",
            MatchError::RoomFull => "room_full",
            MatchError::RoomNotFound => "room_not_found",
            MatchError::NotActive => "not_active",
            MatchError::AlreadyAnswered => "already_answered",
            MatchError::AlreadyInMatch => "already_in_match",
            MatchError::ContentSourceUnavailable => "content_source_unavailable",
            MatchError::NotParticipant => "not_participant",
            MatchError::StaleAnswer { .. } => "stale_answer",
            MatchError::InvalidMessage(_) => "invalid_message",
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_answer_reports_both_indices() {
        let err = MatchError::StaleAnswer {
            expected: 2,
            got: 1,
        };
        assert_eq!(err.code(), "stale_answer");
        assert_eq!(err.to_string(), "answer for question 1 but question 2 is open");
    }

    #[test]
    fn degraded_service_maps_to_unavailable() {
        let response = AppError::from(ServiceError::Degraded).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
