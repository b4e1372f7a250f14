use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::{roles::AssignError, state_machine::InvalidTransition},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Session or player does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Caller is not allowed to perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Operation is not legal in the session's current phase.
    #[error("invalid phase: {0}")]
    InvalidPhase(String),
    /// Session already holds its maximum number of active players.
    #[error("session is full ({max} active players)")]
    Capacity {
        /// Seat limit of the session.
        max: u32,
    },
    /// Not enough active players to deal roles.
    #[error("at least {needed} active players are required, found {found}")]
    InsufficientPlayers {
        /// Minimum number of active players.
        needed: usize,
        /// Active players at the time of the attempt.
        found: usize,
    },
    /// Voter already cast a ballot this round.
    #[error("player has already voted this round")]
    DuplicateVote,
    /// Voter targeted themselves.
    #[error("players cannot vote for themselves")]
    SelfVote,
    /// Vote target is missing, inactive, or spectating.
    #[error("invalid vote target: {0}")]
    InvalidTarget(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidPhase(err.to_string())
    }
}

impl From<AssignError> for ServiceError {
    fn from(err: AssignError) -> Self {
        match err {
            AssignError::NotEnoughPlayers { needed, found } => {
                ServiceError::InsufficientPlayers { needed, found }
            }
            AssignError::WordPoolTooSmall { .. } => ServiceError::InvalidInput(err.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Caller lacks the rights for this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {message}")]
    Conflict {
        /// Stable machine-readable reason.
        code: &'static str,
        /// Human-readable detail.
        message: String,
    },
    /// Well-formed request that breaks a game rule.
    #[error("unprocessable: {message}")]
    Unprocessable {
        /// Stable machine-readable reason.
        code: &'static str,
        /// Human-readable detail.
        message: String,
    },
    /// Service unavailable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "invalid_input",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict { code, .. } | AppError::Unprocessable { code, .. } => *code,
            AppError::ServiceUnavailable(_) => "unavailable",
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Unavailable(source) => {
                tracing::error!(
                    operation = source.operation(),
                    error = ?source,
                    "session store unavailable"
                );
                AppError::ServiceUnavailable(source.to_string())
            }
            ServiceError::Timeout => AppError::ServiceUnavailable(message),
            ServiceError::NotFound(detail) => AppError::NotFound(detail),
            ServiceError::Forbidden(detail) => AppError::Forbidden(detail),
            ServiceError::InvalidInput(detail) => AppError::BadRequest(detail),
            ServiceError::InvalidPhase(_) => AppError::Conflict {
                code: "invalid_phase",
                message,
            },
            ServiceError::Capacity { .. } => AppError::Conflict {
                code: "capacity",
                message,
            },
            ServiceError::DuplicateVote => AppError::Conflict {
                code: "duplicate_vote",
                message,
            },
            ServiceError::InsufficientPlayers { .. } => AppError::Unprocessable {
                code: "insufficient_players",
                message,
            },
            ServiceError::SelfVote => AppError::Unprocessable {
                code: "self_vote",
                message,
            },
            ServiceError::InvalidTarget(_) => AppError::Unprocessable {
                code: "invalid_target",
                message,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            code: self.code(),
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_rule_errors_map_to_distinct_statuses() {
        let cases = [
            (ServiceError::NotFound("session".into()), StatusCode::NOT_FOUND),
            (ServiceError::Forbidden("host only".into()), StatusCode::FORBIDDEN),
            (ServiceError::DuplicateVote, StatusCode::CONFLICT),
            (ServiceError::Capacity { max: 3 }, StatusCode::CONFLICT),
            (ServiceError::SelfVote, StatusCode::UNPROCESSABLE_ENTITY),
            (
                ServiceError::InsufficientPlayers { needed: 3, found: 2 },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ServiceError::InvalidInput("name".into()), StatusCode::BAD_REQUEST),
            (ServiceError::Timeout, StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn rule_errors_keep_their_code_and_detail() {
        let err = AppError::from(ServiceError::Capacity { max: 3 });
        assert_eq!(err.code(), "capacity");
        assert_eq!(err.to_string(), "conflict: session is full (3 active players)");

        let err = AppError::from(ServiceError::SelfVote);
        assert_eq!(err.code(), "self_vote");
        assert_eq!(
            err.to_string(),
            "unprocessable: players cannot vote for themselves"
        );

        let outage = StorageError::unavailable("find session", std::io::Error::other("refused"));
        let err = AppError::from(ServiceError::from(outage));
        assert_eq!(err.code(), "unavailable");
        assert_eq!(
            err.to_string(),
            "service unavailable: session store could not find session"
        );
    }

    #[test]
    fn assign_errors_convert_to_insufficient_players() {
        let err: ServiceError = AssignError::NotEnoughPlayers { needed: 3, found: 1 }.into();
        assert!(matches!(
            err,
            ServiceError::InsufficientPlayers { needed: 3, found: 1 }
        ));
    }
}
