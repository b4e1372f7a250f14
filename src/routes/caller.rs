use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};

use crate::{dao::models::PlayerId, dto::validation::validate_player_id, error::AppError};

/// Header carrying the caller identity established by the upstream identity layer.
pub const PLAYER_ID_HEADER: &str = "x-player-id";

/// Identity of the player issuing the request.
#[derive(Debug, Clone)]
pub struct Caller(pub PlayerId);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        <Self as OptionalFromRequestParts<S>>::from_request_parts(parts, state)
            .await?
            .ok_or_else(|| AppError::BadRequest(format!("missing `{PLAYER_ID_HEADER}` header")))
    }
}

impl<S> OptionalFromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let Some(value) = parts.headers.get(PLAYER_ID_HEADER) else {
            return Ok(None);
        };
        let id = value
            .to_str()
            .map_err(|_| {
                AppError::BadRequest(format!("`{PLAYER_ID_HEADER}` header must be visible ASCII"))
            })?
            .trim();
        validate_player_id(id).map_err(|err| {
            AppError::BadRequest(format!("invalid `{PLAYER_ID_HEADER}` header: {err}"))
        })?;
        Ok(Some(Caller(id.to_string())))
    }
}
