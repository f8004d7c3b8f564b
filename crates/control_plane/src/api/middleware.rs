//! Request authentication for admin and host routes.

use crate::api::AppState;
use crate::error::AppError;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use subtle::ConstantTimeEq;
use weaver_types::HostId;

pub const OPERATOR_KEY_HEADER: &str = "x-operator-key";

/// Extractor for requests carrying the operator API key
pub struct Operator;

/// Extractor resolving a host bearer token to its host id
pub struct AuthenticatedHost(pub HostId);

#[async_trait]
impl FromRequestParts<AppState> for Operator {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(OPERATOR_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing operator key".into()))?;

        let expected = state.operator_key.as_bytes();
        if expected.is_empty() || !bool::from(provided.as_bytes().ct_eq(expected)) {
            return Err(AppError::Unauthorized("Invalid operator key".into()));
        }
        Ok(Operator)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedHost {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts)?;
        let host_id = state.auth.authenticate(token).await?;
        Ok(AuthenticatedHost(host_id))
    }
}

fn extract_bearer_token(parts: &Parts) -> Result<&str, AppError> {
    parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Expected a Bearer token".into()))
}
