use async_trait::async_trait;
use axum::extract::{FromRequestParts, Query, State};
use axum::http::{header, request::Parts};
use serde::Deserialize;

use crate::api::errors::ApiError;
use crate::core::security::{self, Identity};
use crate::core::state::AppState;
use crate::db::types::Role;

/// Caller verified from the identity service's token.
pub(crate) struct CurrentUser(pub(crate) Identity);
pub(crate) struct CurrentStudent(pub(crate) Identity);
/// Teacher or admin.
pub(crate) struct CurrentStaff(pub(crate) Identity);

#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let from_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);

    // Browsers cannot set headers on websocket upgrades.
    from_header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(query)| query.access_token)
    })
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let token = bearer_token(parts)
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let identity = security::verify_token(&token, app_state.settings()).map_err(|err| {
            tracing::debug!(error = %err, "Rejected access token");
            ApiError::Unauthorized("Invalid authentication credentials")
        })?;

        Ok(CurrentUser(identity))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStudent {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(identity) = CurrentUser::from_request_parts(parts, state).await?;

        if identity.role == Role::Student {
            Ok(CurrentStudent(identity))
        } else {
            Err(ApiError::Forbidden("Student access required".to_string()))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStaff {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(identity) = CurrentUser::from_request_parts(parts, state).await?;

        match identity.role {
            Role::Teacher | Role::Admin => Ok(CurrentStaff(identity)),
            Role::Student => Err(ApiError::Forbidden("Teacher access required".to_string())),
        }
    }
}
