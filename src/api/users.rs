// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use axum::{extract::State, http::HeaderMap, Json};

use crate::auth::{Auth, AuthError};
use crate::models::{AccountProfile, MessageResponse};
use crate::state::AppState;

/// Get the current authenticated account.
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Account information", body = AccountProfile),
        (status = 401, description = "Unauthorized - invalid, missing or revoked token"),
    )
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    Auth(caller): Auth,
) -> Result<Json<AccountProfile>, AuthError> {
    let account = state
        .accounts
        .find_by_id(caller.user_id)
        .await?
        .ok_or(AuthError::Unauthorized)?;
    Ok(Json(account.into()))
}

/// Revoke the caller's access and refresh token ids.
///
/// Always succeeds, including for a missing or already revoked token.
#[utoipa::path(
    post,
    path = "/api/v1/users/logout",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
    )
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Json<MessageResponse> {
    state.sessions.logout(&headers).await;
    Json(MessageResponse::new("Successfully logged out"))
}
