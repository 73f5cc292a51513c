// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session endpoints: password and OTP login, refresh, password reset.
//!
//! All of these are reachable without an access token. Refresh reads the
//! refresh token from the `Authorization` header.

use axum::{extract::State, http::HeaderMap, Json};

use crate::auth::AuthError;
use crate::error::ApiJson;
use crate::models::{
    LoginRequest, MessageResponse, RequestOtpRequest, ResetPasswordRequest, SessionResponse,
    ValidateOtpRequest,
};
use crate::state::AppState;

fn require(value: &str, field: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::BadRequest(format!("missing {field}")));
    }
    Ok(())
}

/// Log in with email or phone plus password.
#[utoipa::path(
    post,
    path = "/api/login",
    tag = "Sessions",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session established", body = SessionResponse),
        (status = 400, description = "Unknown account or wrong password", body = MessageResponse),
        (status = 406, description = "Account blocked or inactive", body = MessageResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<SessionResponse>, AuthError> {
    require(&req.username, "username")?;
    let session = state.sessions.login(&req.username, &req.password).await?;
    Ok(Json(session.into()))
}

/// Send a login OTP by SMS.
#[utoipa::path(
    post,
    path = "/api/requestOtp",
    tag = "Sessions",
    request_body = RequestOtpRequest,
    responses(
        (status = 200, description = "OTP sent", body = MessageResponse),
        (status = 400, description = "Account not found", body = MessageResponse)
    )
)]
pub async fn request_otp(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RequestOtpRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    require(&req.phone, "phone")?;
    state.sessions.request_otp(&req.phone).await?;
    Ok(Json(MessageResponse::new("OTP sent")))
}

/// Verify a login OTP.
///
/// Every call counts as a trial; past the limit the account is blocked.
#[utoipa::path(
    post,
    path = "/api/validateOtp",
    tag = "Sessions",
    request_body = ValidateOtpRequest,
    responses(
        (status = 200, description = "Session established", body = SessionResponse),
        (status = 400, description = "OTP mismatch or expired", body = MessageResponse),
        (status = 429, description = "Too many attempts; account blocked", body = MessageResponse)
    )
)]
pub async fn validate_otp(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ValidateOtpRequest>,
) -> Result<Json<SessionResponse>, AuthError> {
    require(&req.phone, "phone")?;
    require(&req.otp, "otp")?;
    let session = state.sessions.validate_otp(&req.phone, &req.otp).await?;
    Ok(Json(session.into()))
}

/// Exchange a refresh token for a new token pair.
#[utoipa::path(
    post,
    path = "/api/refresh",
    tag = "Sessions",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Session rotated", body = SessionResponse),
        (status = 401, description = "Invalid or spent refresh token", body = MessageResponse)
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, AuthError> {
    let session = state.sessions.refresh(&headers).await?;
    Ok(Json(session.into()))
}

/// Send a password-reset OTP by SMS.
#[utoipa::path(
    post,
    path = "/api/request-password-reset-otp",
    tag = "Password Reset",
    request_body = RequestOtpRequest,
    responses(
        (status = 200, description = "OTP sent", body = MessageResponse),
        (status = 400, description = "Account not found", body = MessageResponse)
    )
)]
pub async fn request_password_reset_otp(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RequestOtpRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    require(&req.phone, "phone")?;
    state.sessions.request_password_reset_otp(&req.phone).await?;
    Ok(Json(MessageResponse::new("OTP sent")))
}

/// Set a new password using a reset OTP.
#[utoipa::path(
    post,
    path = "/api/reset-password",
    tag = "Password Reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "OTP mismatch or expired", body = MessageResponse),
        (status = 429, description = "Too many attempts", body = MessageResponse)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    require(&req.username, "username")?;
    require(&req.otp, "otp")?;
    state
        .sessions
        .reset_password(&req.username, &req.otp, &req.new_password)
        .await?;
    Ok(Json(MessageResponse::new("password reset successful")))
}
