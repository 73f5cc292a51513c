// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and session errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::notify::NotifyError;
use crate::storage::{CacheError, StoreError};

/// Error type for every session, token and policy-gate failure.
///
/// Internal variants (store, cache, signing...) render a generic message; the
/// detail is logged server side only.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    BadRequest(String),

    #[error("account not found")]
    NotFound,

    #[error("wrong password")]
    WrongPassword,

    #[error("OTP do not match")]
    OtpMismatch,

    #[error("OTP expired, request another OTP")]
    OtpExpired,

    /// Bearer string is empty or the header is malformed.
    #[error("unauthorized: missing token")]
    MissingToken,

    #[error("unauthorized: invalid token signature")]
    InvalidSignature,

    #[error("unauthorized: token has expired")]
    TokenExpired,

    #[error("unauthorized: malformed token")]
    MalformedToken,

    /// Token verified but is unusable (wrong kind, missing claims, revoked).
    #[error("unauthorized")]
    Unauthorized,

    /// Refresh token id no longer resolvable.
    #[error("please login")]
    PleaseLogin,

    #[error("forbidden")]
    Forbidden,

    #[error("account is blocked")]
    AccountBlocked,

    #[error("account is inactive")]
    AccountInactive,

    #[error("reset password")]
    MustResetPassword,

    /// OTP trial limit exceeded. `blocked` is set when the account was
    /// locked as a result.
    #[error("{}", attempts_message(.blocked))]
    TooManyAttempts { blocked: bool },

    #[error("policy engine error: {0}")]
    AuthzError(String),

    #[error("failed to persist session: {0}")]
    SessionPersistError(String),

    #[error("failed to sign token: {0}")]
    SigningError(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("notifier error: {0}")]
    Notify(#[from] NotifyError),
}

fn attempts_message(blocked: &bool) -> &'static str {
    if *blocked {
        "account is blocked due to too many attempts"
    } else {
        "maximum OTP attempts reached"
    }
}

#[derive(Serialize)]
struct AuthErrorBody {
    message: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::BadRequest(_) => "bad_request",
            AuthError::NotFound => "account_not_found",
            AuthError::WrongPassword => "wrong_password",
            AuthError::OtpMismatch => "otp_mismatch",
            AuthError::OtpExpired => "otp_expired",
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::MalformedToken => "malformed_token",
            AuthError::Unauthorized => "unauthorized",
            AuthError::PleaseLogin => "please_login",
            AuthError::Forbidden => "forbidden",
            AuthError::AccountBlocked => "account_blocked",
            AuthError::AccountInactive => "account_inactive",
            AuthError::MustResetPassword => "must_reset_password",
            AuthError::TooManyAttempts { .. } => "too_many_attempts",
            AuthError::AuthzError(_) => "authz_error",
            AuthError::SessionPersistError(_) => "session_persist_error",
            AuthError::SigningError(_) => "signing_error",
            AuthError::PasswordHash(_)
            | AuthError::Store(_)
            | AuthError::Cache(_)
            | AuthError::Notify(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::BadRequest(_)
            | AuthError::NotFound
            | AuthError::WrongPassword
            | AuthError::OtpMismatch
            | AuthError::OtpExpired => StatusCode::BAD_REQUEST,
            AuthError::MissingToken
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::MalformedToken
            | AuthError::Unauthorized
            | AuthError::PleaseLogin => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::AccountBlocked
            | AuthError::AccountInactive
            | AuthError::MustResetPassword => StatusCode::NOT_ACCEPTABLE,
            AuthError::TooManyAttempts { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::AuthzError(_)
            | AuthError::SessionPersistError(_)
            | AuthError::SigningError(_)
            | AuthError::PasswordHash(_)
            | AuthError::Store(_)
            | AuthError::Cache(_)
            | AuthError::Notify(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the client.
    pub fn public_message(&self) -> String {
        if self.status_code().is_server_error() {
            "internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        }
        let body = Json(AuthErrorBody {
            message: self.public_message(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
