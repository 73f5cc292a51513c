// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token service: issues and verifies HS256 access/refresh token pairs.
//!
//! ## Token Model
//!
//! - access token: `{access_uuid, user_id, user_name, exp, typ: "access"}`,
//!   signed with the access secret
//! - refresh token: `{refresh_uuid, user_id, user_name, exp, typ: "refresh"}`,
//!   signed with the refresh secret
//! - `refresh_uuid = access_uuid ++ "++" ++ user_id`
//!
//! The caller names the [`TokenKind`] it accepts. Verification picks the
//! matching secret and then checks `typ`, so one kind never passes as the
//! other. A valid signature does not make a session valid: the session cache
//! must still hold the token id.

use std::time::Duration;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use uuid::Uuid;

use super::claims::{derive_refresh_uuid, AccessDetails, SessionClaims, TokenDetails, TokenKind};
use super::AuthError;

/// Clock skew tolerance (5 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 5;

/// Secrets and lifetimes for token issuance.
#[derive(Clone)]
pub struct TokenOptions {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenOptions")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Stateless token issuer/verifier.
#[derive(Debug, Clone)]
pub struct TokenService {
    options: TokenOptions,
}

impl TokenService {
    pub fn new(options: TokenOptions) -> Self {
        Self { options }
    }

    pub fn access_ttl(&self) -> Duration {
        self.options.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.options.refresh_ttl
    }

    fn secret(&self, kind: TokenKind) -> &str {
        match kind {
            TokenKind::Access => &self.options.access_secret,
            TokenKind::Refresh => &self.options.refresh_secret,
        }
    }

    /// Issue a new access/refresh pair for an account.
    pub fn create_token(
        &self,
        account_id: u64,
        account_name: &str,
    ) -> Result<TokenDetails, AuthError> {
        let now = Utc::now().timestamp();
        let token_uuid = Uuid::new_v4().to_string();
        let refresh_uuid = derive_refresh_uuid(&token_uuid, account_id);
        let at_expires = now + self.options.access_ttl.as_secs() as i64;
        let rt_expires = now + self.options.refresh_ttl.as_secs() as i64;

        let access_token = self.sign(
            TokenKind::Access,
            &SessionClaims {
                access_uuid: Some(token_uuid.clone()),
                refresh_uuid: None,
                user_id: Some(account_id),
                user_name: Some(account_name.to_string()),
                exp: at_expires,
                typ: TokenKind::Access,
            },
        )?;

        let refresh_token = self.sign(
            TokenKind::Refresh,
            &SessionClaims {
                access_uuid: None,
                refresh_uuid: Some(refresh_uuid.clone()),
                user_id: Some(account_id),
                user_name: Some(account_name.to_string()),
                exp: rt_expires,
                typ: TokenKind::Refresh,
            },
        )?;

        Ok(TokenDetails {
            access_token,
            refresh_token,
            token_uuid,
            refresh_uuid,
            at_expires,
            rt_expires,
        })
    }

    fn sign(&self, kind: TokenKind, claims: &SessionClaims) -> Result<String, AuthError> {
        let secret = self.secret(kind);
        if secret.is_empty() {
            return Err(AuthError::SigningError(format!("{} secret is empty", kind.as_str())));
        }
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| AuthError::SigningError(e.to_string()))
    }

    /// Verify the bearer token in `headers` as a token of `kind`.
    pub fn verify_token(
        &self,
        headers: &HeaderMap,
        kind: TokenKind,
    ) -> Result<SessionClaims, AuthError> {
        self.verify_str(extract_token(headers), kind)
    }

    /// Verify a raw token string as a token of `kind`.
    pub fn verify_str(&self, token: &str, kind: TokenKind) -> Result<SessionClaims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.validate_aud = false;

        let data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret(kind).as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                AuthError::InvalidSignature
            }
            _ => AuthError::MalformedToken,
        })?;

        if data.claims.typ != kind {
            return Err(AuthError::Unauthorized);
        }
        Ok(data.claims)
    }

    /// Verify, then pull the identity out of the claims.
    pub fn extract_token_metadata(
        &self,
        headers: &HeaderMap,
        kind: TokenKind,
    ) -> Result<AccessDetails, AuthError> {
        let claims = self.verify_token(headers, kind)?;
        access_details(claims)
    }

    /// Signature and expiry check only.
    pub fn token_valid(&self, headers: &HeaderMap, kind: TokenKind) -> Result<(), AuthError> {
        self.verify_token(headers, kind).map(|_| ())
    }
}

/// Identity from verified claims. The refresh id wins over the access id.
pub fn access_details(claims: SessionClaims) -> Result<AccessDetails, AuthError> {
    let token_uuid = [claims.refresh_uuid, claims.access_uuid]
        .into_iter()
        .flatten()
        .find(|id| !id.is_empty())
        .ok_or(AuthError::Unauthorized)?;
    let user_id = claims.user_id.ok_or(AuthError::Unauthorized)?;
    let user_name = claims.user_name.ok_or(AuthError::Unauthorized)?;
    Ok(AccessDetails {
        token_uuid,
        user_id,
        user_name,
    })
}

/// Bearer token from the `Authorization` header.
///
/// The header must have exactly two whitespace-separated fields; the token is
/// the second. Anything else yields an empty string.
pub fn extract_token(headers: &HeaderMap) -> &str {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return "";
    };
    let mut fields = value.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(_), Some(token), None) => token,
        _ => "",
    }
}
