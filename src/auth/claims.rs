// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session token claims and token pair types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Which half of a token pair a token is.
///
/// Selects the verification secret and must match the token's `typ` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Claims carried by both access and refresh tokens.
///
/// Access tokens carry `access_uuid`, refresh tokens `refresh_uuid`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_uuid: Option<String>,

    #[serde(default)]
    pub user_id: Option<u64>,

    #[serde(default)]
    pub user_name: Option<String>,

    /// Expiration timestamp (Unix seconds)
    pub exp: i64,

    pub typ: TokenKind,
}

/// A freshly issued token pair plus the ids the cache is keyed by.
#[derive(Debug, Clone)]
pub struct TokenDetails {
    pub access_token: String,
    pub refresh_token: String,
    pub token_uuid: String,
    pub refresh_uuid: String,
    /// Access token expiry (Unix seconds)
    pub at_expires: i64,
    /// Refresh token expiry (Unix seconds)
    pub rt_expires: i64,
}

/// Identity extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AccessDetails {
    /// Token id the session cache is keyed by (access or refresh id).
    pub token_uuid: String,
    pub user_id: u64,
    pub user_name: String,
}

impl AccessDetails {
    /// Refresh id paired with this access token id.
    pub fn refresh_uuid(&self) -> String {
        derive_refresh_uuid(&self.token_uuid, self.user_id)
    }
}

/// `<token_uuid>++<account_id>`
pub fn derive_refresh_uuid(token_uuid: &str, account_id: u64) -> String {
    format!("{token_uuid}++{account_id}")
}
