// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies for the REST API. All types derive
//! `ToSchema` for the OpenAPI document served at `/docs`.
//!
//! ## Model Categories
//!
//! - **Sessions**: login, OTP and refresh requests; the `{token, user,
//!   hasCredential}` session response
//! - **Password reset**: reset OTP and new password submission
//! - **Policies**: permission and grouping rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Session;
use crate::storage::{Account, AccountStatus, PolicyRule};

// =============================================================================
// Session Models
// =============================================================================

/// Password login. `username` is an email or a phone number.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RequestOtpRequest {
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ValidateOtpRequest {
    pub phone: String,
    pub otp: String,
}

/// Access/refresh token pair.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// Account as exposed over the API. Never carries the password hash.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct AccountProfile {
    pub id: u64,
    pub creator_id: u64,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub names: String,
    pub status: AccountStatus,
    pub primary_group: String,
    pub group_id: Option<i64>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountProfile {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            creator_id: account.creator_id,
            phone: account.phone,
            email: account.email,
            names: account.names,
            status: account.status,
            primary_group: account.primary_group,
            group_id: account.group_id,
            last_login: account.last_login,
            created_at: account.created_at,
        }
    }
}

/// Body returned by login, OTP validation and refresh.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionResponse {
    pub token: TokenResponse,
    pub user: AccountProfile,
    #[serde(rename = "hasCredential")]
    pub has_credential: bool,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            token: TokenResponse {
                access_token: session.tokens.access_token,
                refresh_token: session.tokens.refresh_token,
            },
            user: session.account.into(),
            has_credential: session.has_credential,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// =============================================================================
// Password Reset Models
// =============================================================================

/// Complete a password reset. `username` is the account phone.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub username: String,
    pub otp: String,
    pub new_password: String,
}

// =============================================================================
// Policy Models
// =============================================================================

/// One rule in a policy batch.
///
/// `policy` is `p` (permission: `subject` may `action` on `object`) or `g`
/// (grouping: `subject` is a member of role `object`).
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PolicyRequest {
    #[serde(default)]
    pub policy: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub action: String,
}

impl PolicyRequest {
    /// Convert into a stored rule, naming the first missing field.
    pub fn into_rule(self) -> Result<PolicyRule, String> {
        let require = |value: &str, field: &str| {
            if value.trim().is_empty() {
                Err(format!("missing field: {field}"))
            } else if value.contains(PolicyRule::KEY_SEPARATOR) {
                Err(format!(
                    "invalid character '{}' in {field}",
                    PolicyRule::KEY_SEPARATOR
                ))
            } else {
                Ok(())
            }
        };

        require(&self.subject, "subject")?;
        require(&self.object, "object")?;
        match self.policy.trim() {
            "p" => {
                require(&self.action, "action")?;
                Ok(PolicyRule::permission(
                    self.subject.trim(),
                    self.object.trim(),
                    self.action.trim(),
                ))
            }
            "g" => Ok(PolicyRule::grouping(self.subject.trim(), self.object.trim())),
            "" => Err("missing field: policy".to_string()),
            other => Err(format!("unknown policy type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddPoliciesResponse {
    pub message: String,
    pub success: bool,
}
