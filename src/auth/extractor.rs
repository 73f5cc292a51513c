// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated callers.
//!
//! ```rust,ignore
//! async fn me(Auth(caller): Auth) -> impl IntoResponse {
//!     // caller is AccessDetails
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::{AccessDetails, AuthError};
use crate::state::AppState;

/// Identity of the caller behind a live access token.
///
/// Uses the identity a gate middleware already stored when present;
/// otherwise authenticates the request itself.
pub struct Auth(pub AccessDetails);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(details) = parts.extensions.get::<AccessDetails>().cloned() {
            return Ok(Auth(details));
        }

        let details = state.sessions.authenticate(&parts.headers).await?;
        Ok(Auth(details))
    }
}
