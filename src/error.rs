// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request body decoding with API-shaped rejections.

use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::auth::AuthError;

/// Message returned for any body that fails to decode.
pub const BAD_REQUEST_MESSAGE: &str = "bad request provided";

/// JSON body extractor that rejects with a `400 {message}` body instead of
/// Axum's plain-text rejection.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                debug!(error = %rejection.body_text(), "rejected request body");
                Err(AuthError::BadRequest(BAD_REQUEST_MESSAGE.to_string()))
            }
        }
    }
}
