// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Policy administration.

use axum::{extract::State, Json};
use tracing::info;

use crate::auth::{Auth, AuthError};
use crate::error::ApiJson;
use crate::models::{AddPoliciesResponse, MessageResponse, PolicyRequest};
use crate::state::AppState;

/// Add a batch of permission (`p`) and grouping (`g`) rules.
///
/// The batch is all-or-nothing: when any rule already exists nothing is
/// added and `success` is `false`.
#[utoipa::path(
    post,
    path = "/api/v1/policies",
    tag = "Policies",
    security(("bearer" = [])),
    request_body = Vec<PolicyRequest>,
    responses(
        (status = 200, description = "Batch processed", body = AddPoliciesResponse),
        (status = 400, description = "Missing field", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not allowed to write policies"),
    )
)]
pub async fn add_policies(
    State(state): State<AppState>,
    Auth(caller): Auth,
    ApiJson(batch): ApiJson<Vec<PolicyRequest>>,
) -> Result<Json<AddPoliciesResponse>, AuthError> {
    if batch.is_empty() {
        return Err(AuthError::BadRequest("no policies provided".to_string()));
    }
    let rules = batch
        .into_iter()
        .map(PolicyRequest::into_rule)
        .collect::<Result<Vec<_>, _>>()
        .map_err(AuthError::BadRequest)?;
    let count = rules.len();

    let success = state
        .policy
        .add_policies(rules)
        .await
        .map_err(|e| AuthError::AuthzError(e.to_string()))?;

    info!(account_id = caller.user_id, count, success, "policy batch submitted");
    let message = if success {
        "policies added"
    } else {
        "policies already exist"
    };
    Ok(Json(AddPoliciesResponse {
        message: message.to_string(),
        success,
    }))
}
