// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request gates for Axum.
//!
//! - [`token_auth`]: a live access token is required
//! - [`enforce_policy`]: a live access token plus a policy grant for the
//!   route's object/action
//!
//! Both put the caller's [`AccessDetails`] into the request extensions for
//! the [`super::Auth`] extractor.
//!
//! ```rust,ignore
//! let gate = PolicyGate::new(state.clone(), "policies", "write");
//! Router::new()
//!     .route("/api/v1/policies", post(add_policies))
//!     .route_layer(axum::middleware::from_fn_with_state(gate, enforce_policy));
//! ```

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::{AccessDetails, AuthError};
use crate::state::AppState;

/// Object/action a route group is authorized against.
#[derive(Clone)]
pub struct PolicyGate {
    pub state: AppState,
    pub object: &'static str,
    pub action: &'static str,
}

impl PolicyGate {
    pub fn new(state: AppState, object: &'static str, action: &'static str) -> Self {
        Self {
            state,
            object,
            action,
        }
    }
}

/// Require a live access token.
pub async fn token_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match state.sessions.authenticate(request.headers()).await {
        Ok(details) => {
            request.extensions_mut().insert(details);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Require a live access token whose account is granted the gate's
/// object/action.
pub async fn enforce_policy(
    State(gate): State<PolicyGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let details: AccessDetails = match gate.state.sessions.authenticate(request.headers()).await {
        Ok(details) => details,
        Err(e) => return e.into_response(),
    };

    let subject = details.user_id.to_string();
    match gate.state.policy.enforce(&subject, gate.object, gate.action).await {
        Ok(true) => {
            request.extensions_mut().insert(details);
            next.run(request).await
        }
        Ok(false) => {
            warn!(
                account_id = details.user_id,
                object = gate.object,
                action = gate.action,
                "request denied by policy"
            );
            AuthError::Forbidden.into_response()
        }
        Err(e) => AuthError::AuthzError(e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    use crate::auth::{Auth, PolicyEngine, PolicyError};
    use crate::storage::{AccountStatus, PolicyRule, StoreError};
    use crate::test_support::TestContext;

    /// Engine that always fails.
    struct BrokenEngine;

    #[async_trait]
    impl PolicyEngine for BrokenEngine {
        async fn enforce(&self, _: &str, _: &str, _: &str) -> Result<bool, PolicyError> {
            Err(PolicyError::Store(StoreError::NotFound("adapter".to_string())))
        }
        async fn add_policies(&self, _: Vec<PolicyRule>) -> Result<bool, PolicyError> {
            Ok(false)
        }
    }

    async fn whoami(Auth(details): Auth) -> String {
        details.user_id.to_string()
    }

    fn gated(state: AppState) -> Router {
        let gate = PolicyGate::new(state.clone(), "loans", "read");
        Router::new()
            .route("/loans", get(whoami))
            .route_layer(middleware::from_fn_with_state(gate, enforce_policy))
            .route(
                "/me",
                get(whoami).route_layer(middleware::from_fn_with_state(state.clone(), token_auth)),
            )
            .with_state(state)
    }

    fn request(uri: &str, token: Option<&str>) -> Request {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn login(ctx: &TestContext) -> String {
        ctx.seed_account("254712345678", None, "pw", AccountStatus::Active)
            .await;
        ctx.sessions
            .login("254712345678", "pw")
            .await
            .unwrap()
            .tokens
            .access_token
    }

    #[tokio::test]
    async fn missing_token_is_401() {
        let ctx = TestContext::new().await;
        let response = gated(ctx.state()).oneshot(request("/loans", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn denied_is_403() {
        let ctx = TestContext::new().await;
        let token = login(&ctx).await;
        let response = gated(ctx.state())
            .oneshot(request("/loans", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn granted_reaches_handler() {
        let ctx = TestContext::new().await;
        let token = login(&ctx).await;
        ctx.policy
            .add_policies(vec![PolicyRule::permission("1", "loans", "read")])
            .await
            .unwrap();
        let response = gated(ctx.state())
            .oneshot(request("/loans", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn engine_error_is_500_not_403() {
        let ctx = TestContext::new().await;
        let token = login(&ctx).await;
        let state = ctx.state().with_policy(Arc::new(BrokenEngine));
        let response = gated(state)
            .oneshot(request("/loans", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn token_auth_rejects_revoked_session() {
        let ctx = TestContext::new().await;
        let token = login(&ctx).await;

        let response = gated(ctx.state()).oneshot(request("/me", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        ctx.sessions.logout(&crate::test_support::bearer(&token)).await;
        let response = gated(ctx.state()).oneshot(request("/me", Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
