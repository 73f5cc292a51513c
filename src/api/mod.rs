// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    body::Body,
    http::Request,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{debug_span, Span};
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{enforce_policy, token_auth, PolicyGate},
    models::{
        AccountProfile, AddPoliciesResponse, LoginRequest, MessageResponse, PolicyRequest,
        RequestOtpRequest, ResetPasswordRequest, SessionResponse, TokenResponse,
        ValidateOtpRequest,
    },
    state::AppState,
    storage::AccountStatus,
};

pub mod auth;
pub mod health;
pub mod policies;
pub mod users;

/// Object and action guarding policy administration.
pub const POLICIES_OBJECT: &str = "policies";
pub const POLICIES_WRITE: &str = "write";

pub fn router(state: AppState) -> Router {
    let session_routes = Router::new()
        .route("/api/login", post(auth::login))
        .route("/api/requestOtp", post(auth::request_otp))
        .route("/api/validateOtp", post(auth::validate_otp))
        .route("/api/refresh", post(auth::refresh))
        .route(
            "/api/request-password-reset-otp",
            post(auth::request_password_reset_otp),
        )
        .route("/api/reset-password", post(auth::reset_password))
        .route("/api/v1/users/logout", post(users::logout));

    let user_routes = Router::new()
        .route("/api/v1/users/me", get(users::get_current_user))
        .route_layer(from_fn_with_state(state.clone(), token_auth));

    let policy_gate = PolicyGate::new(state.clone(), POLICIES_OBJECT, POLICIES_WRITE);
    let policy_routes = Router::new()
        .route("/api/v1/policies", post(policies::add_policies))
        .route_layer(from_fn_with_state(policy_gate, enforce_policy));

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .merge(session_routes)
        .merge(user_routes)
        .merge(policy_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(CorsLayer::permissive()),
        )
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!(
        "http-request",
        method = %request.method(),
        path = request.uri().path(),
        request_id
    )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login,
        auth::request_otp,
        auth::validate_otp,
        auth::refresh,
        auth::request_password_reset_otp,
        auth::reset_password,
        users::get_current_user,
        users::logout,
        policies::add_policies,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            LoginRequest,
            RequestOtpRequest,
            ValidateOtpRequest,
            ResetPasswordRequest,
            PolicyRequest,
            SessionResponse,
            TokenResponse,
            AccountProfile,
            AccountStatus,
            MessageResponse,
            AddPoliciesResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Sessions", description = "Login, OTP verification and token refresh"),
        (name = "Password Reset", description = "OTP-confirmed password reset"),
        (name = "Users", description = "Current account and logout"),
        (name = "Policies", description = "Access-control rule administration"),
        (name = "Health", description = "Liveness and readiness checks")
    )
)]
pub struct ApiDoc;
