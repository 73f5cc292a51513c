// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pesa Gate - Session and Access-Control Service
//!
//! Authentication core for the loans and savings back office: password and
//! OTP login, token pairs with server-side revocation, OTP lockout, password
//! reset and policy enforcement on routes.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Tokens, sessions, OTP flows and the policy gate
//! - `notify` - Outbound SMS
//! - `storage` - Credential store (redb) and session cache (LRU or Redis)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod state;
pub mod storage;

#[cfg(test)]
mod test_support;
