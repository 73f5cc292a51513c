// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Sessions, tokens and request authorization for the back-office API.
//!
//! ## Auth Flow
//!
//! 1. The front end logs in (password or phone OTP) and receives an
//!    access/refresh token pair
//! 2. It sends `Authorization: Bearer <access token>` on every request
//! 3. The server:
//!    - verifies the HS256 signature, expiry and `typ` claim
//!    - checks the token id is still in the session cache
//!    - asks the policy engine whether the account may perform the route's
//!      action on the route's object
//! 4. When the access token expires the front end calls `/api/refresh` with
//!    the refresh token and gets a new pair
//!
//! ## Security
//!
//! - Access and refresh tokens use distinct secrets and an explicit `typ`
//! - Logout deletes both token ids; a revoked token fails even with a valid
//!   signature
//! - OTP verification is trial-limited; the login flow blocks the account
//! - Clock skew tolerance is 5 seconds

pub mod claims;
pub mod error;
pub mod extractor;
pub mod middleware;
pub mod otp;
pub mod password;
pub mod phone;
pub mod policy;
pub mod session;
pub mod token;

pub use claims::{AccessDetails, SessionClaims, TokenDetails, TokenKind};
pub use error::AuthError;
pub use extractor::Auth;
pub use middleware::{enforce_policy, token_auth, PolicyGate};
pub use policy::{PolicyEngine, PolicyError, RuleEngine};
pub use session::{Session, SessionManager, SessionSettings};
pub use token::{TokenOptions, TokenService};
