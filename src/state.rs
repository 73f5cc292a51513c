// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{PolicyEngine, SessionManager};
use crate::storage::{CredentialStore, SessionCache};

/// Process-wide collaborators shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn CredentialStore>,
    pub cache: Arc<dyn SessionCache>,
    pub policy: Arc<dyn PolicyEngine>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(
        accounts: Arc<dyn CredentialStore>,
        cache: Arc<dyn SessionCache>,
        policy: Arc<dyn PolicyEngine>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            accounts,
            cache,
            policy,
            sessions,
        }
    }

    /// Replace the policy engine (used to plug in alternative engines).
    pub fn with_policy(mut self, policy: Arc<dyn PolicyEngine>) -> Self {
        self.policy = policy;
        self
    }
}
