// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests: a temporary redb file, an in-process
//! cache and a notifier that records instead of sending.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue};
use tempfile::TempDir;

use crate::auth::password::hash_password_blocking;
use crate::auth::{RuleEngine, SessionManager, SessionSettings, TokenOptions, TokenService};
use crate::notify::{Notifier, NotifyError, SmsMessage};
use crate::state::AppState;
use crate::storage::{
    Account, AccountRepository, AccountStatus, CredentialStore, Database, MemoryCache,
    NewAccount, PolicyRuleRepository, SessionCache,
};

/// Notifier that keeps every message.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SmsMessage>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SmsMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, sms: SmsMessage) -> Result<(), NotifyError> {
        sms.validate()?;
        self.sent.lock().unwrap().push(sms);
        Ok(())
    }
}

pub fn token_service() -> TokenService {
    TokenService::new(TokenOptions {
        access_secret: "test-access-secret".to_string(),
        refresh_secret: "test-refresh-secret".to_string(),
        access_ttl: Duration::from_secs(1800),
        refresh_ttl: Duration::from_secs(604_800),
    })
}

pub fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    headers
}

pub struct TestContext {
    _dir: TempDir,
    pub accounts: Arc<AccountRepository>,
    pub cache: Arc<MemoryCache>,
    pub notifier: Arc<RecordingNotifier>,
    pub policy: Arc<RuleEngine>,
    pub sessions: Arc<SessionManager>,
    settings: SessionSettings,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_credentialed(&[]).await
    }

    pub async fn with_credentialed(phones: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("test.redb")).unwrap();
        let accounts = Arc::new(AccountRepository::new(db.clone()));
        let cache = Arc::new(MemoryCache::new(1024));
        let notifier = Arc::new(RecordingNotifier::default());
        let policy = Arc::new(RuleEngine::load(PolicyRuleRepository::new(db)).await.unwrap());
        let settings = SessionSettings {
            otp_ttl: Duration::from_secs(600),
            credentialed_phones: phones.iter().map(|p| p.to_string()).collect::<HashSet<_>>(),
        };
        let sessions = Arc::new(SessionManager::new(
            accounts.clone(),
            cache.clone(),
            token_service(),
            notifier.clone(),
            settings.clone(),
        ));
        Self {
            _dir: dir,
            accounts,
            cache,
            notifier,
            policy,
            sessions,
            settings,
        }
    }

    /// Session manager over the same accounts but a different cache.
    pub fn sessions_with_cache(&self, cache: Arc<dyn SessionCache>) -> SessionManager {
        SessionManager::new(
            self.accounts.clone(),
            cache,
            token_service(),
            self.notifier.clone(),
            self.settings.clone(),
        )
    }

    pub fn state(&self) -> AppState {
        AppState::new(
            self.accounts.clone(),
            self.cache.clone(),
            self.policy.clone(),
            self.sessions.clone(),
        )
    }

    /// Create an account; an empty `password` leaves the hash empty.
    pub async fn seed_account(
        &self,
        phone: &str,
        email: Option<&str>,
        password: &str,
        status: AccountStatus,
    ) -> Account {
        let password_hash = if password.is_empty() {
            String::new()
        } else {
            hash_password_blocking(password).unwrap()
        };
        self.accounts
            .create(NewAccount {
                phone: Some(phone.to_string()),
                email: email.map(str::to_string),
                names: "Test User".to_string(),
                password_hash,
                status,
                primary_group: "ADMIN".to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
    }
}
