// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session manager: login, OTP, refresh, logout and password reset.
//!
//! ## Session State
//!
//! The session cache is the only record of live sessions:
//!
//! - `<token_uuid>` → account id, TTL = access token lifetime
//! - `<token_uuid>++<account_id>` → account id, TTL = refresh token lifetime
//! - `otp:<id>` / `logintrials:<id>`: login OTP and its trial counter
//! - `otp:resetpass:<id>` / `trials:resetpass:<id>`: password-reset OTP
//!
//! A token whose id is missing from the cache is revoked, whatever its
//! signature says.
//!
//! ## Lockout
//!
//! Every OTP verification increments the trial counter first. Past the login
//! limit the account is set `BLOCKED`; past the reset limit the stored reset
//! code is discarded.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::claims::{AccessDetails, TokenDetails, TokenKind};
use super::otp::{generate_otp, OtpFlow};
use super::password::{hash_password, verify_password};
use super::phone::normalize_phone;
use super::token::TokenService;
use super::AuthError;
use crate::notify::{Notifier, SmsMessage};
use crate::storage::{Account, AccountStatus, CredentialStore, SessionCache};

/// Tunables for the session flows.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Lifetime of an OTP code and its trial counter.
    pub otp_ttl: Duration,
    /// Canonical phones reported with `hasCredential: true`.
    pub credentialed_phones: HashSet<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            otp_ttl: Duration::from_secs(600),
            credentialed_phones: HashSet::new(),
        }
    }
}

/// Result of a successful login, OTP verification or refresh.
#[derive(Debug, Clone)]
pub struct Session {
    pub tokens: TokenDetails,
    pub account: Account,
    pub has_credential: bool,
}

/// Reject accounts that may not hold a session.
pub fn ensure_active(status: AccountStatus) -> Result<(), AuthError> {
    match status {
        AccountStatus::Active => Ok(()),
        AccountStatus::Blocked => Err(AuthError::AccountBlocked),
        AccountStatus::ResetPassword => Err(AuthError::MustResetPassword),
        AccountStatus::Inactive
        | AccountStatus::Invited
        | AccountStatus::Created
        | AccountStatus::Deleted => Err(AuthError::AccountInactive),
    }
}

pub struct SessionManager {
    accounts: Arc<dyn CredentialStore>,
    cache: Arc<dyn SessionCache>,
    tokens: TokenService,
    notifier: Arc<dyn Notifier>,
    settings: SessionSettings,
}

impl SessionManager {
    pub fn new(
        accounts: Arc<dyn CredentialStore>,
        cache: Arc<dyn SessionCache>,
        tokens: TokenService,
        notifier: Arc<dyn Notifier>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            accounts,
            cache,
            tokens,
            notifier,
            settings,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    async fn account_by_phone(&self, phone: &str) -> Result<Account, AuthError> {
        self.accounts
            .find_by_phone(&normalize_phone(phone))
            .await?
            .ok_or(AuthError::NotFound)
    }

    // =========================================================================
    // Password login
    // =========================================================================

    /// Log in with email or phone plus password.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let username = username.trim();
        let account = if username.contains('@') {
            self.accounts.find_by_email(username).await?
        } else {
            self.accounts.find_by_phone(&normalize_phone(username)).await?
        }
        .ok_or(AuthError::NotFound)?;

        if !account.has_password() || account.status == AccountStatus::ResetPassword {
            return Err(AuthError::MustResetPassword);
        }
        ensure_active(account.status)?;

        if !verify_password(password.to_string(), account.password_hash.clone()).await? {
            warn!(account_id = account.id, "login rejected: wrong password");
            return Err(AuthError::WrongPassword);
        }

        self.establish_session(account).await
    }

    // =========================================================================
    // OTP login
    // =========================================================================

    /// Send a login OTP to a registered phone.
    pub async fn request_otp(&self, phone: &str) -> Result<(), AuthError> {
        self.send_otp(OtpFlow::Login, phone).await
    }

    /// Verify a login OTP and open a session.
    pub async fn validate_otp(&self, phone: &str, otp: &str) -> Result<Session, AuthError> {
        let flow = OtpFlow::Login;
        let account = self.account_by_phone(phone).await?;
        let trials_key = flow.trials_key(account.id);
        let code_key = flow.code_key(account.id);

        let trials = self.cache.incr(&trials_key).await?;
        if trials > flow.max_trials() {
            self.accounts
                .update_status(account.id, AccountStatus::Blocked)
                .await?;
            self.cache.del(&[trials_key.as_str()]).await?;
            warn!(account_id = account.id, trials, "account blocked after too many OTP attempts");
            return Err(AuthError::TooManyAttempts { blocked: true });
        }

        let stored = self.cache.get(&code_key).await?.ok_or(AuthError::OtpExpired)?;
        if stored != otp.trim() {
            warn!(account_id = account.id, trials, "login OTP mismatch");
            return Err(AuthError::OtpMismatch);
        }

        // Only the caller that removes the code may open a session with it.
        if self.cache.take(&code_key).await?.as_deref() != Some(otp.trim()) {
            return Err(AuthError::OtpExpired);
        }
        self.cache.del(&[trials_key.as_str()]).await?;

        self.establish_session(account).await
    }

    // =========================================================================
    // Refresh / logout / authenticate
    // =========================================================================

    /// Rotate a session using the refresh token in `headers`.
    ///
    /// The refresh id is removed before the new pair is issued, so each
    /// refresh token works once even under concurrent use.
    pub async fn refresh(&self, headers: &HeaderMap) -> Result<Session, AuthError> {
        let details = self
            .tokens
            .extract_token_metadata(headers, TokenKind::Refresh)?;

        let account_id = self
            .cache
            .take(&details.token_uuid)
            .await?
            .and_then(|id| id.parse::<u64>().ok())
            .ok_or(AuthError::PleaseLogin)?;

        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::PleaseLogin)?;

        self.establish_session(account).await
    }

    /// Revoke the session of the access token in `headers`.
    ///
    /// Never fails: a missing or invalid token and cache errors are logged.
    pub async fn logout(&self, headers: &HeaderMap) {
        let details = match self.tokens.extract_token_metadata(headers, TokenKind::Access) {
            Ok(details) => details,
            Err(e) => {
                debug!(error = %e, "logout without a usable access token");
                return;
            }
        };

        let refresh_uuid = details.refresh_uuid();
        match self
            .cache
            .del(&[details.token_uuid.as_str(), refresh_uuid.as_str()])
            .await
        {
            Ok(removed) => info!(account_id = details.user_id, removed, "session revoked"),
            Err(e) => warn!(account_id = details.user_id, error = %e, "failed to revoke session"),
        }
    }

    /// Verify an access token and check that its session is still live.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AccessDetails, AuthError> {
        let details = self
            .tokens
            .extract_token_metadata(headers, TokenKind::Access)?;
        match self.cache.get(&details.token_uuid).await? {
            Some(_) => Ok(details),
            None => Err(AuthError::Unauthorized),
        }
    }

    // =========================================================================
    // Password reset
    // =========================================================================

    /// Send a password-reset OTP to a registered phone.
    pub async fn request_password_reset_otp(&self, phone: &str) -> Result<(), AuthError> {
        self.send_otp(OtpFlow::PasswordReset, phone).await
    }

    /// Set a new password after checking the reset OTP.
    pub async fn reset_password(
        &self,
        username: &str,
        otp: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::BadRequest("missing new password".to_string()));
        }

        let flow = OtpFlow::PasswordReset;
        let account = self.account_by_phone(username).await?;
        let code_key = flow.code_key(account.id);
        let trials_key = flow.trials_key(account.id);

        let stored = self.cache.get(&code_key).await?;
        if stored.as_deref() != Some(otp.trim()) {
            let trials = self.cache.incr(&trials_key).await?;
            if trials > flow.max_trials() {
                self.cache.del(&[code_key.as_str()]).await?;
                warn!(account_id = account.id, trials, "password reset locked out");
                return Err(AuthError::TooManyAttempts { blocked: false });
            }
            return Err(match stored {
                None => AuthError::OtpExpired,
                Some(_) => AuthError::OtpMismatch,
            });
        }

        let hash = hash_password(new_password.to_string()).await?;
        self.accounts.update_password(account.id, hash).await?;
        if account.status == AccountStatus::ResetPassword {
            self.accounts
                .update_status(account.id, AccountStatus::Active)
                .await?;
        }

        if let Err(e) = self
            .cache
            .del(&[code_key.as_str(), trials_key.as_str()])
            .await
        {
            warn!(account_id = account.id, error = %e, "failed to clear reset OTP");
        }
        info!(account_id = account.id, "password reset");
        Ok(())
    }

    // =========================================================================
    // Shared steps
    // =========================================================================

    /// Generate, send and store an OTP for `flow`.
    async fn send_otp(&self, flow: OtpFlow, phone: &str) -> Result<(), AuthError> {
        let account = self.account_by_phone(phone).await?;
        let destination = account
            .phone
            .clone()
            .unwrap_or_else(|| normalize_phone(phone));

        let code = generate_otp();
        let ttl = self.settings.otp_ttl;
        self.notifier.send(SmsMessage {
            destination_phones: vec![destination],
            keyword: flow.keyword().to_string(),
            message: flow.message(&code, ttl),
        })?;

        let code_key = flow.code_key(account.id);
        let trials_key = flow.trials_key(account.id);
        if !self.cache.set(&code_key, &code, ttl).await? {
            return Err(AuthError::SessionPersistError(format!("{code_key} not stored")));
        }
        if !self.cache.set(&trials_key, "0", ttl).await? {
            return Err(AuthError::SessionPersistError(format!("{trials_key} not stored")));
        }

        info!(account_id = account.id, keyword = flow.keyword(), "OTP sent");
        Ok(())
    }

    /// Issue tokens, record the login and register both token ids.
    pub async fn establish_session(&self, mut account: Account) -> Result<Session, AuthError> {
        ensure_active(account.status)?;

        let tokens = self.tokens.create_token(account.id, &account.names)?;

        let now = Utc::now();
        self.accounts.update_last_login(account.id, now).await?;
        account.last_login = Some(now);

        self.store_tokens(account.id, &tokens).await?;

        let has_credential = account
            .phone
            .as_ref()
            .is_some_and(|phone| self.settings.credentialed_phones.contains(phone));

        info!(account_id = account.id, "session established");
        Ok(Session {
            tokens,
            account,
            has_credential,
        })
    }

    /// Register both token ids with TTLs matching the token lifetimes.
    pub async fn store_tokens(
        &self,
        account_id: u64,
        tokens: &TokenDetails,
    ) -> Result<(), AuthError> {
        let now = Utc::now().timestamp();
        let ttl_until = |expires: i64| Duration::from_secs((expires - now).max(0) as u64);
        let value = account_id.to_string();

        let access_set = self
            .cache
            .set(&tokens.token_uuid, &value, ttl_until(tokens.at_expires))
            .await
            .map_err(|e| AuthError::SessionPersistError(e.to_string()))?;
        let refresh_set = self
            .cache
            .set(&tokens.refresh_uuid, &value, ttl_until(tokens.rt_expires))
            .await
            .map_err(|e| AuthError::SessionPersistError(e.to_string()))?;

        if !access_set || !refresh_set {
            return Err(AuthError::SessionPersistError("no record inserted".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CacheResult, MemoryCache};
    use crate::test_support::{bearer, TestContext};
    use async_trait::async_trait;

    const PHONE: &str = "254712345678";
    const PASSWORD: &str = "correct horse";

    async fn active(ctx: &TestContext) -> Account {
        ctx.seed_account(PHONE, Some("a@b.com"), PASSWORD, AccountStatus::Active)
            .await
    }

    async fn sent_code(ctx: &TestContext, flow: OtpFlow, id: u64) -> String {
        ctx.cache.get(&flow.code_key(id)).await.unwrap().unwrap()
    }

    // -------------------------------------------------------------------------
    // login
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn login_by_email_stores_both_token_ids() {
        let ctx = TestContext::new().await;
        let account = active(&ctx).await;

        let session = ctx.sessions.login("a@b.com", PASSWORD).await.unwrap();
        let td = &session.tokens;

        assert_eq!(td.refresh_uuid, format!("{}++{}", td.token_uuid, account.id));
        let id = account.id.to_string();
        assert_eq!(ctx.cache.get(&td.token_uuid).await.unwrap(), Some(id.clone()));
        assert_eq!(ctx.cache.get(&td.refresh_uuid).await.unwrap(), Some(id));

        let at_ttl = ctx.cache.ttl(&td.token_uuid).await.unwrap().unwrap();
        assert!(at_ttl > Duration::ZERO && at_ttl <= ctx.sessions.tokens().access_ttl());
        let rt_ttl = ctx.cache.ttl(&td.refresh_uuid).await.unwrap().unwrap();
        assert!(rt_ttl > Duration::ZERO && rt_ttl <= ctx.sessions.tokens().refresh_ttl());

        assert!(session.account.last_login.is_some());
        let stored = ctx.accounts.find_by_id(account.id).await.unwrap().unwrap();
        assert!(stored.last_login.is_some());
    }

    #[tokio::test]
    async fn login_by_local_phone_form() {
        let ctx = TestContext::new().await;
        active(&ctx).await;
        assert!(ctx.sessions.login("0712345678", PASSWORD).await.is_ok());
    }

    #[tokio::test]
    async fn login_failures() {
        let ctx = TestContext::new().await;
        active(&ctx).await;

        assert!(matches!(
            ctx.sessions.login("x@y.com", PASSWORD).await,
            Err(AuthError::NotFound)
        ));
        assert!(matches!(
            ctx.sessions.login("a@b.com", "nope").await,
            Err(AuthError::WrongPassword)
        ));
        assert_eq!(ctx.cache.len(), 0);
    }

    #[tokio::test]
    async fn blocked_and_inactive_accounts_get_no_tokens() {
        let ctx = TestContext::new().await;
        ctx.seed_account("254700000001", None, PASSWORD, AccountStatus::Blocked)
            .await;
        ctx.seed_account("254700000002", None, PASSWORD, AccountStatus::Inactive)
            .await;
        ctx.seed_account("254700000003", None, PASSWORD, AccountStatus::Invited)
            .await;

        assert!(matches!(
            ctx.sessions.login("254700000001", PASSWORD).await,
            Err(AuthError::AccountBlocked)
        ));
        assert!(matches!(
            ctx.sessions.login("254700000002", PASSWORD).await,
            Err(AuthError::AccountInactive)
        ));
        assert!(matches!(
            ctx.sessions.login("254700000003", PASSWORD).await,
            Err(AuthError::AccountInactive)
        ));
        assert_eq!(ctx.cache.len(), 0);
    }

    #[tokio::test]
    async fn missing_password_or_reset_status_redirects_to_reset() {
        let ctx = TestContext::new().await;
        ctx.seed_account("254700000001", None, "", AccountStatus::Active)
            .await;
        ctx.seed_account("254700000002", None, PASSWORD, AccountStatus::ResetPassword)
            .await;

        assert!(matches!(
            ctx.sessions.login("254700000001", PASSWORD).await,
            Err(AuthError::MustResetPassword)
        ));
        assert!(matches!(
            ctx.sessions.login("254700000002", PASSWORD).await,
            Err(AuthError::MustResetPassword)
        ));
    }

    #[tokio::test]
    async fn credentialed_phone_is_reported() {
        let ctx = TestContext::with_credentialed(&[PHONE]).await;
        active(&ctx).await;
        ctx.seed_account("254700000009", None, PASSWORD, AccountStatus::Active)
            .await;

        assert!(ctx.sessions.login(PHONE, PASSWORD).await.unwrap().has_credential);
        assert!(!ctx
            .sessions
            .login("254700000009", PASSWORD)
            .await
            .unwrap()
            .has_credential);
    }

    // -------------------------------------------------------------------------
    // OTP
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn request_otp_for_unknown_phone_writes_nothing() {
        let ctx = TestContext::new().await;
        let err = ctx.sessions.request_otp("0712345678").await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
        assert_eq!(err.to_string(), "account not found");
        assert_eq!(ctx.cache.len(), 0);
        assert!(ctx.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn request_otp_sends_and_stores_code() {
        let ctx = TestContext::new().await;
        let account = active(&ctx).await;

        ctx.sessions.request_otp("0712345678").await.unwrap();

        let code = sent_code(&ctx, OtpFlow::Login, account.id).await;
        assert_eq!(code.len(), 6);
        let trials = ctx.cache.get("logintrials:1").await.unwrap();
        assert_eq!(trials.as_deref(), Some("0"));

        let sent = ctx.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination_phones, vec![PHONE.to_string()]);
        assert!(sent[0].message.contains(&code));
    }

    #[tokio::test]
    async fn correct_otp_after_wrong_attempts_succeeds_and_clears_state() {
        let ctx = TestContext::new().await;
        let account = active(&ctx).await;
        ctx.sessions.request_otp(PHONE).await.unwrap();
        let code = sent_code(&ctx, OtpFlow::Login, account.id).await;

        for _ in 0..3 {
            assert!(matches!(
                ctx.sessions.validate_otp(PHONE, "000000").await,
                Err(AuthError::OtpMismatch)
            ));
        }
        let session = ctx.sessions.validate_otp(PHONE, &code).await.unwrap();
        assert_eq!(session.account.id, account.id);

        assert!(ctx.cache.get("logintrials:1").await.unwrap().is_none());
        assert!(ctx.cache.get("otp:1").await.unwrap().is_none());
        // One code, one session.
        assert!(matches!(
            ctx.sessions.validate_otp(PHONE, &code).await,
            Err(AuthError::OtpExpired)
        ));
    }

    #[tokio::test]
    async fn fifth_wrong_otp_blocks_account() {
        let ctx = TestContext::new().await;
        let account = active(&ctx).await;
        ctx.sessions.request_otp(PHONE).await.unwrap();
        let code = sent_code(&ctx, OtpFlow::Login, account.id).await;
        let wrong = if code == "111111" { "222222" } else { "111111" };

        for _ in 0..4 {
            assert!(matches!(
                ctx.sessions.validate_otp(PHONE, wrong).await,
                Err(AuthError::OtpMismatch)
            ));
        }
        let stored = ctx.accounts.find_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AccountStatus::Active);

        assert!(matches!(
            ctx.sessions.validate_otp(PHONE, wrong).await,
            Err(AuthError::TooManyAttempts { blocked: true })
        ));
        let stored = ctx.accounts.find_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AccountStatus::Blocked);
        assert!(ctx.cache.get("logintrials:1").await.unwrap().is_none());

        // Even the right code cannot open a session now.
        assert!(matches!(
            ctx.sessions.validate_otp(PHONE, &code).await,
            Err(AuthError::AccountBlocked)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_wrong_otps_block_exactly_at_fifth() {
        let ctx = TestContext::new().await;
        let account = active(&ctx).await;
        ctx.sessions.request_otp(PHONE).await.unwrap();
        let code = sent_code(&ctx, OtpFlow::Login, account.id).await;
        let wrong = if code == "111111" { "222222" } else { "111111" };

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let sessions = ctx.sessions.clone();
            tasks.spawn(async move { sessions.validate_otp(PHONE, wrong).await });
        }
        while let Some(result) = tasks.join_next().await {
            assert!(matches!(result.unwrap(), Err(AuthError::OtpMismatch)));
        }
        assert_eq!(ctx.cache.get("logintrials:1").await.unwrap().as_deref(), Some("4"));
        let stored = ctx.accounts.find_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AccountStatus::Active);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_burst_blocks_once() {
        let ctx = TestContext::new().await;
        let account = active(&ctx).await;
        ctx.sessions.request_otp(PHONE).await.unwrap();
        let code = sent_code(&ctx, OtpFlow::Login, account.id).await;
        let wrong = if code == "111111" { "222222" } else { "111111" };

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..5 {
            let sessions = ctx.sessions.clone();
            tasks.spawn(async move { sessions.validate_otp(PHONE, wrong).await });
        }
        let (mut mismatches, mut blocks) = (0, 0);
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Err(AuthError::OtpMismatch) => mismatches += 1,
                Err(AuthError::TooManyAttempts { blocked: true }) => blocks += 1,
                other => panic!("unexpected result: {other:?}"),
            }
        }
        assert_eq!((mismatches, blocks), (4, 1));
        let stored = ctx.accounts.find_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AccountStatus::Blocked);
        assert!(ctx.cache.get("logintrials:1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_correct_otps_open_one_session() {
        let ctx = TestContext::new().await;
        let account = active(&ctx).await;
        ctx.sessions.request_otp(PHONE).await.unwrap();
        let code = sent_code(&ctx, OtpFlow::Login, account.id).await;

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let sessions = ctx.sessions.clone();
            let code = code.clone();
            tasks.spawn(async move { sessions.validate_otp(PHONE, &code).await });
        }
        let mut opened = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => opened += 1,
                Err(AuthError::OtpExpired) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(opened, 1);
    }

    #[tokio::test]
    async fn otp_without_request_is_expired() {
        let ctx = TestContext::new().await;
        active(&ctx).await;
        assert!(matches!(
            ctx.sessions.validate_otp(PHONE, "123456").await,
            Err(AuthError::OtpExpired)
        ));
    }

    // -------------------------------------------------------------------------
    // refresh / logout / authenticate
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn refresh_rotates_and_consumes_refresh_id() {
        let ctx = TestContext::new().await;
        active(&ctx).await;
        let first = ctx.sessions.login("a@b.com", PASSWORD).await.unwrap();

        let second = ctx
            .sessions
            .refresh(&bearer(&first.tokens.refresh_token))
            .await
            .unwrap();
        assert_ne!(second.tokens.token_uuid, first.tokens.token_uuid);
        assert!(ctx.cache.get(&first.tokens.refresh_uuid).await.unwrap().is_none());
        assert!(ctx.cache.get(&second.tokens.refresh_uuid).await.unwrap().is_some());

        assert!(matches!(
            ctx.sessions.refresh(&bearer(&first.tokens.refresh_token)).await,
            Err(AuthError::PleaseLogin)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_refresh_with_one_token_rotates_once() {
        let ctx = TestContext::new().await;
        active(&ctx).await;
        let session = ctx.sessions.login("a@b.com", PASSWORD).await.unwrap();
        let headers = bearer(&session.tokens.refresh_token);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let sessions = ctx.sessions.clone();
            let headers = headers.clone();
            tasks.spawn(async move { sessions.refresh(&headers).await });
        }
        let mut rotated = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => rotated += 1,
                Err(AuthError::PleaseLogin) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(rotated, 1);
    }

    #[tokio::test]
    async fn refresh_rejects_access_token() {
        let ctx = TestContext::new().await;
        active(&ctx).await;
        let session = ctx.sessions.login("a@b.com", PASSWORD).await.unwrap();
        let err = ctx
            .sessions
            .refresh(&bearer(&session.tokens.access_token))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_then_refresh_requires_login() {
        let ctx = TestContext::new().await;
        active(&ctx).await;
        let session = ctx.sessions.login("a@b.com", PASSWORD).await.unwrap();

        ctx.sessions.logout(&bearer(&session.tokens.access_token)).await;
        assert!(ctx.cache.get(&session.tokens.token_uuid).await.unwrap().is_none());

        assert!(matches!(
            ctx.sessions.refresh(&bearer(&session.tokens.refresh_token)).await,
            Err(AuthError::PleaseLogin)
        ));
        assert!(matches!(
            ctx.sessions
                .authenticate(&bearer(&session.tokens.access_token))
                .await,
            Err(AuthError::Unauthorized)
        ));

        // Idempotent, and harmless without a token.
        ctx.sessions.logout(&bearer(&session.tokens.access_token)).await;
        ctx.sessions.logout(&HeaderMap::new()).await;
    }

    #[tokio::test]
    async fn refresh_rechecks_status() {
        let ctx = TestContext::new().await;
        let account = active(&ctx).await;
        let session = ctx.sessions.login("a@b.com", PASSWORD).await.unwrap();

        ctx.accounts
            .update_status(account.id, AccountStatus::Blocked)
            .await
            .unwrap();
        assert!(matches!(
            ctx.sessions.refresh(&bearer(&session.tokens.refresh_token)).await,
            Err(AuthError::AccountBlocked)
        ));
    }

    #[tokio::test]
    async fn authenticate_returns_identity_for_live_session() {
        let ctx = TestContext::new().await;
        let account = active(&ctx).await;
        let session = ctx.sessions.login("a@b.com", PASSWORD).await.unwrap();

        let details = ctx
            .sessions
            .authenticate(&bearer(&session.tokens.access_token))
            .await
            .unwrap();
        assert_eq!(details.user_id, account.id);
        assert_eq!(details.token_uuid, session.tokens.token_uuid);
    }

    // -------------------------------------------------------------------------
    // password reset
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn reset_password_updates_hash_and_reactivates() {
        let ctx = TestContext::new().await;
        let account = ctx
            .seed_account(PHONE, None, PASSWORD, AccountStatus::ResetPassword)
            .await;
        ctx.sessions.request_password_reset_otp("0712345678").await.unwrap();
        let code = sent_code(&ctx, OtpFlow::PasswordReset, account.id).await;

        ctx.sessions
            .reset_password(PHONE, &code, "brand new")
            .await
            .unwrap();

        let stored = ctx.accounts.find_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AccountStatus::Active);
        assert!(ctx.sessions.login(PHONE, "brand new").await.is_ok());
        assert!(ctx.cache.get("otp:resetpass:1").await.unwrap().is_none());
        assert!(ctx.cache.get("trials:resetpass:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_password_locks_out_after_three_misses() {
        let ctx = TestContext::new().await;
        let account = active(&ctx).await;
        ctx.sessions.request_password_reset_otp(PHONE).await.unwrap();
        let code = sent_code(&ctx, OtpFlow::PasswordReset, account.id).await;
        let wrong = if code == "111111" { "222222" } else { "111111" };

        for _ in 0..3 {
            assert!(matches!(
                ctx.sessions.reset_password(PHONE, wrong, "x").await,
                Err(AuthError::OtpMismatch)
            ));
        }
        assert!(matches!(
            ctx.sessions.reset_password(PHONE, wrong, "x").await,
            Err(AuthError::TooManyAttempts { blocked: false })
        ));
        // The code is gone; the right one no longer works either.
        assert!(matches!(
            ctx.sessions.reset_password(PHONE, &code, "x").await,
            Err(AuthError::TooManyAttempts { .. })
        ));
        // The login OTP namespace is untouched and the account still active.
        assert!(ctx.cache.get("logintrials:1").await.unwrap().is_none());
        let stored = ctx.accounts.find_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AccountStatus::Active);
    }

    #[tokio::test]
    async fn reset_password_without_request_is_expired() {
        let ctx = TestContext::new().await;
        active(&ctx).await;
        assert!(matches!(
            ctx.sessions.reset_password(PHONE, "123456", "x").await,
            Err(AuthError::OtpExpired)
        ));
    }

    // -------------------------------------------------------------------------
    // cache write failures
    // -------------------------------------------------------------------------

    /// Cache whose writes are never applied.
    struct RejectingCache(MemoryCache);

    #[async_trait]
    impl SessionCache for RejectingCache {
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<bool> {
            Ok(false)
        }
        async fn get(&self, key: &str) -> CacheResult<Option<String>> {
            self.0.get(key).await
        }
        async fn take(&self, key: &str) -> CacheResult<Option<String>> {
            self.0.take(key).await
        }
        async fn incr(&self, key: &str) -> CacheResult<i64> {
            self.0.incr(key).await
        }
        async fn del(&self, keys: &[&str]) -> CacheResult<u64> {
            self.0.del(keys).await
        }
        async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
            self.0.ttl(key).await
        }
        async fn ping(&self) -> CacheResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unapplied_token_write_is_session_persist_error() {
        let ctx = TestContext::new().await;
        active(&ctx).await;
        let sessions = ctx.sessions_with_cache(Arc::new(RejectingCache(MemoryCache::new(8))));

        assert!(matches!(
            sessions.login("a@b.com", PASSWORD).await,
            Err(AuthError::SessionPersistError(_))
        ));
        assert!(matches!(
            sessions.request_otp(PHONE).await,
            Err(AuthError::SessionPersistError(_))
        ));
    }

    #[test]
    fn status_gate() {
        assert!(ensure_active(AccountStatus::Active).is_ok());
        assert!(matches!(ensure_active(AccountStatus::Blocked), Err(AuthError::AccountBlocked)));
        assert!(matches!(ensure_active(AccountStatus::Deleted), Err(AuthError::AccountInactive)));
        assert!(matches!(
            ensure_active(AccountStatus::ResetPassword),
            Err(AuthError::MustResetPassword)
        ));
    }
}
