// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account repository (the credential store).
//!
//! Accounts are stored as JSON rows in the `accounts` table with unique
//! phone and email indexes. The session layer only reads accounts and writes
//! status, last-login and password hash; account CRUD belongs to the user
//! management service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::database::{
    Database, StoreError, StoreResult, ACCOUNTS, EMAIL_INDEX, PHONE_INDEX, SEQUENCES,
};

const ACCOUNT_SEQUENCE: &str = "accounts";

/// Lifecycle status of an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    #[default]
    Active,
    Inactive,
    Blocked,
    Invited,
    Created,
    Deleted,
    /// Password must be reset before the account can log in again.
    ResetPassword,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Inactive => "INACTIVE",
            AccountStatus::Blocked => "BLOCKED",
            AccountStatus::Invited => "INVITED",
            AccountStatus::Created => "CREATED",
            AccountStatus::Deleted => "DELETED",
            AccountStatus::ResetPassword => "RESET_PASSWORD",
        }
    }
}

/// Unrecognized account status label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown account status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for AccountStatus {
    type Err = UnknownStatus;

    /// Parse a status label (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ACTIVE" => Ok(AccountStatus::Active),
            "INACTIVE" => Ok(AccountStatus::Inactive),
            "BLOCKED" => Ok(AccountStatus::Blocked),
            "INVITED" => Ok(AccountStatus::Invited),
            "CREATED" => Ok(AccountStatus::Created),
            "DELETED" => Ok(AccountStatus::Deleted),
            "RESET_PASSWORD" => Ok(AccountStatus::ResetPassword),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account row as stored in the credential store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: u64,
    #[serde(default)]
    pub creator_id: u64,
    /// Canonical phone (`2547XXXXXXXX`), unique when present.
    pub phone: Option<String>,
    /// Lowercase email, unique when present.
    pub email: Option<String>,
    pub names: String,
    /// Argon2 PHC string. Empty means no password has been set.
    #[serde(default)]
    pub password_hash: String,
    pub status: AccountStatus,
    pub primary_group: String,
    pub group_id: Option<i64>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn has_password(&self) -> bool {
        !self.password_hash.is_empty()
    }
}

/// Fields required to create an account.
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub creator_id: u64,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub names: String,
    pub password_hash: String,
    pub status: AccountStatus,
    pub primary_group: String,
    pub group_id: Option<i64>,
}

/// Read/write access to account credentials and status.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_id(&self, id: u64) -> StoreResult<Option<Account>>;

    async fn find_by_phone(&self, phone: &str) -> StoreResult<Option<Account>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    async fn create(&self, account: NewAccount) -> StoreResult<Account>;

    async fn update_status(&self, id: u64, status: AccountStatus) -> StoreResult<()>;

    async fn update_last_login(&self, id: u64, at: DateTime<Utc>) -> StoreResult<()>;

    async fn update_password(&self, id: u64, password_hash: String) -> StoreResult<()>;

    async fn ping(&self) -> StoreResult<()>;
}

/// redb-backed credential store.
#[derive(Clone)]
pub struct AccountRepository {
    db: Database,
}

impl AccountRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn find_by_index(
        &self,
        index: redb::TableDefinition<'static, &'static str, u64>,
        key: String,
    ) -> StoreResult<Option<Account>> {
        self.db
            .run(move |db| {
                let read_txn = db.begin_read()?;
                let index_table = read_txn.open_table(index)?;
                let Some(id) = index_table.get(key.as_str())?.map(|v| v.value()) else {
                    return Ok(None);
                };
                let accounts = read_txn.open_table(ACCOUNTS)?;
                match accounts.get(id)? {
                    Some(row) => Ok(Some(serde_json::from_slice(row.value())?)),
                    None => Ok(None),
                }
            })
            .await
    }

    /// Load, mutate and write back a single account row in one write
    /// transaction.
    async fn modify<F>(&self, id: u64, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Account) + Send + 'static,
    {
        self.db
            .run(move |db| {
                let write_txn = db.begin_write()?;
                {
                    let mut table = write_txn.open_table(ACCOUNTS)?;
                    let mut account: Account = match table.get(id)? {
                        Some(row) => serde_json::from_slice(row.value())?,
                        None => return Err(StoreError::NotFound(format!("Account {id}"))),
                    };
                    apply(&mut account);
                    account.updated_at = Utc::now();
                    let json = serde_json::to_vec(&account)?;
                    table.insert(id, json.as_slice())?;
                }
                write_txn.commit()?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl CredentialStore for AccountRepository {
    async fn find_by_id(&self, id: u64) -> StoreResult<Option<Account>> {
        self.db
            .run(move |db| {
                let read_txn = db.begin_read()?;
                let table = read_txn.open_table(ACCOUNTS)?;
                match table.get(id)? {
                    Some(row) => Ok(Some(serde_json::from_slice(row.value())?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn find_by_phone(&self, phone: &str) -> StoreResult<Option<Account>> {
        self.find_by_index(PHONE_INDEX, phone.trim().to_string())
            .await
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        self.find_by_index(EMAIL_INDEX, email.trim().to_lowercase())
            .await
    }

    async fn create(&self, new: NewAccount) -> StoreResult<Account> {
        self.db
            .run(move |db| {
                let phone = new.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
                let email = new
                    .email
                    .map(|e| e.trim().to_lowercase())
                    .filter(|e| !e.is_empty());

                let write_txn = db.begin_write()?;
                let account = {
                    let mut phones = write_txn.open_table(PHONE_INDEX)?;
                    let mut emails = write_txn.open_table(EMAIL_INDEX)?;

                    if let Some(phone) = phone.as_deref() {
                        if phones.get(phone)?.is_some() {
                            return Err(StoreError::AlreadyExists(format!("phone {phone}")));
                        }
                    }
                    if let Some(email) = email.as_deref() {
                        if emails.get(email)?.is_some() {
                            return Err(StoreError::AlreadyExists(format!("email {email}")));
                        }
                    }

                    let mut sequences = write_txn.open_table(SEQUENCES)?;
                    let id = sequences
                        .get(ACCOUNT_SEQUENCE)?
                        .map(|v| v.value())
                        .unwrap_or(0)
                        + 1;
                    sequences.insert(ACCOUNT_SEQUENCE, id)?;

                    let now = Utc::now();
                    let account = Account {
                        id,
                        creator_id: new.creator_id,
                        phone,
                        email,
                        names: new.names,
                        password_hash: new.password_hash,
                        status: new.status,
                        primary_group: new.primary_group,
                        group_id: new.group_id,
                        last_login: None,
                        created_at: now,
                        updated_at: now,
                    };

                    let json = serde_json::to_vec(&account)?;
                    write_txn.open_table(ACCOUNTS)?.insert(id, json.as_slice())?;
                    if let Some(phone) = account.phone.as_deref() {
                        phones.insert(phone, id)?;
                    }
                    if let Some(email) = account.email.as_deref() {
                        emails.insert(email, id)?;
                    }
                    account
                };
                write_txn.commit()?;
                Ok(account)
            })
            .await
    }

    async fn update_status(&self, id: u64, status: AccountStatus) -> StoreResult<()> {
        self.modify(id, move |account| account.status = status).await
    }

    async fn update_last_login(&self, id: u64, at: DateTime<Utc>) -> StoreResult<()> {
        self.modify(id, move |account| account.last_login = Some(at))
            .await
    }

    async fn update_password(&self, id: u64, password_hash: String) -> StoreResult<()> {
        self.modify(id, move |account| account.password_hash = password_hash)
            .await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.db.ping().await
    }
}
