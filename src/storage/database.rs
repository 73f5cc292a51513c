// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded relational store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `accounts`: account id → serialized Account
//! - `account_phone_index`: canonical phone → account id
//! - `account_email_index`: lowercase email → account id
//! - `sequences`: name → last issued id
//! - `policy_rules`: rule key → serialized PolicyRule

use std::path::Path;
use std::sync::Arc;

use redb::{ReadableDatabase, TableDefinition};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: account id → serialized Account (JSON bytes).
pub(crate) const ACCOUNTS: TableDefinition<u64, &[u8]> = TableDefinition::new("accounts");

/// Unique index: canonical phone → account id.
pub(crate) const PHONE_INDEX: TableDefinition<&str, u64> =
    TableDefinition::new("account_phone_index");

/// Unique index: lowercase email → account id.
pub(crate) const EMAIL_INDEX: TableDefinition<&str, u64> =
    TableDefinition::new("account_email_index");

/// Monotonic id sequences (e.g. `accounts` → last account id).
pub(crate) const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Policy rules: `p|sub|obj|act` or `g|member|role` → serialized PolicyRule.
pub(crate) const POLICY_RULES: TableDefinition<&str, &[u8]> = TableDefinition::new("policy_rules");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Database
// =============================================================================

/// Shared handle to the embedded database.
///
/// Cloning is cheap; all clones point at the same redb file. Every operation
/// runs on tokio's blocking pool so a slow disk only stalls the awaiting
/// request.
#[derive(Clone)]
pub struct Database {
    db: Arc<redb::Database>,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = redb::Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ACCOUNTS)?;
            let _ = write_txn.open_table(PHONE_INDEX)?;
            let _ = write_txn.open_table(EMAIL_INDEX)?;
            let _ = write_txn.open_table(SEQUENCES)?;
            let _ = write_txn.open_table(POLICY_RULES)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Run a closure against the database on the blocking pool.
    pub(crate) async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&redb::Database) -> StoreResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    /// Liveness check: open and drop a read transaction.
    pub async fn ping(&self) -> StoreResult<()> {
        self.run(|db| {
            let _ = db.begin_read()?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_creates_file_and_pings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("gate.redb");
        let db = Database::open(&path).unwrap();
        assert!(path.exists());
        db.ping().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_keeps_tables() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gate.redb");
        drop(Database::open(&path).unwrap());
        let db = Database::open(&path).unwrap();
        db.ping().await.unwrap();
    }
}
