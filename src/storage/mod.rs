// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistence for the session layer.
//!
//! ## Layout
//!
//! - [`database`]: embedded redb file (accounts, policy rules)
//! - [`accounts`]: credential store over the `accounts` table
//! - [`policy_rules`]: persisted policy rules
//! - [`cache`]: session cache trait and in-process implementation
//! - [`redis_cache`]: Redis session cache
//!
//! ## Important Notes
//!
//! - redb calls run on the blocking pool, never on the async workers
//! - the cache is the source of truth for token validity; the database never
//!   stores tokens

pub mod accounts;
pub mod cache;
pub mod database;
pub mod policy_rules;
pub mod redis_cache;

pub use accounts::{
    Account, AccountRepository, AccountStatus, CredentialStore, NewAccount, UnknownStatus,
};
pub use cache::{CacheError, CacheResult, MemoryCache, SessionCache};
pub use database::{Database, StoreError, StoreResult};
pub use policy_rules::{PolicyRule, PolicyRuleRepository};
pub use redis_cache::RedisCache;
