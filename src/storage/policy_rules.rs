// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persisted policy rules.
//!
//! Two rule kinds share one table, keyed by their canonical string form:
//!
//! - `p|<subject>|<object>|<action>`: permission
//! - `g|<member>|<role>`: grouping (member inherits role's permissions)

use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};

use super::database::{Database, StoreResult, POLICY_RULES};

/// A single policy rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum PolicyRule {
    P {
        subject: String,
        object: String,
        action: String,
    },
    G {
        member: String,
        role: String,
    },
}

impl PolicyRule {
    /// Joins fields in [`PolicyRule::key`]. Fields must not contain it.
    pub const KEY_SEPARATOR: char = '|';

    pub fn permission(
        subject: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        PolicyRule::P {
            subject: subject.into(),
            object: object.into(),
            action: action.into(),
        }
    }

    pub fn grouping(member: impl Into<String>, role: impl Into<String>) -> Self {
        PolicyRule::G {
            member: member.into(),
            role: role.into(),
        }
    }

    /// Storage key; unique per rule while no field contains [`Self::KEY_SEPARATOR`].
    pub fn key(&self) -> String {
        let sep = Self::KEY_SEPARATOR;
        match self {
            PolicyRule::P {
                subject,
                object,
                action,
            } => format!("p{sep}{subject}{sep}{object}{sep}{action}"),
            PolicyRule::G { member, role } => format!("g{sep}{member}{sep}{role}"),
        }
    }
}

/// redb-backed rule table.
#[derive(Clone)]
pub struct PolicyRuleRepository {
    db: Database,
}

impl PolicyRuleRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load every stored rule.
    pub async fn load_all(&self) -> StoreResult<Vec<PolicyRule>> {
        self.db
            .run(|db| {
                let read_txn = db.begin_read()?;
                let table = read_txn.open_table(POLICY_RULES)?;
                let mut rules = Vec::new();
                for entry in table.iter()? {
                    let (_, value) = entry?;
                    rules.push(serde_json::from_slice(value.value())?);
                }
                Ok(rules)
            })
            .await
    }

    /// Insert rules in one write transaction.
    pub async fn insert_all(&self, rules: Vec<PolicyRule>) -> StoreResult<()> {
        self.db
            .run(move |db| {
                let write_txn = db.begin_write()?;
                {
                    let mut table = write_txn.open_table(POLICY_RULES)?;
                    for rule in &rules {
                        let json = serde_json::to_vec(rule)?;
                        table.insert(rule.key().as_str(), json.as_slice())?;
                    }
                }
                write_txn.commit()?;
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
    async fn rules_persist_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.redb");
        {
            let repo = PolicyRuleRepository::new(Database::open(&path).unwrap());
            repo.insert_all(vec![
                PolicyRule::permission("1", "loans", "read"),
                PolicyRule::grouping("2", "officer"),
            ])
            .await
            .unwrap();
        }

        let repo = PolicyRuleRepository::new(Database::open(&path).unwrap());
        let rules = repo.load_all().await.unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.contains(&PolicyRule::permission("1", "loans", "read")));
        assert!(rules.contains(&PolicyRule::grouping("2", "officer")));
    }

    #[tokio::test]
    async fn reinserting_a_rule_does_not_duplicate() {
        let dir = TempDir::new().unwrap();
        let repo = PolicyRuleRepository::new(Database::open(&dir.path().join("r.redb")).unwrap());
        let rule = PolicyRule::permission("1", "loans", "read");
        repo.insert_all(vec![rule.clone()]).await.unwrap();
        repo.insert_all(vec![rule]).await.unwrap();
        assert_eq!(repo.load_all().await.unwrap().len(), 1);
    }

    #[test]
    fn keys_distinguish_kinds() {
        assert_eq!(PolicyRule::permission("a", "b", "c").key(), "p|a|b|c");
        assert_eq!(PolicyRule::grouping("a", "b").key(), "g|a|b");
    }
}
