// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Subject / object / action policy engine.
//!
//! ## Model
//!
//! - permission `p(subject, object, action)`: subject may perform action on
//!   object; `*` as object or action matches anything
//! - grouping `g(member, role)`: member inherits every permission of role,
//!   transitively
//!
//! Subjects are account ids as decimal strings or role names. Rules are kept
//! in memory and written through to the rule table.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storage::{PolicyRule, PolicyRuleRepository, StoreError};

const WILDCARD: &str = "*";

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("policy store error: {0}")]
    Store(#[from] StoreError),
}

/// Authorization decision point.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Whether `subject` may perform `action` on `object`.
    async fn enforce(
        &self,
        subject: &str,
        object: &str,
        action: &str,
    ) -> Result<bool, PolicyError>;

    /// Add rules as one batch. Returns `false` (and adds nothing) when any
    /// rule already exists.
    async fn add_policies(&self, rules: Vec<PolicyRule>) -> Result<bool, PolicyError>;
}

#[derive(Default)]
struct RuleSet {
    rules: HashSet<PolicyRule>,
    /// member → direct roles
    roles: HashMap<String, HashSet<String>>,
}

impl RuleSet {
    fn insert(&mut self, rule: PolicyRule) {
        if let PolicyRule::G { member, role } = &rule {
            self.roles
                .entry(member.clone())
                .or_default()
                .insert(role.clone());
        }
        self.rules.insert(rule);
    }

    /// The subject plus every role reachable through groupings.
    fn subjects_for(&self, subject: &str) -> HashSet<String> {
        let mut seen = HashSet::from([subject.to_string()]);
        let mut queue = VecDeque::from([subject.to_string()]);
        while let Some(current) = queue.pop_front() {
            if let Some(roles) = self.roles.get(&current) {
                for role in roles {
                    if seen.insert(role.clone()) {
                        queue.push_back(role.clone());
                    }
                }
            }
        }
        seen
    }

    fn allows(&self, subject: &str, object: &str, action: &str) -> bool {
        let subjects = self.subjects_for(subject);
        self.rules.iter().any(|rule| match rule {
            PolicyRule::P {
                subject: s,
                object: o,
                action: a,
            } => {
                subjects.contains(s)
                    && (o == WILDCARD || o == object)
                    && (a == WILDCARD || a == action)
            }
            PolicyRule::G { .. } => false,
        })
    }
}

/// In-memory rule engine with optional write-through persistence.
pub struct RuleEngine {
    rules: RwLock<RuleSet>,
    repo: Option<PolicyRuleRepository>,
}

impl RuleEngine {
    /// Engine without persistence.
    pub fn in_memory() -> Self {
        Self {
            rules: RwLock::new(RuleSet::default()),
            repo: None,
        }
    }

    /// Load persisted rules and write new ones through to `repo`.
    pub async fn load(repo: PolicyRuleRepository) -> Result<Self, PolicyError> {
        let mut set = RuleSet::default();
        let stored = repo.load_all().await?;
        tracing::info!(rules = stored.len(), "loaded policy rules");
        for rule in stored {
            set.insert(rule);
        }
        Ok(Self {
            rules: RwLock::new(set),
            repo: Some(repo),
        })
    }
}

#[async_trait]
impl PolicyEngine for RuleEngine {
    async fn enforce(
        &self,
        subject: &str,
        object: &str,
        action: &str,
    ) -> Result<bool, PolicyError> {
        let rules = self.rules.read().await;
        Ok(rules.allows(subject, object, action))
    }

    async fn add_policies(&self, rules: Vec<PolicyRule>) -> Result<bool, PolicyError> {
        // Held across the check, the write-through and the insert so that
        // overlapping batches are decided one at a time.
        let mut current = self.rules.write().await;
        if rules.iter().any(|rule| current.rules.contains(rule)) {
            return Ok(false);
        }

        if let Some(repo) = &self.repo {
            repo.insert_all(rules.clone()).await?;
        }

        for rule in rules {
            current.insert(rule);
        }
        Ok(true)
    }
}
