//! Blacklist screening for users, cards, IP addresses and devices
//!
//! Entries are keyed by `(entity type, value)`. An entry stops matching once it is flagged
//! inactive or its expiry passes; expiry is evaluated on lookup and nothing is purged.

use crate::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Entity kinds screened by the decision flow
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    User,
    Card,
    Ip,
    Device,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Card => "card",
            EntityType::Ip => "ip",
            EntityType::Device => "device",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blacklist entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub id: String,
    /// Free-form type; the decision flow uses the [`EntityType`] names
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: String,
    pub reason: String,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl BlacklistEntry {
    /// Create an active, non-expiring entry with a generated `bl-<uuid>` id
    pub fn new(entity_type: &str, value: &str, reason: &str) -> Self {
        Self {
            id: format!("bl-{}", Uuid::new_v4()),
            entity_type: entity_type.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
            added_at: Utc::now(),
            expires_at: None,
            is_active: true,
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Whether the entry blocks its value at instant `at`
    pub fn is_effective_at(&self, at: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |expires| expires > at)
    }
}

/// Blacklist storage
pub trait BlacklistStore: Send + Sync {
    /// True when an active, unexpired entry exists for exactly `(entity_type, value)`
    fn is_blacklisted(&self, entity_type: &str, value: &str) -> Result<bool>;

    /// Insert an entry, replacing any previous entry for the same `(type, value)`
    fn add(&self, entry: BlacklistEntry) -> Result<()>;
}

/// In-memory blacklist: entity type -> value -> entry, behind one reader-writer lock
#[derive(Debug, Default)]
pub struct InMemoryBlacklistStore {
    entries: RwLock<HashMap<String, HashMap<String, BlacklistEntry>>>,
}

impl InMemoryBlacklistStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup with expiry evaluated at `at` instead of the current time
    pub fn is_blacklisted_at(&self, entity_type: &str, value: &str, at: DateTime<Utc>) -> bool {
        self.entries
            .read()
            .get(entity_type)
            .and_then(|by_value| by_value.get(value))
            .is_some_and(|entry| entry.is_effective_at(at))
    }

    /// Stored entry for `(entity_type, value)`, whether or not it is still effective
    pub fn get(&self, entity_type: &str, value: &str) -> Option<BlacklistEntry> {
        self.entries
            .read()
            .get(entity_type)
            .and_then(|by_value| by_value.get(value))
            .cloned()
    }

    /// Total number of stored entries, including inactive and expired ones
    pub fn len(&self) -> usize {
        self.entries.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlacklistStore for InMemoryBlacklistStore {
    fn is_blacklisted(&self, entity_type: &str, value: &str) -> Result<bool> {
        Ok(self.is_blacklisted_at(entity_type, value, Utc::now()))
    }

    fn add(&self, entry: BlacklistEntry) -> Result<()> {
        self.entries
            .write()
            .entry(entry.entity_type.clone())
            .or_default()
            .insert(entry.value.clone(), entry);
        Ok(())
    }
}
