//! # Fraud Decision Engine
//!
//! Real-time fraud decisioning for card and payment transactions.
//!
//! ## Features
//!
//! - **Rule Engine**: Ordered, independently testable rules with hand-tuned weights
//! - **Impossible Travel**: Haversine-based geo-velocity detection
//! - **Blacklist Screening**: User, card, IP and device short-circuit blocking
//! - **Risk Mapping**: Score to LOW/MEDIUM/HIGH and APPROVED/REVIEW/BLOCKED
//! - **Concurrent Stores**: Reader-writer guarded in-memory profile and blacklist stores
//!
//! Transport (HTTP, JSON request validation) and bootstrap seeding are left to the caller:
//! construct the stores, wrap them in [`FraudDecisionService`] and map its results outward.

pub mod blacklist;
pub mod decision_service;
pub mod fraud_patterns;
pub mod geographic_risk;
pub mod profiles;
pub mod rule_engine;

pub use blacklist::{BlacklistEntry, BlacklistStore, EntityType, InMemoryBlacklistStore};
pub use decision_service::{FraudDecisionService, TransactionAnalytics};
pub use fraud_patterns::RuleConfig;
pub use geographic_risk::{distance_km, GeoVelocity};
pub use profiles::{InMemoryProfileStore, ProfileStore};
pub use rule_engine::{Decision, RiskLevel, Rule, RuleEngine, RuleResult};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use uuid::Uuid;

/// Free-form detail mapping attached to rule results and analysis results
pub type Details = BTreeMap<String, serde_json::Value>;

/// Fraud engine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FraudError {
    #[error("Profile not found for user {0}")]
    ProfileNotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, FraudError>;

/// Geographic location of a transaction or of a known user location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub country: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

impl Location {
    pub fn new(country: &str, city: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            country: country.to_string(),
            city: city.to_string(),
            latitude,
            longitude,
            ip_address: None,
        }
    }

    pub fn with_ip(mut self, ip_address: &str) -> Self {
        self.ip_address = Some(ip_address.to_string());
        self
    }
}

/// Device the transaction originated from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_type: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// Transaction submitted for analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub user_id: String,
    pub amount: f64,
    pub currency: String,
    pub merchant: String,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
    /// Stamped with the evaluation time when absent
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_last4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Transaction {
    /// Create a transaction with a generated `TXN-<uuid>` identifier
    pub fn new(
        user_id: &str,
        amount: f64,
        currency: &str,
        merchant: &str,
        location: Location,
    ) -> Self {
        Self {
            transaction_id: format!("TXN-{}", Uuid::new_v4()),
            user_id: user_id.to_string(),
            amount,
            currency: currency.to_string(),
            merchant: merchant.to_string(),
            location,
            device_info: None,
            timestamp: None,
            card_last4: None,
            card_type: None,
            description: None,
        }
    }

    pub fn with_id(mut self, transaction_id: &str) -> Self {
        self.transaction_id = transaction_id.to_string();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_card(mut self, last4: &str, card_type: &str) -> Self {
        self.card_last4 = Some(last4.to_string());
        self.card_type = Some(card_type.to_string());
        self
    }

    pub fn with_device(mut self, device_info: DeviceInfo) -> Self {
        self.device_info = Some(device_info);
        self
    }

    /// Non-empty card last four digits, if any
    pub fn card(&self) -> Option<&str> {
        non_empty(self.card_last4.as_deref())
    }

    /// Non-empty IP address, if any
    pub fn ip_address(&self) -> Option<&str> {
        non_empty(self.location.ip_address.as_deref())
    }

    /// Non-empty device id, if any
    pub fn device_id(&self) -> Option<&str> {
        non_empty(self.device_info.as_ref().map(|d| d.device_id.as_str()))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// A past fraud incident recorded against a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudIncident {
    pub incident_id: String,
    pub transaction_id: String,
    pub detected_at: DateTime<Utc>,
    pub confirmed_fraud: bool,
    pub amount: f64,
    pub description: String,
}

/// Behavioural profile of a user, replaced wholesale on update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub avg_transaction_value: f64,
    pub total_transactions: u64,
    pub first_transaction_at: Option<DateTime<Utc>>,
    pub last_transaction_at: Option<DateTime<Utc>>,
    /// Most recent location last
    #[serde(default)]
    pub common_locations: Vec<Location>,
    #[serde(default)]
    pub common_merchants: BTreeSet<String>,
    #[serde(default)]
    pub fraud_history: Vec<FraudIncident>,
    #[serde(default)]
    pub trusted_devices: BTreeSet<String>,
}

impl UserProfile {
    /// Create an empty profile with no history
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            avg_transaction_value: 0.0,
            total_transactions: 0,
            first_transaction_at: None,
            last_transaction_at: None,
            common_locations: Vec::new(),
            common_merchants: BTreeSet::new(),
            fraud_history: Vec::new(),
            trusted_devices: BTreeSet::new(),
        }
    }

    /// Most recently recorded location
    pub fn last_location(&self) -> Option<&Location> {
        self.common_locations.last()
    }

    /// Age of the account at `at`, measured from the first transaction
    pub fn account_age_at(&self, at: DateTime<Utc>) -> Option<Duration> {
        self.first_transaction_at.map(|first| at - first)
    }
}

/// Outcome of analyzing a single transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAnalysisResult {
    pub transaction_id: String,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub decision: Decision,
    pub reasons: Vec<String>,
    pub rules_triggered: Vec<String>,
    pub details: Details,
    pub analyzed_at: DateTime<Utc>,
    pub processing_time_ms: u64,
}

impl FraudAnalysisResult {
    pub fn is_blocked(&self) -> bool {
        self.decision == Decision::Blocked
    }

    /// Check if transaction requires manual review
    pub fn requires_review(&self) -> bool {
        self.decision == Decision::Review
    }

    /// Export as JSON
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
