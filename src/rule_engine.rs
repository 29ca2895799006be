//! Rule evaluation and score aggregation
//!
//! A [`Rule`] is a plain record: identity, weight, enabled flag and a pure evaluation
//! function. The engine runs enabled rules in registration order and keeps the ones
//! that trigger, so the resulting reasons are deterministic for identical inputs.

use crate::fraud_patterns::{self, RuleConfig};
use crate::{Details, Result, Transaction, UserProfile};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum aggregated risk score
pub const MAX_RISK_SCORE: u8 = 100;

/// Highest score still mapped to [`RiskLevel::Low`]
pub const LOW_RISK_MAX: u8 = 30;

/// Highest score still mapped to [`RiskLevel::Medium`]
pub const MEDIUM_RISK_MAX: u8 = 70;

/// Result of evaluating one rule against one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub rule_name: String,
    pub triggered: bool,
    /// Score contribution, 0 when not triggered
    pub score: u32,
    pub description: String,
    pub details: Details,
}

/// What a rule's check function found, before it is tagged with the rule's identity
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    score: Option<u32>,
    details: Details,
}

impl Finding {
    pub fn hit(score: u32, details: Details) -> Self {
        Self {
            score: Some(score),
            details,
        }
    }

    pub fn miss(details: Details) -> Self {
        Self {
            score: None,
            details,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.score.is_some()
    }
}

type CheckFn = dyn Fn(u32, &Transaction, Option<&UserProfile>) -> Finding + Send + Sync;

/// A single fraud rule.
///
/// The check receives the rule weight, the transaction and the user's profile if one
/// exists. It must not fail: a condition it cannot determine counts as not triggered.
pub struct Rule {
    id: String,
    name: String,
    description: String,
    weight: u32,
    enabled: bool,
    check: Box<CheckFn>,
}

impl Rule {
    pub fn new<F>(id: &str, name: &str, description: &str, weight: u32, check: F) -> Self
    where
        F: Fn(u32, &Transaction, Option<&UserProfile>) -> Finding + Send + Sync + 'static,
    {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            weight,
            enabled: true,
            check: Box::new(check),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum score contribution when fully triggered
    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Evaluate the rule
    pub fn evaluate(&self, transaction: &Transaction, profile: Option<&UserProfile>) -> RuleResult {
        let finding = (self.check)(self.weight, transaction, profile);

        RuleResult {
            rule_id: self.id.clone(),
            rule_name: self.name.clone(),
            triggered: finding.is_hit(),
            score: finding.score.unwrap_or(0),
            description: self.description.clone(),
            details: finding.details,
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Risk level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,    // 0-30
    Medium, // 31-70
    High,   // 71-100
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=LOW_RISK_MAX => RiskLevel::Low,
            s if s <= MEDIUM_RISK_MAX => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision taken on a transaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Approved,
    Review,
    Blocked,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "APPROVED",
            Decision::Review => "REVIEW",
            Decision::Blocked => "BLOCKED",
        }
    }
}

impl From<RiskLevel> for Decision {
    fn from(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Low => Decision::Approved,
            RiskLevel::Medium => Decision::Review,
            RiskLevel::High => Decision::Blocked,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered collection of fraud rules
#[derive(Debug)]
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl RuleEngine {
    /// Engine with the built-in rule catalog and default thresholds
    pub fn new() -> Self {
        Self {
            rules: fraud_patterns::default_rules(&RuleConfig::default()),
        }
    }

    /// Engine with the built-in rule catalog tuned by `config`
    pub fn with_config(config: &RuleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            rules: fraud_patterns::default_rules(config),
        })
    }

    /// Engine with no rules registered
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule; it runs after every rule registered before it
    pub fn register(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Run every enabled rule and return the triggered results in registration order
    pub fn evaluate_all(
        &self,
        transaction: &Transaction,
        profile: Option<&UserProfile>,
    ) -> Vec<RuleResult> {
        self.rules
            .iter()
            .filter(|rule| rule.is_enabled())
            .map(|rule| rule.evaluate(transaction, profile))
            .filter(|result| result.triggered)
            .inspect(|result| {
                tracing::debug!(
                    transaction_id = %transaction.transaction_id,
                    rule_id = %result.rule_id,
                    score = result.score,
                    "Rule triggered"
                );
            })
            .collect()
    }

    /// Sum of score contributions, capped at [`MAX_RISK_SCORE`]
    pub fn calculate_total_score(&self, results: &[RuleResult]) -> u8 {
        total_score(results)
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Sum of score contributions, capped at [`MAX_RISK_SCORE`]
pub fn total_score(results: &[RuleResult]) -> u8 {
    let total = results
        .iter()
        .fold(0u32, |acc, result| acc.saturating_add(result.score));
    total.min(u32::from(MAX_RISK_SCORE)) as u8
}
