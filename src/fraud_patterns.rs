//! Built-in fraud rule catalog

use crate::geographic_risk::GeoVelocity;
use crate::rule_engine::{Finding, Rule};
use crate::{Details, FraudError, Result};
use chrono::{Duration, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const HIGH_AMOUNT_RULE: &str = "high_amount_rule";
pub const VELOCITY_RULE: &str = "velocity_rule";
pub const GEO_VELOCITY_RULE: &str = "geo_velocity_rule";
pub const UNUSUAL_HOUR_RULE: &str = "unusual_hour_rule";
pub const NEW_USER_RULE: &str = "new_user_rule";
pub const ROUND_AMOUNT_RULE: &str = "round_amount_rule";
pub const MULTIPLE_FAILED_ATTEMPTS_RULE: &str = "multiple_failed_attempts_rule";

/// Rule thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Amounts strictly above this trigger the high amount rule
    pub high_amount_threshold: f64,
    /// A transaction within this many minutes of the previous one triggers velocity
    pub velocity_window_minutes: i64,
    /// Implied travel speed above which a location change is impossible (airliner speed)
    pub max_travel_speed_kmh: f64,
    /// Location changes shorter than this never count as impossible travel
    pub min_travel_distance_km: f64,
    /// First hour (inclusive) of the suspicious night window
    pub night_start_hour: u32,
    /// Last hour (inclusive) of the suspicious night window
    pub night_end_hour: u32,
    /// Users without a profile trigger above this amount
    pub new_user_amount_threshold: f64,
    /// Accounts younger than this many days count as young
    pub young_account_days: i64,
    /// Young accounts trigger above this amount
    pub young_account_amount_threshold: f64,
    pub round_amount_minimum: f64,
    pub round_amount_step: f64,
    /// Rule ids registered disabled
    pub disabled_rules: Vec<String>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            high_amount_threshold: 10_000.0,
            velocity_window_minutes: 5,
            max_travel_speed_kmh: 900.0,
            min_travel_distance_km: 100.0,
            night_start_hour: 23,
            night_end_hour: 5,
            new_user_amount_threshold: 3_000.0,
            young_account_days: 7,
            young_account_amount_threshold: 5_000.0,
            round_amount_minimum: 5_000.0,
            round_amount_step: 1_000.0,
            disabled_rules: Vec::new(),
        }
    }
}

impl RuleConfig {
    /// Parse and validate a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| FraudError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject thresholds the rules cannot evaluate meaningfully
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("high_amount_threshold", self.high_amount_threshold),
            ("max_travel_speed_kmh", self.max_travel_speed_kmh),
            ("round_amount_step", self.round_amount_step),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(format!("{field} must be positive, got {value}")));
            }
        }

        if self.velocity_window().is_none() {
            return Err(invalid(format!(
                "velocity_window_minutes out of range: {}",
                self.velocity_window_minutes
            )));
        }
        if self.young_account_age().is_none() {
            return Err(invalid(format!(
                "young_account_days out of range: {}",
                self.young_account_days
            )));
        }

        for (field, hour) in [
            ("night_start_hour", self.night_start_hour),
            ("night_end_hour", self.night_end_hour),
        ] {
            if hour > 23 {
                return Err(invalid(format!("{field} must be 0-23, got {hour}")));
            }
        }

        Ok(())
    }

    /// Velocity window, `None` when negative or not representable
    pub fn velocity_window(&self) -> Option<Duration> {
        Duration::try_minutes(self.velocity_window_minutes).filter(|d| *d >= Duration::zero())
    }

    /// Age below which an account counts as young, `None` when negative or not representable
    pub fn young_account_age(&self) -> Option<Duration> {
        Duration::try_days(self.young_account_days).filter(|d| *d >= Duration::zero())
    }

    /// Whether `hour` falls in the night window; `start > end` wraps past midnight
    pub fn is_night_hour(&self, hour: u32) -> bool {
        in_hour_window(hour, self.night_start_hour, self.night_end_hour)
    }

    pub fn is_disabled(&self, rule_id: &str) -> bool {
        self.disabled_rules.iter().any(|id| id == rule_id)
    }
}

fn in_hour_window(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        (start..=end).contains(&hour)
    } else {
        hour >= start || hour <= end
    }
}

fn invalid(detail: String) -> FraudError {
    FraudError::InvalidConfig(detail)
}

/// The built-in rules in evaluation order
pub fn default_rules(config: &RuleConfig) -> Vec<Rule> {
    vec![
        high_amount_rule(config),
        velocity_rule(config),
        geo_velocity_rule(config),
        unusual_hour_rule(config),
        new_user_rule(config),
        round_amount_rule(config),
        multiple_failed_attempts_rule(),
    ]
    .into_iter()
    .map(|rule| {
        let enabled = !config.is_disabled(rule.id());
        rule.with_enabled(enabled)
    })
    .collect()
}

/// Partial credit by how far the amount exceeds the threshold
fn high_amount_score(weight: u32, factor: f64) -> u32 {
    if factor > 5.0 {
        weight
    } else if factor > 3.0 {
        (f64::from(weight) * 0.8) as u32
    } else {
        (f64::from(weight) * 0.6) as u32
    }
}

pub fn high_amount_rule(config: &RuleConfig) -> Rule {
    let threshold = config.high_amount_threshold;
    Rule::new(
        HIGH_AMOUNT_RULE,
        "High Amount Transaction",
        "Transaction amount above the normal limit",
        25,
        move |weight, transaction, _| {
            let details = Details::from([
                ("amount".to_string(), json!(transaction.amount)),
                ("threshold".to_string(), json!(threshold)),
            ]);
            if transaction.amount > threshold {
                let factor = transaction.amount / threshold;
                Finding::hit(high_amount_score(weight, factor), details)
            } else {
                Finding::miss(details)
            }
        },
    )
}

pub fn velocity_rule(config: &RuleConfig) -> Rule {
    let window = config.velocity_window();
    Rule::new(
        VELOCITY_RULE,
        "Transaction Velocity",
        "Multiple transactions in a short period",
        20,
        move |weight, transaction, profile| {
            let since_last = transaction
                .timestamp
                .zip(profile.and_then(|p| p.last_transaction_at))
                .map(|(now, last)| now - last);

            match since_last.zip(window) {
                Some((elapsed, window)) if elapsed < window => Finding::hit(
                    weight,
                    Details::from([(
                        "seconds_since_last".to_string(),
                        json!(elapsed.num_seconds()),
                    )]),
                ),
                _ => Finding::miss(Details::new()),
            }
        },
    )
}

pub fn geo_velocity_rule(config: &RuleConfig) -> Rule {
    let max_speed = config.max_travel_speed_kmh;
    let min_distance = config.min_travel_distance_km;
    Rule::new(
        GEO_VELOCITY_RULE,
        "Geographical Velocity",
        "Impossible geographic change detected",
        30,
        move |weight, transaction, profile| {
            let travel = profile.and_then(|profile| {
                let last_location = profile.last_location()?;
                let last_at = profile.last_transaction_at?;
                let now = transaction.timestamp?;
                GeoVelocity::between(last_location, last_at, &transaction.location, now)
            });

            let Some(travel) = travel else {
                return Finding::miss(Details::new());
            };

            let details = Details::from([
                ("distance_km".to_string(), json!(travel.distance_km)),
                ("elapsed_hours".to_string(), json!(travel.elapsed_hours)),
                ("speed_kmh".to_string(), json!(travel.speed_kmh)),
            ]);
            if travel.is_possible(max_speed, min_distance) {
                Finding::miss(details)
            } else {
                Finding::hit(weight, details)
            }
        },
    )
}

pub fn unusual_hour_rule(config: &RuleConfig) -> Rule {
    let start = config.night_start_hour;
    let end = config.night_end_hour;
    Rule::new(
        UNUSUAL_HOUR_RULE,
        "Unusual Hour Transaction",
        "Transaction made at an unusual hour",
        10,
        move |weight, transaction, _| {
            let Some(timestamp) = transaction.timestamp else {
                return Finding::miss(Details::new());
            };
            let hour = timestamp.hour();
            let details = Details::from([("hour".to_string(), json!(hour))]);

            if in_hour_window(hour, start, end) {
                Finding::hit(weight, details)
            } else {
                Finding::miss(details)
            }
        },
    )
}

pub fn new_user_rule(config: &RuleConfig) -> Rule {
    let new_user_threshold = config.new_user_amount_threshold;
    let young_threshold = config.young_account_amount_threshold;
    let young_age = config.young_account_age();
    Rule::new(
        NEW_USER_RULE,
        "New User High Transaction",
        "New user with a high value transaction",
        15,
        move |weight, transaction, profile| {
            let triggered = match profile {
                None => transaction.amount > new_user_threshold,
                Some(profile) => {
                    let is_young = transaction
                        .timestamp
                        .and_then(|at| profile.account_age_at(at))
                        .zip(young_age)
                        .is_some_and(|(age, limit)| age < limit);
                    is_young && transaction.amount > young_threshold
                }
            };

            let details = Details::from([("has_profile".to_string(), json!(profile.is_some()))]);
            if triggered {
                Finding::hit(weight, details)
            } else {
                Finding::miss(details)
            }
        },
    )
}

pub fn round_amount_rule(config: &RuleConfig) -> Rule {
    let minimum = config.round_amount_minimum;
    let step = config.round_amount_step;
    Rule::new(
        ROUND_AMOUNT_RULE,
        "Suspicious Round Amount",
        "Suspicious round amount",
        5,
        move |weight, transaction, _| {
            let amount = transaction.amount;
            let details = Details::from([("amount".to_string(), json!(amount))]);

            if amount >= minimum && amount % step == 0.0 {
                Finding::hit(weight, details)
            } else {
                Finding::miss(details)
            }
        },
    )
}

/// Placeholder: no failed-attempt history is tracked, so this never triggers
pub fn multiple_failed_attempts_rule() -> Rule {
    Rule::new(
        MULTIPLE_FAILED_ATTEMPTS_RULE,
        "Multiple Failed Attempts",
        "Multiple failed attempts detected",
        25,
        |_, _, _| Finding::miss(Details::new()),
    )
}
