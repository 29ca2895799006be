//! Fraud decisioning: blacklist short-circuit, profile lookup, rule scoring

use crate::blacklist::{BlacklistStore, EntityType};
use crate::profiles::ProfileStore;
use crate::rule_engine::{Decision, RiskLevel, RuleEngine, MAX_RISK_SCORE};
use crate::{Details, FraudAnalysisResult, FraudError, Result, Transaction, UserProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Reason attached to a blacklist block
pub const BLACKLIST_REASON: &str = "Entity on blacklist";

/// Rule label attached to a blacklist block
pub const BLACKLIST_RULE_NAME: &str = "Blacklist Check";

/// Per-user transaction statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAnalytics {
    pub user_id: String,
    pub total_transactions: u64,
    pub average_amount: f64,
    pub fraud_count: u64,
    /// Percentage of transactions with a recorded fraud incident
    pub fraud_rate: f64,
    pub last_transaction_at: Option<DateTime<Utc>>,
}

impl TransactionAnalytics {
    /// Analytics for a user with no recorded history
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_transactions: 0,
            average_amount: 0.0,
            fraud_count: 0,
            fraud_rate: 0.0,
            last_transaction_at: None,
        }
    }

    pub fn from_profile(profile: &UserProfile) -> Self {
        let fraud_count = profile.fraud_history.len() as u64;
        let fraud_rate = if profile.total_transactions > 0 {
            fraud_count as f64 / profile.total_transactions as f64 * 100.0
        } else {
            0.0
        };

        Self {
            user_id: profile.user_id.clone(),
            total_transactions: profile.total_transactions,
            average_amount: profile.avg_transaction_value,
            fraud_count,
            fraud_rate,
            last_transaction_at: profile.last_transaction_at,
        }
    }
}

/// Fraud decision service.
///
/// Stores are injected already populated; the service never seeds them.
pub struct FraudDecisionService {
    rule_engine: RuleEngine,
    profile_store: Arc<dyn ProfileStore>,
    blacklist_store: Arc<dyn BlacklistStore>,
}

impl FraudDecisionService {
    /// Service with the built-in rule catalog
    pub fn new(
        profile_store: Arc<dyn ProfileStore>,
        blacklist_store: Arc<dyn BlacklistStore>,
    ) -> Self {
        Self::with_engine(RuleEngine::new(), profile_store, blacklist_store)
    }

    pub fn with_engine(
        rule_engine: RuleEngine,
        profile_store: Arc<dyn ProfileStore>,
        blacklist_store: Arc<dyn BlacklistStore>,
    ) -> Self {
        Self {
            rule_engine,
            profile_store,
            blacklist_store,
        }
    }

    pub fn rule_engine(&self) -> &RuleEngine {
        &self.rule_engine
    }

    /// Score a transaction and decide whether to approve, review or block it.
    ///
    /// Only store failures are returned as errors; an unknown user is analyzed as a new user.
    pub fn analyze_transaction(&self, mut transaction: Transaction) -> Result<FraudAnalysisResult> {
        let start = Instant::now();

        if transaction.timestamp.is_none() {
            transaction.timestamp = Some(Utc::now());
        }

        let blacklisted = self.check_blacklist(&transaction).inspect_err(|e| {
            tracing::error!(
                transaction_id = %transaction.transaction_id,
                error = %e,
                "Blacklist lookup failed"
            );
        })?;

        if let Some(entity_type) = blacklisted {
            tracing::warn!(
                transaction_id = %transaction.transaction_id,
                entity_type = %entity_type,
                "Transaction blocked by blacklist"
            );
            return Ok(blocked_result(&transaction, entity_type, start));
        }

        let profile = self.find_profile(&transaction.user_id).inspect_err(|e| {
            tracing::error!(
                transaction_id = %transaction.transaction_id,
                error = %e,
                "Profile lookup failed"
            );
        })?;

        let results = self.rule_engine.evaluate_all(&transaction, profile.as_ref());
        let risk_score = self.rule_engine.calculate_total_score(&results);
        let risk_level = RiskLevel::from_score(risk_score);
        let decision = Decision::from(risk_level);

        let (reasons, rules_triggered) = results
            .into_iter()
            .map(|result| (result.description, result.rule_name))
            .unzip();

        let details = Details::from([
            ("user_id".to_string(), json!(transaction.user_id)),
            ("amount".to_string(), json!(transaction.amount)),
            ("merchant".to_string(), json!(transaction.merchant)),
        ]);

        let result = FraudAnalysisResult {
            transaction_id: transaction.transaction_id,
            risk_score,
            risk_level,
            decision,
            reasons,
            rules_triggered,
            details,
            analyzed_at: Utc::now(),
            processing_time_ms: elapsed_ms(start),
        };

        tracing::info!(
            transaction_id = %result.transaction_id,
            risk_score = result.risk_score,
            decision = %result.decision,
            processing_time_ms = result.processing_time_ms,
            "Transaction analyzed"
        );

        Ok(result)
    }

    /// Transaction statistics for a user; zeroed when the user has no profile
    pub fn get_transaction_analytics(&self, user_id: &str) -> Result<TransactionAnalytics> {
        let profile = self.find_profile(user_id).inspect_err(|e| {
            tracing::error!(user_id, error = %e, "Profile lookup failed");
        })?;

        Ok(profile.as_ref().map_or_else(
            || TransactionAnalytics::empty(user_id),
            TransactionAnalytics::from_profile,
        ))
    }

    /// First blacklisted entity in user, card, IP, device order
    fn check_blacklist(&self, transaction: &Transaction) -> Result<Option<EntityType>> {
        let candidates = [
            (EntityType::User, Some(transaction.user_id.as_str())),
            (EntityType::Card, transaction.card()),
            (EntityType::Ip, transaction.ip_address()),
            (EntityType::Device, transaction.device_id()),
        ];

        for (entity_type, value) in candidates {
            let Some(value) = value else { continue };
            if self.blacklist_store.is_blacklisted(entity_type.as_str(), value)? {
                return Ok(Some(entity_type));
            }
        }

        Ok(None)
    }

    fn find_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        match self.profile_store.get_user_profile(user_id) {
            Ok(profile) => Ok(Some(profile)),
            Err(FraudError::ProfileNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn blocked_result(
    transaction: &Transaction,
    entity_type: EntityType,
    start: Instant,
) -> FraudAnalysisResult {
    FraudAnalysisResult {
        transaction_id: transaction.transaction_id.clone(),
        risk_score: MAX_RISK_SCORE,
        risk_level: RiskLevel::High,
        decision: Decision::Blocked,
        reasons: vec![BLACKLIST_REASON.to_string()],
        rules_triggered: vec![BLACKLIST_RULE_NAME.to_string()],
        details: Details::from([
            ("blocked_reason".to_string(), json!(BLACKLIST_REASON)),
            ("entity_type".to_string(), json!(entity_type)),
        ]),
        analyzed_at: Utc::now(),
        processing_time_ms: elapsed_ms(start),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BlacklistEntry, DeviceInfo, FraudIncident, InMemoryBlacklistStore, InMemoryProfileStore,
        Location,
    };
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sao_paulo() -> Location {
        Location::new("BR", "São Paulo", -23.5505, -46.6333)
    }

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, hour, 0, 0).unwrap()
    }

    fn create_test_transaction(user_id: &str, amount: f64, hour: u32) -> Transaction {
        Transaction::new(user_id, amount, "BRL", "Mercado Livre", sao_paulo())
            .with_id("TXN-001")
            .with_timestamp(at_hour(hour))
    }

    fn established_profile(user_id: &str, last_at: DateTime<Utc>) -> UserProfile {
        let mut profile = UserProfile::new(user_id);
        profile.avg_transaction_value = 450.0;
        profile.total_transactions = 200;
        profile.first_transaction_at = Some(last_at - Duration::days(365));
        profile.last_transaction_at = Some(last_at);
        profile.common_locations.push(sao_paulo());
        profile
    }

    struct Fixture {
        profiles: Arc<InMemoryProfileStore>,
        blacklist: Arc<InMemoryBlacklistStore>,
        service: FraudDecisionService,
    }

    fn fixture() -> Fixture {
        let profiles = Arc::new(InMemoryProfileStore::new());
        let blacklist = Arc::new(InMemoryBlacklistStore::new());
        let service = FraudDecisionService::new(profiles.clone(), blacklist.clone());
        Fixture {
            profiles,
            blacklist,
            service,
        }
    }

    /// Profile store that fails every call and counts them
    #[derive(Default)]
    struct UnavailableProfileStore {
        calls: AtomicUsize,
    }

    impl ProfileStore for UnavailableProfileStore {
        fn get_user_profile(&self, _user_id: &str) -> Result<UserProfile> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FraudError::StoreUnavailable("connection refused".to_string()))
        }

        fn update_user_profile(&self, _profile: UserProfile) -> Result<()> {
            Err(FraudError::StoreUnavailable("connection refused".to_string()))
        }
    }

    struct UnavailableBlacklistStore;

    impl BlacklistStore for UnavailableBlacklistStore {
        fn is_blacklisted(&self, _entity_type: &str, _value: &str) -> Result<bool> {
            Err(FraudError::StoreUnavailable("timeout".to_string()))
        }

        fn add(&self, _entry: BlacklistEntry) -> Result<()> {
            Err(FraudError::StoreUnavailable("timeout".to_string()))
        }
    }

    #[test]
    fn test_new_user_high_value() {
        let f = fixture();
        let result = f
            .service
            .analyze_transaction(create_test_transaction("USER-NEW", 3_500.0, 14))
            .unwrap();

        assert_eq!(result.risk_score, 15);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.decision, Decision::Approved);
        assert_eq!(result.rules_triggered, vec!["New User High Transaction"]);
        assert_eq!(result.reasons.len(), result.rules_triggered.len());
    }

    #[test]
    fn test_low_score_boundary() {
        let f = fixture();
        let tx = create_test_transaction("USER-001", 15_000.0, 2);
        f.profiles
            .update_user_profile(established_profile("USER-001", at_hour(2) - Duration::days(10)))
            .unwrap();

        let result = f.service.analyze_transaction(tx).unwrap();
        assert_eq!(result.risk_score, 30);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.decision, Decision::Approved);
        assert_eq!(
            result.rules_triggered,
            vec![
                "High Amount Transaction",
                "Unusual Hour Transaction",
                "Suspicious Round Amount"
            ]
        );
        assert_eq!(result.details["user_id"], "USER-001");
    }

    #[test]
    fn test_blacklisted_user_is_blocked() {
        let f = fixture();
        f.blacklist
            .add(BlacklistEntry::new("user", "BLOCKED_USER_123", "Confirmed fraud"))
            .unwrap();

        for amount in [1.0, 3_500.0, 75_000.0] {
            let result = f
                .service
                .analyze_transaction(create_test_transaction("BLOCKED_USER_123", amount, 3))
                .unwrap();
            assert_eq!(result.risk_score, 100);
            assert_eq!(result.risk_level, RiskLevel::High);
            assert_eq!(result.decision, Decision::Blocked);
            assert_eq!(result.reasons, vec![BLACKLIST_REASON]);
            assert_eq!(result.rules_triggered, vec![BLACKLIST_RULE_NAME]);
            assert_eq!(result.details["entity_type"], "user");
        }
    }

    #[test]
    fn test_blacklisted_card_ip_and_device() {
        let f = fixture();
        f.blacklist.add(BlacklistEntry::new("card", "4567", "Stolen")).unwrap();
        f.blacklist
            .add(BlacklistEntry::new("ip", "192.168.1.100", "Fraud ring"))
            .unwrap();
        f.blacklist
            .add(BlacklistEntry::new("device", "device-bad", "Emulator"))
            .unwrap();

        let card = create_test_transaction("USER-1", 10.0, 14).with_card("4567", "visa");
        let mut ip = create_test_transaction("USER-2", 10.0, 14);
        ip.location = sao_paulo().with_ip("192.168.1.100");
        let device = create_test_transaction("USER-3", 10.0, 14).with_device(DeviceInfo {
            device_id: "device-bad".to_string(),
            device_type: "mobile".to_string(),
            os: "Android".to_string(),
            ..Default::default()
        });

        for (tx, entity) in [(card, "card"), (ip, "ip"), (device, "device")] {
            let result = f.service.analyze_transaction(tx).unwrap();
            assert!(result.is_blocked());
            assert_eq!(result.details["entity_type"], entity);
        }
    }

    #[test]
    fn test_blacklist_order_is_user_first() {
        let f = fixture();
        f.blacklist.add(BlacklistEntry::new("user", "USER-1", "Fraud")).unwrap();
        f.blacklist.add(BlacklistEntry::new("card", "4567", "Stolen")).unwrap();

        let tx = create_test_transaction("USER-1", 10.0, 14).with_card("4567", "visa");
        let result = f.service.analyze_transaction(tx).unwrap();
        assert_eq!(result.details["entity_type"], "user");
    }

    #[test]
    fn test_blacklist_skips_profile_lookup() {
        let blacklist = Arc::new(InMemoryBlacklistStore::new());
        blacklist.add(BlacklistEntry::new("user", "USER-1", "Fraud")).unwrap();
        let profiles = Arc::new(UnavailableProfileStore::default());
        let service = FraudDecisionService::new(profiles.clone(), blacklist);

        let result = service
            .analyze_transaction(create_test_transaction("USER-1", 10.0, 14))
            .unwrap();
        assert!(result.is_blocked());
        assert_eq!(profiles.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_inactive_or_expired_entries_do_not_block() {
        let f = fixture();
        f.blacklist
            .add(BlacklistEntry::new("user", "USER-1", "Lifted").inactive())
            .unwrap();
        f.blacklist
            .add(
                BlacklistEntry::new("card", "4567", "Old")
                    .expiring_at(Utc::now() - Duration::hours(1)),
            )
            .unwrap();

        let tx = create_test_transaction("USER-1", 100.0, 14).with_card("4567", "visa");
        let result = f.service.analyze_transaction(tx).unwrap();
        assert_eq!(result.decision, Decision::Approved);
        assert!(result.rules_triggered.is_empty());
    }

    #[test]
    fn test_impossible_travel() {
        let f = fixture();
        f.profiles
            .update_user_profile(established_profile("USER-001", at_hour(13)))
            .unwrap();

        let mut tx = create_test_transaction("USER-001", 200.0, 14);
        tx.location = Location::new("GB", "London", 51.5074, -0.1278);

        let result = f.service.analyze_transaction(tx).unwrap();
        assert_eq!(result.risk_score, 30);
        assert_eq!(result.rules_triggered, vec!["Geographical Velocity"]);
    }

    #[test]
    fn test_high_risk_combination() {
        let f = fixture();
        f.profiles
            .update_user_profile(established_profile("USER-001", at_hour(2) - Duration::minutes(1)))
            .unwrap();

        let mut tx = create_test_transaction("USER-001", 60_000.0, 2);
        tx.location = Location::new("JP", "Tokyo", 35.6762, 139.6503);

        // 25 + 20 + 30 + 10 + 5
        let result = f.service.analyze_transaction(tx).unwrap();
        assert_eq!(result.risk_score, 90);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.decision, Decision::Blocked);
        assert_eq!(result.rules_triggered.len(), 5);
        assert_eq!(result.reasons.len(), 5);
    }

    #[test]
    fn test_review_band() {
        let f = fixture();
        f.profiles
            .update_user_profile(established_profile("USER-001", at_hour(13)))
            .unwrap();

        let mut tx = create_test_transaction("USER-001", 12_500.0, 14);
        tx.location = Location::new("GB", "London", 51.5074, -0.1278);

        // 15 + 30
        let result = f.service.analyze_transaction(tx).unwrap();
        assert_eq!(result.risk_score, 45);
        assert!(result.requires_review());
    }

    #[test]
    fn test_missing_timestamp_is_stamped() {
        let f = fixture();
        let tx = Transaction::new("USER-NEW", 50.0, "USD", "Store", sao_paulo());
        let result = f.service.analyze_transaction(tx).unwrap();
        assert!(result.risk_score <= 100);
        assert!(result.transaction_id.starts_with("TXN-"));
    }

    #[test]
    fn test_identical_inputs_identical_results() {
        let f = fixture();
        f.profiles
            .update_user_profile(established_profile("USER-001", at_hour(1)))
            .unwrap();
        let tx = create_test_transaction("USER-001", 20_000.0, 2);

        let first = f.service.analyze_transaction(tx.clone()).unwrap();
        let second = f.service.analyze_transaction(tx).unwrap();
        assert_eq!(first.risk_score, second.risk_score);
        assert_eq!(first.decision, second.decision);
        assert_eq!(first.reasons, second.reasons);
        assert_eq!(first.rules_triggered, second.rules_triggered);
        assert_eq!(first.details, second.details);
    }

    #[test]
    fn test_profile_store_failure_is_propagated() {
        let service = FraudDecisionService::new(
            Arc::new(UnavailableProfileStore::default()),
            Arc::new(InMemoryBlacklistStore::new()),
        );

        let err = service
            .analyze_transaction(create_test_transaction("USER-1", 10.0, 14))
            .unwrap_err();
        assert!(matches!(err, FraudError::StoreUnavailable(_)));

        let err = service.get_transaction_analytics("USER-1").unwrap_err();
        assert!(matches!(err, FraudError::StoreUnavailable(_)));
    }

    #[test]
    fn test_blacklist_store_failure_is_propagated() {
        let service = FraudDecisionService::new(
            Arc::new(InMemoryProfileStore::new()),
            Arc::new(UnavailableBlacklistStore),
        );

        let err = service
            .analyze_transaction(create_test_transaction("USER-1", 10.0, 14))
            .unwrap_err();
        assert_eq!(err, FraudError::StoreUnavailable("timeout".to_string()));
    }

    #[test]
    fn test_analytics_for_unknown_user() {
        let f = fixture();
        let analytics = f.service.get_transaction_analytics("USER-NONE").unwrap();
        assert_eq!(analytics, TransactionAnalytics::empty("USER-NONE"));
        assert_eq!(analytics.fraud_rate, 0.0);
    }

    #[test]
    fn test_analytics_fraud_rate() {
        let f = fixture();
        let mut profile = established_profile("USER-001", at_hour(12));
        profile.total_transactions = 40;
        for n in 0..2 {
            profile.fraud_history.push(FraudIncident {
                incident_id: format!("INC-{n}"),
                transaction_id: format!("TXN-{n}"),
                detected_at: at_hour(10),
                confirmed_fraud: true,
                amount: 900.0,
                description: "Chargeback".to_string(),
            });
        }
        f.profiles.update_user_profile(profile).unwrap();

        let analytics = f.service.get_transaction_analytics("USER-001").unwrap();
        assert_eq!(analytics.total_transactions, 40);
        assert_eq!(analytics.fraud_count, 2);
        assert!((analytics.fraud_rate - 5.0).abs() < 1e-9);
        assert_eq!(analytics.average_amount, 450.0);
        assert_eq!(analytics.last_transaction_at, Some(at_hour(12)));
    }

    #[test]
    fn test_analytics_without_transactions() {
        let mut profile = UserProfile::new("USER-001");
        profile.fraud_history.push(FraudIncident {
            incident_id: "INC-1".to_string(),
            transaction_id: "TXN-1".to_string(),
            detected_at: at_hour(10),
            confirmed_fraud: false,
            amount: 10.0,
            description: "Disputed".to_string(),
        });

        let analytics = TransactionAnalytics::from_profile(&profile);
        assert_eq!(analytics.fraud_count, 1);
        assert_eq!(analytics.fraud_rate, 0.0);
    }
}
