//! Fraud decisioning example
//!
//! Seeds an in-memory profile and blacklist store, then runs a handful of
//! transactions through the decision service: a regular purchase, a new user,
//! impossible travel, a blacklisted card and a late-night burst.
//!
//! Run with `RUST_LOG=fraud_decision_engine=debug` to see individual rule hits.

use chrono::{Duration, Utc};
use fraud_decision_engine::{
    BlacklistEntry, BlacklistStore, DeviceInfo, FraudAnalysisResult, FraudDecisionService,
    InMemoryBlacklistStore, InMemoryProfileStore, Location, ProfileStore, RuleConfig, RuleEngine,
    Transaction, UserProfile,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn sao_paulo() -> Location {
    Location::new("BR", "São Paulo", -23.5505, -46.6333)
}

fn sample_profile(user_id: &str) -> UserProfile {
    let now = Utc::now();
    let mut profile = UserProfile::new(user_id);
    profile.avg_transaction_value = 500.0;
    profile.total_transactions = 150;
    profile.first_transaction_at = Some(now - Duration::days(180));
    profile.last_transaction_at = Some(now - Duration::hours(1));
    profile.common_locations = vec![
        Location::new("BR", "Rio de Janeiro", -22.9068, -43.1729),
        sao_paulo(),
    ];
    profile.common_merchants = ["Amazon", "Mercado Livre", "iFood"]
        .into_iter()
        .map(String::from)
        .collect();
    profile.trusted_devices.insert("device-001".to_string());
    profile
}

fn seed_sample_blacklist(store: &dyn BlacklistStore) -> fraud_decision_engine::Result<()> {
    store.add(BlacklistEntry::new(
        "user",
        "BLOCKED_USER_123",
        "Multiple confirmed fraud attempts",
    ))?;
    store.add(BlacklistEntry::new("card", "4567", "Card reported stolen"))?;
    store.add(BlacklistEntry::new(
        "ip",
        "192.168.1.100",
        "IP linked to fraudulent activity",
    ))?;
    Ok(())
}

fn print_result(result: &FraudAnalysisResult) {
    println!("   Transaction ID: {}", result.transaction_id);
    println!("   Risk Score: {}/100", result.risk_score);
    println!("   Risk Level: {}", result.risk_level);
    println!("   Decision: {}", result.decision);
    println!("   Rules Triggered: {:?}", result.rules_triggered);
    println!("   Reasons: {:?}", result.reasons);
    println!("   Processing Time: {}ms", result.processing_time_ms);
    println!();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("fraud_decision_engine=info".parse()?),
        )
        .init();

    println!("=== Fraud Decision Engine ===\n");

    let profiles = Arc::new(InMemoryProfileStore::new());
    let blacklist = Arc::new(InMemoryBlacklistStore::new());
    profiles.update_user_profile(sample_profile("USER-001"))?;
    seed_sample_blacklist(blacklist.as_ref())?;

    let config =
        RuleConfig::from_json(r#"{"velocity_window_minutes": 5, "night_start_hour": 23}"#)?;
    let engine = RuleEngine::with_config(&config)?;
    let service = FraudDecisionService::with_engine(engine, profiles.clone(), blacklist.clone());

    println!("Registered rules:");
    for rule in service.rule_engine().rules() {
        let state = if rule.is_enabled() { "enabled" } else { "disabled" };
        println!("   {:<32} weight {:>2}  {}", rule.name(), rule.weight(), state);
    }
    println!();

    // Example 1: Regular purchase from a known user
    println!("1. Regular Purchase");
    let regular = Transaction::new("USER-001", 129.90, "BRL", "Amazon", sao_paulo())
        .with_timestamp(Utc::now())
        .with_device(DeviceInfo {
            device_id: "device-001".to_string(),
            device_type: "mobile".to_string(),
            os: "iOS".to_string(),
            browser: Some("Safari".to_string()),
            ..Default::default()
        });
    print_result(&service.analyze_transaction(regular)?);

    // Example 2: First purchase from an unknown user
    println!("2. New User High Value");
    let new_user = Transaction::new("USER-NEW", 3_500.0, "BRL", "Magazine Luiza", sao_paulo());
    print_result(&service.analyze_transaction(new_user)?);

    // Example 3: Same user an hour later, on another continent
    println!("3. Impossible Travel");
    let london = Location::new("GB", "London", 51.5074, -0.1278).with_ip("81.2.69.142");
    let travel = Transaction::new("USER-001", 850.0, "GBP", "Harrods", london)
        .with_timestamp(Utc::now());
    print_result(&service.analyze_transaction(travel)?);

    // Example 4: Stolen card
    println!("4. Blacklisted Card");
    let stolen = Transaction::new("USER-777", 45.0, "BRL", "iFood", sao_paulo())
        .with_card("4567", "visa");
    print_result(&service.analyze_transaction(stolen)?);

    // Example 5: Large round amount in the middle of the night
    println!("5. Large Round Amount at Night");
    let night = Utc::now()
        .date_naive()
        .and_hms_opt(3, 0, 0)
        .map(|t| t.and_utc())
        .unwrap_or_else(Utc::now);
    let large = Transaction::new("USER-NIGHT", 60_000.0, "USD", "Crypto Exchange", sao_paulo())
        .with_timestamp(night);
    let result = service.analyze_transaction(large)?;
    print_result(&result);
    println!("   JSON:\n{}\n", result.to_json()?);

    // Analytics
    println!("6. User Analytics");
    for user_id in ["USER-001", "USER-UNKNOWN"] {
        let analytics = service.get_transaction_analytics(user_id)?;
        println!(
            "   {}: {} transactions, avg {:.2}, fraud rate {:.1}%",
            analytics.user_id,
            analytics.total_transactions,
            analytics.average_amount,
            analytics.fraud_rate
        );
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
