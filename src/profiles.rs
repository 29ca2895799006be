//! User profile storage

use crate::{FraudError, Result, UserProfile};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Storage for user behavioural profiles.
///
/// A missing profile is reported as [`FraudError::ProfileNotFound`], which callers treat as
/// a new user. Durable backends report failures as [`FraudError::StoreUnavailable`].
pub trait ProfileStore: Send + Sync {
    fn get_user_profile(&self, user_id: &str) -> Result<UserProfile>;

    /// Replace the stored profile for `profile.user_id`
    fn update_user_profile(&self, profile: UserProfile) -> Result<()>;
}

/// In-memory profile store guarded by a single reader-writer lock
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored profiles
    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn get_user_profile(&self, user_id: &str) -> Result<UserProfile> {
        self.profiles
            .read()
            .get(user_id)
            .cloned()
            .ok_or_else(|| FraudError::ProfileNotFound(user_id.to_string()))
    }

    fn update_user_profile(&self, profile: UserProfile) -> Result<()> {
        self.profiles.write().insert(profile.user_id.clone(), profile);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Location;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_missing_profile() {
        let store = InMemoryProfileStore::new();
        let err = store.get_user_profile("USER-404").unwrap_err();
        assert_eq!(err, FraudError::ProfileNotFound("USER-404".to_string()));
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_replaces_profile() {
        let store = InMemoryProfileStore::new();

        let mut profile = UserProfile::new("USER-001");
        profile.total_transactions = 10;
        profile
            .common_locations
            .push(Location::new("BR", "São Paulo", -23.5505, -46.6333));
        store.update_user_profile(profile).unwrap();

        // Full replace: the new profile carries no locations
        let mut replacement = UserProfile::new("USER-001");
        replacement.total_transactions = 11;
        store.update_user_profile(replacement).unwrap();

        let stored = store.get_user_profile("USER-001").unwrap();
        assert_eq!(stored.total_transactions, 11);
        assert!(stored.common_locations.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let store = Arc::new(InMemoryProfileStore::new());

        thread::scope(|scope| {
            for writer in 0..4u64 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for n in 0..100u64 {
                        let mut profile = UserProfile::new("USER-SHARED");
                        profile.total_transactions = writer * 1000 + n;
                        profile.avg_transaction_value = (writer * 1000 + n) as f64;
                        store.update_user_profile(profile).unwrap();
                    }
                });
            }
            for _ in 0..4 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for _ in 0..100 {
                        if let Ok(profile) = store.get_user_profile("USER-SHARED") {
                            // A reader never sees half of one write and half of another
                            assert_eq!(
                                profile.avg_transaction_value,
                                profile.total_transactions as f64
                            );
                        }
                    }
                });
            }
        });

        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reader_panic_does_not_poison() {
        let store = Arc::new(InMemoryProfileStore::new());
        store.update_user_profile(UserProfile::new("USER-001")).unwrap();

        let reader = Arc::clone(&store);
        let outcome = thread::spawn(move || {
            let _guard = reader.profiles.read();
            panic!("reader died holding the lock");
        })
        .join();
        assert!(outcome.is_err());

        assert!(store.get_user_profile("USER-001").is_ok());
        store.update_user_profile(UserProfile::new("USER-002")).unwrap();
        assert_eq!(store.len(), 2);
    }
}
