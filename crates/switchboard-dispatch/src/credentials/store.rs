//! Credential store seam
//!
//! Persistence lives outside this crate: the gateway decides whether
//! profiles sit in a JSON file, a keychain, or a database. This layer only
//! needs an ordered view and a way to persist a new order.

use super::profile::CredentialProfile;
use crate::error::DispatchResult;
use parking_lot::RwLock;
use std::collections::HashMap;

/// External storage for credential profiles.
///
/// Implementations are synchronous: the resolver runs on the dispatch hot
/// path and must not suspend. Stores backed by real I/O keep an in-memory
/// view and write behind.
pub trait ProfileStore: Send + Sync {
    /// Profiles for a provider in rotation order; the first is active.
    /// Unknown providers yield an empty list, not an error.
    fn ordered_profiles(&self, provider: &str) -> DispatchResult<Vec<CredentialProfile>>;

    /// Persist a new rotation order (profile ids, front first) for a provider
    fn persist_order(&self, provider: &str, order: &[String]) -> DispatchResult<()>;
}

/// In-memory profile store for tests and single-process embedders
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<String, Vec<CredentialProfile>>>,
}

impl InMemoryProfileStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
        }
    }

    /// Append a profile to its provider's rotation
    pub fn insert(&self, profile: CredentialProfile) {
        self.profiles
            .write()
            .entry(profile.provider.clone())
            .or_default()
            .push(profile);
    }
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn ordered_profiles(&self, provider: &str) -> DispatchResult<Vec<CredentialProfile>> {
        Ok(self
            .profiles
            .read()
            .get(provider)
            .cloned()
            .unwrap_or_default())
    }

    fn persist_order(&self, provider: &str, order: &[String]) -> DispatchResult<()> {
        let mut profiles = self.profiles.write();
        if let Some(list) = profiles.get_mut(provider) {
            // Stable sort: listed ids take their given positions, anything
            // unlisted keeps its relative order at the back.
            list.sort_by_key(|profile| {
                order
                    .iter()
                    .position(|id| id == &profile.profile_id)
                    .unwrap_or(usize::MAX)
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::profile::CredentialKind;

    fn profile(id: &str) -> CredentialProfile {
        CredentialProfile::new("anthropic", id, CredentialKind::ApiKey, "sk-ant-test")
    }

    #[test]
    fn unknown_provider_yields_empty_list() {
        let store = InMemoryProfileStore::new();
        assert!(store.ordered_profiles("anthropic").unwrap().is_empty());
    }

    #[test]
    fn insert_preserves_insertion_order() {
        let store = InMemoryProfileStore::new();
        store.insert(profile("anthropic:default"));
        store.insert(profile("anthropic:backup"));

        let ids: Vec<String> = store
            .ordered_profiles("anthropic")
            .unwrap()
            .into_iter()
            .map(|p| p.profile_id)
            .collect();
        assert_eq!(ids, vec!["anthropic:default", "anthropic:backup"]);
    }

    #[test]
    fn persist_order_reorders_profiles() {
        let store = InMemoryProfileStore::new();
        store.insert(profile("a"));
        store.insert(profile("b"));
        store.insert(profile("c"));

        store
            .persist_order("anthropic", &["c".to_string(), "a".to_string(), "b".to_string()])
            .unwrap();

        let ids: Vec<String> = store
            .ordered_profiles("anthropic")
            .unwrap()
            .into_iter()
            .map(|p| p.profile_id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
