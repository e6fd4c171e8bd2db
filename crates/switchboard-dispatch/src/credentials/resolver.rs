//! Credential rotation and resolution
//!
//! The stored profile order IS the rotation state: the first profile for a
//! provider is the active one, and switching profiles means moving the chosen
//! one to the front. No separate "active" pointer exists to drift out of
//! sync with the list.

use super::profile::{classify_credential, mask_secret, CredentialKind, CredentialProfile};
use super::store::ProfileStore;
use crate::error::DispatchResult;
use serde::Serialize;
use std::env;
use std::sync::Arc;
use tracing::{debug, info};

/// Where a resolved credential came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CredentialSource {
    /// A stored profile, by id
    Profile { profile_id: String },
    /// Environment variable fallback
    Environment { var_name: String },
}

/// A credential ready to authenticate a dispatch
#[derive(Clone)]
pub struct ResolvedCredential {
    pub provider: String,
    pub kind: CredentialKind,
    pub secret: String,
    pub billing_hint: Option<String>,
    pub source: CredentialSource,
}

// Manual Debug so a stray `{:?}` can never leak the secret into logs.
impl std::fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("provider", &self.provider)
            .field("kind", &self.kind)
            .field("secret", &mask_secret(&self.secret))
            .field("billing_hint", &self.billing_hint)
            .field("source", &self.source)
            .finish()
    }
}

/// Resolves and rotates credentials for providers
pub struct CredentialResolver {
    store: Arc<dyn ProfileStore>,
}

impl CredentialResolver {
    /// Create a resolver over a profile store
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Ordered profile ids for a provider; the first is active
    pub fn list_profiles(&self, provider: &str) -> DispatchResult<Vec<String>> {
        Ok(self
            .store
            .ordered_profiles(provider)?
            .into_iter()
            .map(|profile| profile.profile_id)
            .collect())
    }

    /// The currently active profile, if any are stored
    pub fn active_profile(&self, provider: &str) -> DispatchResult<Option<CredentialProfile>> {
        Ok(self.store.ordered_profiles(provider)?.into_iter().next())
    }

    /// Make a profile active by moving it to the front of the rotation.
    ///
    /// The relative order of the remaining profiles is preserved and nothing
    /// is ever deleted. An unknown id is a normal negative outcome and
    /// returns `Ok(false)` with the order untouched; only a store failure is
    /// an error.
    pub fn set_active_profile(&self, provider: &str, profile_id: &str) -> DispatchResult<bool> {
        let mut order: Vec<String> = self
            .store
            .ordered_profiles(provider)?
            .into_iter()
            .map(|profile| profile.profile_id)
            .collect();

        let Some(position) = order.iter().position(|id| id == profile_id) else {
            debug!("Profile {} not found for {}, rotation unchanged", profile_id, provider);
            return Ok(false);
        };
        if position != 0 {
            let id = order.remove(position);
            order.insert(0, id);
            self.store.persist_order(provider, &order)?;
        }
        info!("Rotated {} to active credential profile {}", provider, profile_id);
        Ok(true)
    }

    /// Resolve the credential to dispatch with: the active stored profile if
    /// one exists, otherwise the provider's conventional environment
    /// variable, classified by its literal prefix. `Ok(None)` means the
    /// provider has no credential at all.
    pub fn resolve(&self, provider: &str) -> DispatchResult<Option<ResolvedCredential>> {
        if let Some(profile) = self.store.ordered_profiles(provider)?.into_iter().next() {
            debug!(
                "Resolved {} credential from profile {} ({})",
                provider, profile.profile_id, profile.kind
            );
            return Ok(Some(ResolvedCredential {
                provider: provider.to_string(),
                kind: profile.kind,
                secret: profile.secret,
                billing_hint: profile.billing_hint,
                source: CredentialSource::Profile {
                    profile_id: profile.profile_id,
                },
            }));
        }

        for var_name in standard_env_vars(provider) {
            match env::var(&var_name) {
                Ok(key) if !key.is_empty() => {
                    let hint = classify_credential(provider, &key);
                    debug!(
                        "Resolved {} credential from environment variable {} ({})",
                        provider, var_name, hint.kind
                    );
                    return Ok(Some(ResolvedCredential {
                        provider: provider.to_string(),
                        kind: hint.kind,
                        secret: key,
                        billing_hint: hint.billing_hint,
                        source: CredentialSource::Environment { var_name },
                    }));
                }
                _ => {}
            }
        }

        debug!("No credential found for {}", provider);
        Ok(None)
    }
}

/// Conventional environment variables for a provider's bare key
fn standard_env_vars(provider: &str) -> Vec<String> {
    match provider {
        "anthropic" => vec!["ANTHROPIC_API_KEY".to_string()],
        "openai" => vec!["OPENAI_API_KEY".to_string()],
        "google" => vec!["GOOGLE_API_KEY".to_string(), "GEMINI_API_KEY".to_string()],
        _ => vec![format!("{}_API_KEY", provider.to_uppercase().replace('-', "_"))],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::store::InMemoryProfileStore;

    fn store_with_profiles(ids: &[&str]) -> Arc<InMemoryProfileStore> {
        let store = Arc::new(InMemoryProfileStore::new());
        for id in ids {
            store.insert(CredentialProfile::new(
                "anthropic",
                *id,
                CredentialKind::ApiKey,
                format!("sk-ant-api03-{id}"),
            ));
        }
        store
    }

    #[test]
    fn first_profile_is_active() {
        let resolver = CredentialResolver::new(store_with_profiles(&["a", "b", "c"]));
        let active = resolver.active_profile("anthropic").unwrap().unwrap();
        assert_eq!(active.profile_id, "a");
    }

    #[test]
    fn set_active_moves_to_front_and_preserves_relative_order() {
        let store = store_with_profiles(&["a", "b", "c", "d"]);
        let resolver = CredentialResolver::new(store.clone());

        assert!(resolver.set_active_profile("anthropic", "c").unwrap());
        assert_eq!(
            resolver.list_profiles("anthropic").unwrap(),
            vec!["c", "a", "b", "d"]
        );

        // Persisted through the store, not just cached in the resolver.
        let stored: Vec<String> = store
            .ordered_profiles("anthropic")
            .unwrap()
            .into_iter()
            .map(|p| p.profile_id)
            .collect();
        assert_eq!(stored, vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn unknown_profile_id_returns_false_and_changes_nothing() {
        let resolver = CredentialResolver::new(store_with_profiles(&["a", "b"]));

        assert!(!resolver.set_active_profile("anthropic", "missing").unwrap());
        assert_eq!(resolver.list_profiles("anthropic").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn rotating_the_already_active_profile_is_a_no_op() {
        let resolver = CredentialResolver::new(store_with_profiles(&["a", "b"]));
        assert!(resolver.set_active_profile("anthropic", "a").unwrap());
        assert_eq!(resolver.list_profiles("anthropic").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn resolve_prefers_the_stored_profile() {
        let resolver = CredentialResolver::new(store_with_profiles(&["a"]));
        let credential = resolver.resolve("anthropic").unwrap().unwrap();
        assert_eq!(credential.secret, "sk-ant-api03-a");
        assert_eq!(
            credential.source,
            CredentialSource::Profile {
                profile_id: "a".to_string()
            }
        );
    }

    #[test]
    fn resolve_falls_back_to_environment() {
        // Provider name unique to this test so parallel tests cannot race on
        // the same variable.
        unsafe {
            env::set_var("ENVFALLBACK_API_KEY", "sk-ant-oat01-envkey123456");
        }

        let resolver = CredentialResolver::new(Arc::new(InMemoryProfileStore::new()));
        let credential = resolver.resolve("envfallback").unwrap().unwrap();
        assert_eq!(credential.kind, CredentialKind::OAuth);
        assert_eq!(
            credential.source,
            CredentialSource::Environment {
                var_name: "ENVFALLBACK_API_KEY".to_string()
            }
        );

        unsafe {
            env::remove_var("ENVFALLBACK_API_KEY");
        }
    }

    #[test]
    fn resolve_with_nothing_configured_is_none() {
        let resolver = CredentialResolver::new(Arc::new(InMemoryProfileStore::new()));
        assert!(resolver.resolve("nocredsprov").unwrap().is_none());
    }

    #[test]
    fn debug_output_masks_the_secret() {
        let credential = ResolvedCredential {
            provider: "anthropic".to_string(),
            kind: CredentialKind::ApiKey,
            secret: "sk-ant-api03-abc123xyz789".to_string(),
            billing_hint: None,
            source: CredentialSource::Profile {
                profile_id: "anthropic:default".to_string(),
            },
        };
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("abc123xyz789"));
        assert!(rendered.contains("sk-ant-a"));
    }
}
