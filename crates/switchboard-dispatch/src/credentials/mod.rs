//! Credential profiles, rotation, and resolution
//!
//! Providers can hold several credential profiles (OAuth tokens, bearer
//! tokens, plain API keys) in an externally-stored rotation order; the first
//! profile is the active one. Rotation moves a profile to the front of the
//! order and persists it, switching e.g. a model's billing from a rate-limited
//! subscription token to a metered API key without restarting the gateway.

mod profile;
mod resolver;
mod store;

pub use profile::{
    classify_credential, mask_secret, CredentialHint, CredentialKind, CredentialProfile,
};
pub use resolver::{CredentialResolver, CredentialSource, ResolvedCredential};
pub use store::{InMemoryProfileStore, ProfileStore};
