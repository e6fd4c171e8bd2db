//! Credential profile types and classification

use serde::{Deserialize, Serialize};

/// Anthropic OAuth access tokens carry this prefix; they bill against a
/// subscription rather than metered API usage.
const ANTHROPIC_OAUTH_PREFIX: &str = "sk-ant-oat";
const ANTHROPIC_API_KEY_PREFIX: &str = "sk-ant-";
const OPENAI_API_KEY_PREFIX: &str = "sk-";

/// How a credential authenticates against the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialKind {
    /// OAuth access token (subscription billing)
    #[serde(rename = "oauth")]
    OAuth,
    /// Raw bearer token
    #[serde(rename = "token")]
    Token,
    /// Plain API key (metered billing)
    #[serde(rename = "api_key")]
    ApiKey,
}

impl std::fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OAuth => write!(f, "oauth"),
            Self::Token => write!(f, "token"),
            Self::ApiKey => write!(f, "api_key"),
        }
    }
}

/// A stored credential profile for one provider.
///
/// Profiles live in an external store in rotation order; the first profile
/// for a provider is the active one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialProfile {
    /// Provider this profile authenticates against
    pub provider: String,
    /// Stable identifier, e.g. `"anthropic:default"`
    pub profile_id: String,
    /// Authentication mode
    pub kind: CredentialKind,
    /// The secret itself. Never log this; use [`mask_secret`].
    pub secret: String,
    /// Optional subscription-tier note, e.g. `"Max"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_hint: Option<String>,
}

impl CredentialProfile {
    /// Create a new profile
    pub fn new(
        provider: impl Into<String>,
        profile_id: impl Into<String>,
        kind: CredentialKind,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            profile_id: profile_id.into(),
            kind,
            secret: secret.into(),
            billing_hint: None,
        }
    }

    /// Set the billing hint
    pub fn with_billing_hint(mut self, hint: impl Into<String>) -> Self {
        self.billing_hint = Some(hint.into());
        self
    }
}

/// Result of classifying a bare credential string
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialHint {
    pub kind: CredentialKind,
    pub billing_hint: Option<String>,
}

/// Classify a raw credential string by its literal prefix.
///
/// Deployments sometimes inject a bare key through an environment variable
/// with no profile record behind it; this is how such keys get a kind and a
/// billing hint. The heuristic degrades to `ApiKey` with no hint for shapes
/// it does not recognize — it never errors.
pub fn classify_credential(provider: &str, raw_key: &str) -> CredentialHint {
    if raw_key.starts_with(ANTHROPIC_OAUTH_PREFIX) {
        let billing_hint = if provider == "anthropic" {
            Some("Max".to_string())
        } else {
            None
        };
        return CredentialHint {
            kind: CredentialKind::OAuth,
            billing_hint,
        };
    }
    if raw_key.starts_with(ANTHROPIC_API_KEY_PREFIX) || raw_key.starts_with(OPENAI_API_KEY_PREFIX) {
        return CredentialHint {
            kind: CredentialKind::ApiKey,
            billing_hint: None,
        };
    }
    if looks_like_jwt(raw_key) {
        return CredentialHint {
            kind: CredentialKind::Token,
            billing_hint: None,
        };
    }
    CredentialHint {
        kind: CredentialKind::ApiKey,
        billing_hint: None,
    }
}

// Base64url JSON header plus two dot separators.
fn looks_like_jwt(raw_key: &str) -> bool {
    raw_key.starts_with("eyJ") && raw_key.bytes().filter(|b| *b == b'.').count() == 2
}

/// Mask a secret for logs and diagnostics, keeping just enough of the
/// prefix and suffix to identify it.
///
/// Counts characters rather than bytes: secrets are arbitrary operator
/// input and slicing a multibyte character in half would panic on the
/// logging path.
pub fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    if len <= 12 {
        return "*".repeat(len);
    }

    let prefix: String = secret.chars().take(8).collect();
    let suffix: String = secret.chars().skip(len - 4).collect();
    let mask_len = len - 12;

    format!("{}{}...{}", prefix, "*".repeat(mask_len.min(8)), suffix)
}
