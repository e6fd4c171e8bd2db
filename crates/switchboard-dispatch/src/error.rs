//! Error types for the dispatch layer.
//!
//! Admission denials are ordinary values for the components that produce them
//! (breakers answer with booleans, the budget tracker with a status struct);
//! only the gate converts a denial into a typed error, and only the health
//! cache raises one of its own accord. This keeps the leaf components usable
//! as advisory state machines while giving callers a single error enum to
//! match on.

use thiserror::Error;

/// Result type alias for dispatch-layer operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Error type for the dispatch layer
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// A provider circuit breaker refused the call
    #[error("Circuit open for provider '{provider}' after {failures} consecutive failures")]
    CircuitOpen { provider: String, failures: u32 },

    /// The daily cost budget for a key is exhausted
    #[error("Daily budget exhausted for '{key}': spent {spent_cents} of {limit_cents} cents")]
    BudgetExhausted {
        key: String,
        spent_cents: f64,
        limit_cents: f64,
    },

    /// A required relay dependency failed its health probe.
    ///
    /// Non-retryable: every fallback tier shares the relay, so callers must
    /// abort the whole chain instead of trying the next tier.
    #[error("Relay health check failed: {message}")]
    RelayUnreachable { url: String, message: String },

    /// No credential could be resolved for a provider
    #[error("No credential configured for provider '{provider}'")]
    CredentialMissing { provider: String },

    /// Credential store errors (persistence seam)
    #[error("Credential store error: {message}")]
    Store {
        message: String,
        context: Option<String>,
    },

    /// Generic error with context
    #[error("Error: {message}")]
    Other { message: String },
}

impl DispatchError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a configuration error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a circuit-open refusal for a provider
    pub fn circuit_open(provider: impl Into<String>, failures: u32) -> Self {
        Self::CircuitOpen {
            provider: provider.into(),
            failures,
        }
    }

    /// Create a budget-exhausted refusal for a budget key
    pub fn budget_exhausted(key: impl Into<String>, spent_cents: f64, limit_cents: f64) -> Self {
        Self::BudgetExhausted {
            key: key.into(),
            spent_cents,
            limit_cents,
        }
    }

    /// Create a relay-unreachable error for a failed health probe
    pub fn relay_unreachable(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RelayUnreachable {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a credential-missing error for a provider
    pub fn credential_missing(provider: impl Into<String>) -> Self {
        Self::CredentialMissing {
            provider: provider.into(),
        }
    }

    /// Create a new credential store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            context: None,
        }
    }

    /// Create a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Whether retrying the same call later can succeed without operator action.
    ///
    /// `CircuitOpen` clears itself once the reset timeout elapses and `Store`
    /// failures may be transient; everything else needs intervention
    /// (`RelayUnreachable` in particular must abort the whole fallback chain).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::Store { .. })
    }
}

impl From<anyhow::Error> for DispatchError {
    fn from(error: anyhow::Error) -> Self {
        Self::other(error.to_string())
    }
}
