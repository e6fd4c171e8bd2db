//! Dispatch resilience and admission control for the Switchboard gateway.
//!
//! Switchboard routes messages from chat surfaces (WhatsApp, Telegram, Slack,
//! Discord, ...) into AI agent sessions and dispatches the resulting model
//! calls to external providers. This crate is the layer every outbound call
//! passes through on its way out: it decides whether the call should happen
//! at all, through which credential, and how to react once the outcome is
//! known.
//!
//! Five components, composed by the [`DispatchGate`]:
//!
//! - [`breaker::ProviderBreakers`] — a three-state circuit per provider,
//!   opened by consecutive failures, probed through a single half-open trial.
//! - [`breaker::OverloadBreaker`] — a process-wide sliding-window breaker
//!   that pauses subagent spawning under upstream overload.
//! - [`budget::BudgetTracker`] — per-conversation daily spend against a
//!   configurable ceiling, rolling over lazily at a configured UTC hour.
//! - [`credentials::CredentialResolver`] — which stored credential profile a
//!   provider dispatches with, move-to-front rotation, prefix classification.
//! - [`health::HealthCache`] — memoized reachability of the out-of-process
//!   relay, with successes cached and failures always re-probed.
//!
//! All state is in-memory and per-process; a restarted gateway starts with
//! closed circuits and a clean slate by design. Every component is
//! constructed explicitly and shared by reference — there are no process-wide
//! singletons to reset between tests.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use switchboard_dispatch::{
//!     DispatchConfig, DispatchGate, DispatchRequest, InMemoryProfileStore,
//! };
//!
//! # async fn dispatch() -> switchboard_dispatch::DispatchResult<()> {
//! let store = Arc::new(InMemoryProfileStore::new());
//! let gate = DispatchGate::new(DispatchConfig::default(), store)?;
//!
//! let request = DispatchRequest::new("anthropic", "telegram:default:42");
//! let admission = gate.admit(&request).await?;
//! // ... perform the model call with admission.credential ...
//! gate.record_success(&request, Some(1.2));
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod budget;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod health;

pub use breaker::{
    is_overload_signal, BreakerSnapshot, CircuitState, OverloadBreaker, OverloadStatus,
    ProviderBreakers,
};
pub use budget::{budget_key, BudgetStatus, BudgetTracker};
pub use config::{
    BudgetConfig, DispatchConfig, HealthConfig, OverloadBreakerConfig, ProviderBreakerConfig,
};
pub use credentials::{
    classify_credential, mask_secret, CredentialHint, CredentialKind, CredentialProfile,
    CredentialResolver, CredentialSource, InMemoryProfileStore, ProfileStore, ResolvedCredential,
};
pub use error::{DispatchError, DispatchResult};
pub use gate::{Admission, DispatchGate, DispatchRequest, GateStatus};
pub use health::{HealthCache, HealthReport};
