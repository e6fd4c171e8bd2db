//! Dispatch gate
//!
//! The composition root of the resilience layer. Every outbound model call
//! wraps itself in the gate: [`DispatchGate::admit`] runs the admission
//! sequence before the call, and [`DispatchGate::record_success`] /
//! [`DispatchGate::record_failure`] feed the outcome back afterwards. The
//! leaf components stay advisory; this is the one place a denial becomes a
//! typed [`DispatchError`].
//!
//! Admission order is fixed: relay health, then the provider circuit, then
//! the budget, then credential resolution. Nothing is recorded at admission
//! time; breakers and budgets only move once the call has actually finished.
//!
//! The overload breaker is deliberately not part of this sequence. It guards
//! subagent spawning, a different failure domain with its own tuning; the
//! spawner reaches it through [`DispatchGate::overload`].

use crate::breaker::{BreakerSnapshot, OverloadBreaker, OverloadStatus, ProviderBreakers};
use crate::budget::BudgetTracker;
use crate::config::DispatchConfig;
use crate::credentials::{CredentialResolver, ProfileStore, ResolvedCredential};
use crate::error::{DispatchError, DispatchResult};
use crate::health::HealthCache;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One outbound model call, as the gate sees it
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Provider the call goes to, e.g. `"anthropic"`
    pub provider: String,
    /// Budget key charged for the call, conventionally `surface:account:chat`
    pub budget_key: String,
    /// Relay the call dispatches through, when one is involved at all
    pub relay_url: Option<String>,
}

impl DispatchRequest {
    /// Create a request with no relay dependency
    pub fn new(provider: impl Into<String>, budget_key: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            budget_key: budget_key.into(),
            relay_url: None,
        }
    }

    /// Route the call through a relay; its health gates admission
    pub fn via_relay(mut self, url: impl Into<String>) -> Self {
        self.relay_url = Some(url.into());
        self
    }
}

/// A granted admission: the call may proceed with this credential
#[derive(Debug, Clone)]
pub struct Admission {
    pub credential: ResolvedCredential,
}

/// Aggregate gate state for diagnostics surfaces
#[derive(Debug, Clone, Serialize)]
pub struct GateStatus {
    /// Every provider circuit the gate has touched
    pub circuits: BTreeMap<String, BreakerSnapshot>,
    /// The process-wide overload breaker
    pub overload: OverloadStatus,
}

/// Admission control around every outbound model call.
///
/// Owns one instance of each resilience component. Construct it once at
/// process start and share it by reference; the components hold no global
/// state of their own.
pub struct DispatchGate {
    config: DispatchConfig,
    breakers: ProviderBreakers,
    overload: OverloadBreaker,
    budget: BudgetTracker,
    credentials: CredentialResolver,
    health: HealthCache,
}

impl DispatchGate {
    /// Create a gate from a validated config and a credential store
    pub fn new(config: DispatchConfig, store: Arc<dyn ProfileStore>) -> DispatchResult<Self> {
        config.validate()?;
        let health = HealthCache::new(config.health.clone())?;
        Ok(Self {
            breakers: ProviderBreakers::with_config(config.provider_breaker.clone()),
            overload: OverloadBreaker::with_config(config.overload_breaker.clone()),
            budget: BudgetTracker::new(config.budget.clone()),
            credentials: CredentialResolver::new(store),
            health,
            config,
        })
    }

    /// Run the admission sequence for one call.
    ///
    /// Checks, in order: relay health (when the request names a relay), the
    /// provider's circuit, the budget key's daily spend, and finally resolves
    /// a credential. The first refusal wins. Nothing is recorded here; state
    /// only moves when the caller reports the outcome.
    pub async fn admit(&self, request: &DispatchRequest) -> DispatchResult<Admission> {
        if let Some(relay_url) = &request.relay_url {
            // RelayUnreachable aborts the caller's whole fallback chain;
            // every tier dispatches through the same relay.
            self.health
                .ensure_healthy(relay_url, self.config.health.probe_timeout())
                .await?;
        }

        if self.breakers.is_open(&request.provider) {
            let snapshot = self.breakers.state(&request.provider);
            tracing::debug!(
                provider = %request.provider,
                failures = snapshot.consecutive_failures,
                "Admission denied: circuit open"
            );
            return Err(DispatchError::circuit_open(
                &request.provider,
                snapshot.consecutive_failures,
            ));
        }

        let budget = self.budget.check(&request.budget_key);
        if budget.over_budget {
            tracing::debug!(
                key = %request.budget_key,
                spent_cents = budget.daily_spent_cents,
                "Admission denied: budget exhausted"
            );
            return Err(DispatchError::budget_exhausted(
                &request.budget_key,
                budget.daily_spent_cents,
                self.config.budget.max_daily_cost_cents.unwrap_or(0.0),
            ));
        }

        match self.credentials.resolve(&request.provider)? {
            Some(credential) => Ok(Admission { credential }),
            None => Err(DispatchError::credential_missing(&request.provider)),
        }
    }

    /// Report a completed call: close the provider's circuit and, when the
    /// cost is known, charge the budget key
    pub fn record_success(&self, request: &DispatchRequest, cost_cents: Option<f64>) {
        self.breakers.record_success(&request.provider);
        if let Some(cents) = cost_cents {
            self.budget.record_cost(&request.budget_key, cents);
        }
    }

    /// Report a failed call to the provider's circuit
    pub fn record_failure(&self, request: &DispatchRequest) {
        self.breakers.record_failure(&request.provider);
    }

    /// Aggregate breaker state for diagnostics surfaces
    pub fn status(&self) -> GateStatus {
        GateStatus {
            circuits: self.breakers.snapshots().into_iter().collect(),
            overload: self.overload.status(),
        }
    }

    /// The per-provider circuit breakers
    pub fn breakers(&self) -> &ProviderBreakers {
        &self.breakers
    }

    /// The process-wide overload breaker, for the subagent spawner
    pub fn overload(&self) -> &OverloadBreaker {
        &self.overload
    }

    /// The daily budget tracker
    pub fn budget(&self) -> &BudgetTracker {
        &self.budget
    }

    /// The credential resolver
    pub fn credentials(&self) -> &CredentialResolver {
        &self.credentials
    }

    /// The relay health cache
    pub fn health(&self) -> &HealthCache {
        &self.health
    }

    /// Collective reset on full reconfiguration: circuits closed, overload
    /// window cleared, cached health probes dropped. Budget spend survives;
    /// a config reload is not a new billing day.
    pub fn reset(&self) {
        self.breakers.reset_all();
        self.overload.reset();
        self.health.clear();
        tracing::info!("Dispatch gate reset");
    }
}
