//! Per-provider circuit breakers
//!
//! One circuit per upstream provider, created lazily on first touch. The
//! whole registry is synchronous: circuits mutate under their map entry
//! guard, so checks stay on the dispatch hot path without suspending.

use crate::config::ProviderBreakerConfig;
use serde::Serialize;
use std::time::Instant;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, calls proceed normally
    Closed,
    /// Circuit is open, calls are rejected
    Open,
    /// Circuit is half-open, a single trial call is allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Point-in-time view of one provider's circuit
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

/// State for a single provider's circuit
#[derive(Debug)]
struct ProviderCircuit {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
}

impl ProviderCircuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            opened_at: None,
        }
    }

    /// Side-effecting openness check: an open circuit whose reset timeout has
    /// elapsed moves to half-open here, as part of the read. There is no
    /// background timer; this read IS the transition point.
    fn check_open(&mut self, provider: &str, config: &ProviderBreakerConfig) -> bool {
        match self.state {
            CircuitState::Closed => false,
            // A half-open circuit admits the trial call; the next recorded
            // outcome decides where it lands.
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|at| at.elapsed() >= config.reset_timeout())
                    .unwrap_or(true);
                if elapsed {
                    // The failure counter deliberately survives this
                    // transition: one more failure re-opens immediately.
                    self.state = CircuitState::HalfOpen;
                    tracing::info!(
                        provider = %provider,
                        "Circuit breaker half-open, allowing one trial call"
                    );
                    false
                } else {
                    true
                }
            }
        }
    }

    fn record_success(&mut self, provider: &str) {
        if self.state != CircuitState::Closed {
            tracing::info!(provider = %provider, "Circuit breaker closed after success");
        }
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    fn record_failure(&mut self, provider: &str, config: &ProviderBreakerConfig) {
        self.consecutive_failures += 1;
        self.last_failure_at = Some(Instant::now());
        if self.consecutive_failures >= config.failure_threshold && self.state != CircuitState::Open
        {
            self.state = CircuitState::Open;
            self.opened_at = Some(Instant::now());
            tracing::warn!(
                provider = %provider,
                failures = self.consecutive_failures,
                "Circuit breaker opened"
            );
        } else if self.state == CircuitState::Open {
            // Late failure reports while already open just refresh the clock.
            self.opened_at = Some(Instant::now());
        }
    }

    fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
        }
    }
}

/// Registry of per-provider circuit breakers
///
/// # Examples
///
/// ```
/// use switchboard_dispatch::breaker::ProviderBreakers;
///
/// let breakers = ProviderBreakers::new();
/// assert!(!breakers.is_open("anthropic"));
/// breakers.record_failure("anthropic");
/// breakers.record_success("anthropic");
/// ```
pub struct ProviderBreakers {
    circuits: dashmap::DashMap<String, ProviderCircuit>,
    default_config: ProviderBreakerConfig,
}

impl ProviderBreakers {
    /// Create a registry with default config
    pub fn new() -> Self {
        Self::with_config(ProviderBreakerConfig::default())
    }

    /// Create a registry with custom default config
    pub fn with_config(config: ProviderBreakerConfig) -> Self {
        Self {
            circuits: dashmap::DashMap::new(),
            default_config: config,
        }
    }

    /// Check whether a provider's circuit currently rejects calls.
    ///
    /// This is a side-effecting read: an open circuit past its reset timeout
    /// transitions to half-open and reports `false`, admitting exactly one
    /// trial call whose outcome decides the next state.
    pub fn is_open(&self, provider: &str) -> bool {
        self.is_open_with(provider, &self.default_config)
    }

    /// [`is_open`](Self::is_open) with a per-call config override
    pub fn is_open_with(&self, provider: &str, config: &ProviderBreakerConfig) -> bool {
        self.entry(provider).check_open(provider, config)
    }

    /// Record a successful call: the circuit closes and the failure counter
    /// resets, whatever state it was in.
    pub fn record_success(&self, provider: &str) {
        self.entry(provider).record_success(provider);
    }

    /// Record a failed call. At `failure_threshold` consecutive failures the
    /// circuit opens; a failure during a half-open trial re-opens it
    /// immediately because the counter was never cleared.
    pub fn record_failure(&self, provider: &str) {
        self.record_failure_with(provider, &self.default_config);
    }

    /// [`record_failure`](Self::record_failure) with a per-call config override
    pub fn record_failure_with(&self, provider: &str, config: &ProviderBreakerConfig) {
        self.entry(provider).record_failure(provider, config);
    }

    /// Snapshot one provider's circuit (created if absent)
    pub fn state(&self, provider: &str) -> BreakerSnapshot {
        self.entry(provider).snapshot()
    }

    /// Snapshot every known circuit, for diagnostics surfaces
    pub fn snapshots(&self) -> Vec<(String, BreakerSnapshot)> {
        self.circuits
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    /// Reset every circuit to closed with a zero counter
    pub fn reset_all(&self) {
        for mut entry in self.circuits.iter_mut() {
            let (provider, circuit) = entry.pair_mut();
            circuit.record_success(provider);
        }
        tracing::debug!("All provider circuit breakers reset");
    }

    fn entry(
        &self,
        provider: &str,
    ) -> dashmap::mapref::one::RefMut<'_, String, ProviderCircuit> {
        self.circuits
            .entry(provider.to_string())
            .or_insert_with(ProviderCircuit::new)
    }
}

impl Default for ProviderBreakers {
    fn default() -> Self {
        Self::new()
    }
}
