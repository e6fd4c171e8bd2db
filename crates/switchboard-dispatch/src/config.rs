//! Configuration types for the dispatch layer.
//!
//! Every component is tunable, every field has a serde default, and the
//! defaults match production behavior: breakers on, budget enforcement off
//! until an operator opts in.

use crate::error::{DispatchError, DispatchResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the per-provider circuit breakers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBreakerConfig {
    /// Consecutive failures before the circuit opens
    #[serde(default = "ProviderBreakerConfig::default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time an open circuit waits before allowing a half-open trial call
    #[serde(default = "ProviderBreakerConfig::default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

impl Default for ProviderBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: Self::default_failure_threshold(),
            reset_timeout_ms: Self::default_reset_timeout_ms(),
        }
    }
}

impl ProviderBreakerConfig {
    const fn default_failure_threshold() -> u32 {
        5
    }

    /// Default reset timeout in milliseconds (1 minute)
    const fn default_reset_timeout_ms() -> u64 {
        60_000
    }

    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggressive configuration: trips fast, probes again quickly.
    /// Suited to providers with short-lived outages.
    pub fn aggressive() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_ms: 15_000,
        }
    }

    /// Lenient configuration: tolerates more failures before tripping.
    pub fn lenient() -> Self {
        Self {
            failure_threshold: 10,
            reset_timeout_ms: 120_000,
        }
    }

    /// Set the failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the reset timeout in milliseconds
    pub fn with_reset_timeout_ms(mut self, ms: u64) -> Self {
        self.reset_timeout_ms = ms;
        self
    }

    /// Reset timeout as a [`Duration`]
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Configuration for the global overload circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverloadBreakerConfig {
    /// Relevant failures inside the sliding window before the breaker trips
    #[serde(default = "OverloadBreakerConfig::default_failure_threshold")]
    pub failure_threshold: u32,

    /// Cooldown after a trip; no half-open phase, the breaker fully reopens
    #[serde(default = "OverloadBreakerConfig::default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Sliding window over which failures are counted
    #[serde(default = "OverloadBreakerConfig::default_window_ms")]
    pub window_ms: u64,

    /// Extra operator-supplied signal patterns (regex, case-insensitive).
    /// Malformed patterns are skipped with a warning, never an error.
    #[serde(default)]
    pub extra_signal_patterns: Vec<String>,
}

impl Default for OverloadBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: Self::default_failure_threshold(),
            cooldown_ms: Self::default_cooldown_ms(),
            window_ms: Self::default_window_ms(),
            extra_signal_patterns: Vec::new(),
        }
    }
}

impl OverloadBreakerConfig {
    const fn default_failure_threshold() -> u32 {
        3
    }

    /// Default cooldown in milliseconds (3 minutes)
    const fn default_cooldown_ms() -> u64 {
        180_000
    }

    /// Default sliding window in milliseconds (5 minutes)
    const fn default_window_ms() -> u64 {
        300_000
    }

    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the cooldown in milliseconds
    pub fn with_cooldown_ms(mut self, ms: u64) -> Self {
        self.cooldown_ms = ms;
        self
    }

    /// Set the sliding window in milliseconds
    pub fn with_window_ms(mut self, ms: u64) -> Self {
        self.window_ms = ms;
        self
    }

    /// Cooldown as a [`Duration`]
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Sliding window as a [`Duration`]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Configuration for the per-key daily cost budget tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Whether budget enforcement is active. Disabled trackers report zero
    /// spend and never deny admission.
    #[serde(default)]
    pub enabled: bool,

    /// Daily spend ceiling in cents; `None` means no daily cap
    #[serde(default)]
    pub max_daily_cost_cents: Option<f64>,

    /// Per-message clamp in cents, applied before accumulation;
    /// `None` means costs are accumulated as reported
    #[serde(default)]
    pub max_per_message_cost_cents: Option<f64>,

    /// UTC hour (0-23) at which the daily counter rolls over
    #[serde(default = "BudgetConfig::default_reset_hour_utc")]
    pub reset_hour_utc: u8,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_daily_cost_cents: None,
            max_per_message_cost_cents: None,
            reset_hour_utc: Self::default_reset_hour_utc(),
        }
    }
}

impl BudgetConfig {
    const fn default_reset_hour_utc() -> u8 {
        0
    }

    /// Create a disabled configuration (the production default)
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Create an enabled configuration with a daily ceiling in cents
    pub fn with_daily_limit(max_daily_cost_cents: f64) -> Self {
        Self {
            enabled: true,
            max_daily_cost_cents: Some(max_daily_cost_cents),
            ..Self::default()
        }
    }

    /// Set the per-message clamp in cents
    pub fn with_per_message_limit(mut self, cents: f64) -> Self {
        self.max_per_message_cost_cents = Some(cents);
        self
    }

    /// Set the UTC rollover hour
    pub fn with_reset_hour_utc(mut self, hour: u8) -> Self {
        self.reset_hour_utc = hour;
        self
    }
}

/// Configuration for the dependency health cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Per-probe timeout in milliseconds
    #[serde(default = "HealthConfig::default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// How long a successful probe result is served from cache,
    /// measured from probe completion. Failures are never cached.
    #[serde(default = "HealthConfig::default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: Self::default_probe_timeout_ms(),
            cache_ttl_ms: Self::default_cache_ttl_ms(),
        }
    }
}

impl HealthConfig {
    const fn default_probe_timeout_ms() -> u64 {
        5_000
    }

    /// Default cache TTL in milliseconds (30 seconds)
    const fn default_cache_ttl_ms() -> u64 {
        30_000
    }

    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the probe timeout in milliseconds
    pub fn with_probe_timeout_ms(mut self, ms: u64) -> Self {
        self.probe_timeout_ms = ms;
        self
    }

    /// Set the cache TTL in milliseconds
    pub fn with_cache_ttl_ms(mut self, ms: u64) -> Self {
        self.cache_ttl_ms = ms;
        self
    }

    /// Probe timeout as a [`Duration`]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Cache TTL as a [`Duration`]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

/// Top-level configuration for the dispatch gate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per-provider circuit breaker tuning
    pub provider_breaker: ProviderBreakerConfig,
    /// Global overload breaker tuning
    pub overload_breaker: OverloadBreakerConfig,
    /// Daily cost budget tuning
    pub budget: BudgetConfig,
    /// Dependency health cache tuning
    pub health: HealthConfig,
}

impl DispatchConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration, returning the first problem found
    pub fn validate(&self) -> DispatchResult<()> {
        if self.provider_breaker.failure_threshold == 0 {
            return Err(DispatchError::config(
                "provider_breaker.failure_threshold must be at least 1",
            ));
        }
        if self.overload_breaker.failure_threshold == 0 {
            return Err(DispatchError::config(
                "overload_breaker.failure_threshold must be at least 1",
            ));
        }
        if self.overload_breaker.window_ms == 0 {
            return Err(DispatchError::config(
                "overload_breaker.window_ms must be positive",
            ));
        }
        if self.budget.reset_hour_utc > 23 {
            return Err(DispatchError::config(format!(
                "budget.reset_hour_utc must be 0-23, got {}",
                self.budget.reset_hour_utc
            )));
        }
        if let Some(limit) = self.budget.max_daily_cost_cents {
            if limit < 0.0 {
                return Err(DispatchError::config(
                    "budget.max_daily_cost_cents must not be negative",
                ));
            }
        }
        if let Some(limit) = self.budget.max_per_message_cost_cents {
            if limit < 0.0 {
                return Err(DispatchError::config(
                    "budget.max_per_message_cost_cents must not be negative",
                ));
            }
        }
        if self.health.probe_timeout_ms == 0 {
            return Err(DispatchError::config(
                "health.probe_timeout_ms must be positive",
            ));
        }
        Ok(())
    }
}
