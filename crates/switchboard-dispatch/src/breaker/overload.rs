//! Global overload circuit breaker
//!
//! Watches subagent spawn failures for upstream capacity signals and pauses
//! spawning once too many land inside a sliding window. Unlike the
//! per-provider breakers there is no half-open phase: after the cooldown the
//! breaker is simply closed again.
//!
//! One instance guards the whole process; construct it once and share it by
//! reference.

use crate::breaker::signal;
use crate::config::OverloadBreakerConfig;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Instant;

/// Point-in-time view of the overload breaker
#[derive(Debug, Clone, Serialize)]
pub struct OverloadStatus {
    /// Whether spawning is currently paused
    pub open: bool,
    /// Relevant failures still inside the sliding window
    pub recent_failures: usize,
    /// Time left on the cooldown; zero when closed. Always derived from the
    /// trip timestamp, never stored.
    pub cooldown_remaining_ms: u64,
    /// How long ago the breaker last tripped; `None` if it never has.
    /// Outlives the cooldown, so diagnostics can date a past trip.
    pub tripped_age_ms: Option<u64>,
}

struct OverloadState {
    config: OverloadBreakerConfig,
    extra_patterns: Vec<Regex>,
    failures: VecDeque<Instant>,
    tripped_at: Option<Instant>,
}

impl OverloadState {
    fn prune(&mut self, now: Instant) {
        let window = self.config.window();
        while let Some(oldest) = self.failures.front() {
            if now.duration_since(*oldest) >= window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn status(&mut self, now: Instant) -> OverloadStatus {
        self.prune(now);
        let cooldown = self.config.cooldown();
        let cooldown_remaining = self
            .tripped_at
            .map(|tripped| cooldown.saturating_sub(now.duration_since(tripped)))
            .unwrap_or_default();
        OverloadStatus {
            open: !cooldown_remaining.is_zero(),
            recent_failures: self.failures.len(),
            cooldown_remaining_ms: cooldown_remaining.as_millis() as u64,
            tripped_age_ms: self
                .tripped_at
                .map(|tripped| now.duration_since(tripped).as_millis() as u64),
        }
    }
}

/// Sliding-window breaker for provider overload conditions
///
/// # Examples
///
/// ```
/// use switchboard_dispatch::breaker::OverloadBreaker;
///
/// let breaker = OverloadBreaker::new();
/// breaker.record_failure(Some("HTTP 429: rate limit exceeded"));
/// assert!(!breaker.is_open());
/// ```
pub struct OverloadBreaker {
    inner: Mutex<OverloadState>,
}

impl OverloadBreaker {
    /// Create a breaker with default tuning
    pub fn new() -> Self {
        Self::with_config(OverloadBreakerConfig::default())
    }

    /// Create a breaker with custom tuning
    pub fn with_config(config: OverloadBreakerConfig) -> Self {
        let extra_patterns = signal::compile_extra_patterns(&config.extra_signal_patterns);
        Self {
            inner: Mutex::new(OverloadState {
                config,
                extra_patterns,
                failures: VecDeque::new(),
                tripped_at: None,
            }),
        }
    }

    /// Replace the tuning at runtime. Recorded failures and any active
    /// cooldown survive; the new window and threshold apply from the next
    /// evaluation.
    pub fn configure(&self, config: OverloadBreakerConfig) {
        let extra_patterns = signal::compile_extra_patterns(&config.extra_signal_patterns);
        let mut state = self.inner.lock();
        state.config = config;
        state.extra_patterns = extra_patterns;
    }

    /// Record a spawn failure.
    ///
    /// The failure counts when the message matches an overload signal, or
    /// when there is no message at all: an error that died without saying why
    /// is treated as overload on purpose, since that is what truncated
    /// provider errors usually are. Unrelated failures are ignored.
    pub fn record_failure(&self, message: Option<&str>) {
        let now = Instant::now();
        let mut state = self.inner.lock();

        let relevant = match message {
            None => true,
            Some(text) => {
                signal::is_overload_signal(text)
                    || state.extra_patterns.iter().any(|re| re.is_match(text))
            }
        };
        if !relevant {
            tracing::debug!(
                message = message.unwrap_or_default(),
                "Spawn failure not overload-shaped, ignoring"
            );
            return;
        }

        let was_open = state.status(now).open;
        state.failures.push_back(now);
        let threshold = state.config.failure_threshold as usize;
        if state.failures.len() >= threshold {
            state.tripped_at = Some(now);
            if !was_open {
                tracing::warn!(
                    failures = state.failures.len(),
                    cooldown_ms = state.config.cooldown_ms,
                    "Overload breaker tripped, pausing subagent spawning"
                );
            }
        } else {
            tracing::debug!(
                failures = state.failures.len(),
                threshold,
                "Overload failure recorded"
            );
        }
    }

    /// Whether spawning is currently paused.
    ///
    /// Purely derived: the breaker is open while the trip timestamp is within
    /// the cooldown. Once the cooldown elapses it is closed again with no
    /// half-open probing.
    pub fn is_open(&self) -> bool {
        self.status().open
    }

    /// Current breaker status, for diagnostics surfaces
    pub fn status(&self) -> OverloadStatus {
        self.inner.lock().status(Instant::now())
    }

    /// Operator-facing text explaining a rejected spawn, naming the wait time
    pub fn spawn_error_message(&self) -> String {
        let now = Instant::now();
        let mut state = self.inner.lock();
        let status = state.status(now);
        let window_secs = state.config.window_ms.div_ceil(1000);
        drop(state);

        if status.open {
            let wait_secs = status.cooldown_remaining_ms.div_ceil(1000).max(1);
            format!(
                "Subagent spawning is paused: {} provider overload failure(s) in the last {}s. \
                 Wait about {}s and retry.",
                status.recent_failures, window_secs, wait_secs
            )
        } else {
            "Subagent spawn failed: the provider reported overload. Retry shortly.".to_string()
        }
    }

    /// Clear all recorded failures and any active cooldown
    pub fn reset(&self) {
        let mut state = self.inner.lock();
        state.failures.clear();
        state.tripped_at = None;
    }
}

impl Default for OverloadBreaker {
    fn default() -> Self {
        Self::new()
    }
}
