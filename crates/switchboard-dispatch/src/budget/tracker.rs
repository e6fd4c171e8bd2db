//! Per-key daily cost budget tracking

use crate::config::BudgetConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Answer to a budget query. Pure data: checking a budget never errors and
/// never blocks dispatch by itself, the gate decides what to do with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    /// Whether today's spend has reached the daily ceiling (equality counts)
    pub over_budget: bool,
    /// Cents spent in the current budget day
    pub daily_spent_cents: f64,
    /// Cents left before the ceiling; `None` when no daily cap is configured
    pub daily_remaining_cents: Option<f64>,
}

/// Spend bucket for one budget key
#[derive(Debug)]
struct BudgetEntry {
    day_key: String,
    spent_cents: f64,
}

/// Compose the conventional budget key for a chat surface conversation
///
/// # Examples
///
/// ```
/// use switchboard_dispatch::budget::budget_key;
///
/// assert_eq!(budget_key("telegram", "default", "42"), "telegram:default:42");
/// ```
pub fn budget_key(surface: &str, account: &str, chat: &str) -> String {
    format!("{surface}:{account}:{chat}")
}

/// Tracks per-key daily spend against a configured ceiling.
///
/// Day rollover is lazy: there are no timers, every read and write first
/// recomputes the budget day (wall clock shifted by the configured UTC reset
/// hour) and zeroes the bucket when the day changed.
pub struct BudgetTracker {
    config: BudgetConfig,
    entries: dashmap::DashMap<String, BudgetEntry>,
}

impl BudgetTracker {
    /// Create a tracker with the given config
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            entries: dashmap::DashMap::new(),
        }
    }

    /// Create a disabled tracker: records nothing, reports zero spend,
    /// never over budget
    pub fn disabled() -> Self {
        Self::new(BudgetConfig::disabled())
    }

    /// Whether budget enforcement is active
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Record the cost of a completed message.
    ///
    /// The amount is clamped into `[0, max_per_message_cost_cents]` before it
    /// is added, so one mispriced call cannot blow the whole daily budget.
    pub fn record_cost(&self, key: &str, cents: f64) {
        self.record_cost_at(key, cents, Utc::now());
    }

    /// Query the current spend for a key. Never errors; see [`BudgetStatus`].
    pub fn check(&self, key: &str) -> BudgetStatus {
        self.check_at(key, Utc::now())
    }

    /// Clear one key's spend
    pub fn reset(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop all tracked spend (shutdown or config reload)
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn record_cost_at(&self, key: &str, cents: f64, now: DateTime<Utc>) {
        if !self.config.enabled {
            return;
        }

        let mut clamped = cents.max(0.0);
        if let Some(cap) = self.config.max_per_message_cost_cents {
            clamped = clamped.min(cap);
        }

        let day_key = self.day_key(now);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| BudgetEntry {
                day_key: day_key.clone(),
                spent_cents: 0.0,
            });
        if entry.day_key != day_key {
            entry.day_key = day_key;
            entry.spent_cents = 0.0;
        }
        entry.spent_cents += clamped;
        tracing::debug!(
            key = %key,
            cost_cents = clamped,
            daily_total_cents = entry.spent_cents,
            "Recorded message cost"
        );
    }

    fn check_at(&self, key: &str, now: DateTime<Utc>) -> BudgetStatus {
        if !self.config.enabled {
            return BudgetStatus {
                over_budget: false,
                daily_spent_cents: 0.0,
                daily_remaining_cents: None,
            };
        }

        let day_key = self.day_key(now);
        let spent = match self.entries.get_mut(key) {
            Some(entry) if entry.day_key == day_key => entry.spent_cents,
            Some(mut entry) => {
                // Stale bucket from a previous budget day; reads roll it over
                // too, so a key that is only ever checked still resets.
                entry.day_key = day_key;
                entry.spent_cents = 0.0;
                0.0
            }
            None => 0.0,
        };

        let over_budget = self
            .config
            .max_daily_cost_cents
            .is_some_and(|limit| spent >= limit);
        if over_budget {
            tracing::debug!(key = %key, spent_cents = spent, "Budget exhausted for key");
        }
        BudgetStatus {
            over_budget,
            daily_spent_cents: spent,
            daily_remaining_cents: self
                .config
                .max_daily_cost_cents
                .map(|limit| (limit - spent).max(0.0)),
        }
    }

    /// Budget day for a wall-clock instant: the UTC date after shifting back
    /// by the reset hour, so the counter rolls at `reset_hour_utc:00` rather
    /// than always at midnight.
    fn day_key(&self, now: DateTime<Utc>) -> String {
        let shifted = now - chrono::Duration::hours(i64::from(self.config.reset_hour_utc));
        shifted.format("%Y-%m-%d").to_string()
    }
}
