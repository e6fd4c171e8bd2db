//! Daily cost budgets per conversation
//!
//! Spend is tracked in cents against caller-chosen keys (conventionally
//! `surface:account:chat`) and rolls over lazily at a configured UTC hour.
//! Checking a budget is a pure query; the dispatch gate is what refuses a
//! message once the ceiling is reached.

mod tracker;

pub use tracker::{budget_key, BudgetStatus, BudgetTracker};
