//! Overload signal classification
//!
//! Decides whether a failure message points at upstream capacity problems
//! (provider overload, rate limiting) rather than configuration or logic
//! errors. Kept as a standalone predicate so the pattern set is testable on
//! its own, away from any breaker state.

use once_cell::sync::Lazy;
use regex::Regex;

// Word boundaries around the bare status codes keep longer numbers
// ("request 142930") from tripping the breaker.
static OVERLOAD_SIGNAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)overloaded|rate limit|too many \w+|\b429\b|\b503\b")
        .expect("valid overload signal regex")
});

/// Whether a failure message looks like upstream overload or rate limiting.
///
/// Case-insensitive. Matches "overloaded", "rate limit", "too many
/// <something>", and the bare status codes 429 and 503.
pub fn is_overload_signal(message: &str) -> bool {
    OVERLOAD_SIGNAL_RE.is_match(message)
}

/// Compile operator-supplied extra patterns, case-insensitively.
///
/// A malformed pattern is logged and skipped; operator tuning must never
/// take the breaker down with it.
pub(crate) fn compile_extra_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| {
            match regex::RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => Some(re),
                Err(err) => {
                    tracing::warn!(
                        pattern = %pattern,
                        error = %err,
                        "Ignoring malformed overload signal pattern"
                    );
                    None
                }
            }
        })
        .collect()
}
