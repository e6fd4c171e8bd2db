//! Circuit breakers for dispatch admission
//!
//! Two breakers with different shapes guard outbound calls:
//!
//! - [`ProviderBreakers`]: one three-state circuit per upstream provider,
//!   opened by consecutive failures, probed again through a single half-open
//!   trial call.
//! - [`OverloadBreaker`]: one process-wide sliding-window breaker that pauses
//!   subagent spawning when the upstream reports overload, with a plain
//!   cooldown and no half-open phase.
//!
//! Both are advisory: they answer questions and record outcomes but never
//! return errors themselves. The dispatch gate turns an open circuit into a
//! typed refusal.

mod overload;
mod provider;
mod signal;

pub use overload::{OverloadBreaker, OverloadStatus};
pub use provider::{BreakerSnapshot, CircuitState, ProviderBreakers};
pub use signal::is_overload_signal;
