//! Monotonic clock helpers shared by the server tick loop and the client
//! frame loop.

use std::time::{Duration, Instant};

/// Length of one authoritative simulation step.
pub const TICK_PERIOD: Duration = Duration::from_millis(100);

/// Minimum spacing between two unreliable updates of the same kind.
pub const SEND_RATE_LIMIT: Duration = Duration::from_millis(50);

pub fn now() -> Instant {
    Instant::now()
}

/// Time elapsed since `earlier`, zero if `earlier` lies in the future.
pub fn elapsed_since(earlier: Instant) -> Duration {
    now().saturating_duration_since(earlier)
}

pub fn elapsed_nanos(later: Instant, earlier: Instant) -> u128 {
    later.saturating_duration_since(earlier).as_nanos()
}

/// Signed distance in seconds from `earlier` to `later`. Negative when
/// `later` precedes `earlier`.
pub fn signed_secs(later: Instant, earlier: Instant) -> f64 {
    match later.checked_duration_since(earlier) {
        Some(forward) => forward.as_secs_f64(),
        None => -earlier.duration_since(later).as_secs_f64(),
    }
}

/// Remaining part of `budget` after `spent`, clamped to zero.
pub fn remaining(budget: Duration, spent: Duration) -> Duration {
    budget.saturating_sub(spent)
}
