use std::time::{Duration, Instant};

pub(crate) fn is_fresh(refreshed_at: Instant, ttl: Duration) -> bool {
    refreshed_at.elapsed() <= ttl
}
