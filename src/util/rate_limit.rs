//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Default inbound message budget per connection.
/// Clients throttle movement to ~30/s but send shoot and priority edges immediately.
pub const INPUT_RATE_LIMIT: u32 = 60;

/// Per-connection rate limiter state.
///
/// A message that flips the shoot flag is charged to its own bucket, so
/// steady movement traffic can never swallow a trigger release and leave
/// the server's fire latch closed.
#[derive(Clone)]
pub struct PlayerRateLimiter {
    input_limiter: Arc<Limiter>,
    edge_limiter: Arc<Limiter>,
    /// Shoot flag of the last admitted input
    last_shoot: bool,
}

impl PlayerRateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            input_limiter: create_limiter(requests_per_second),
            // A press and a release per regular message
            edge_limiter: create_limiter(requests_per_second.saturating_mul(2)),
            last_shoot: false,
        }
    }

    /// Check if an input message is allowed (returns true if allowed)
    pub fn check_input(&self) -> bool {
        self.input_limiter.check().is_ok()
    }

    /// Admit one inbound message; `shoot` is its shoot flag when it carries one
    pub fn admit(&mut self, shoot: Option<bool>) -> bool {
        let admitted = match shoot {
            Some(flag) if flag != self.last_shoot => self.edge_limiter.check().is_ok(),
            _ => self.check_input(),
        };
        if admitted {
            if let Some(flag) = shoot {
                self.last_shoot = flag;
            }
        }
        admitted
    }
}

impl Default for PlayerRateLimiter {
    fn default() -> Self {
        Self::new(INPUT_RATE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_beyond_quota_is_rejected() {
        let limiter = PlayerRateLimiter::new(5);
        let allowed = (0..20).filter(|_| limiter.check_input()).count();
        assert!(allowed >= 5);
        assert!(allowed < 20);
    }

    #[test]
    fn shoot_edges_survive_exhausted_budget() {
        let mut limiter = PlayerRateLimiter::new(1);
        assert!(limiter.admit(Some(false)));
        assert!(!limiter.admit(Some(false)));
        assert!(!limiter.admit(None));

        assert!(limiter.admit(Some(true)));
        assert!(limiter.admit(Some(false)));
        // Same flag again is ordinary traffic
        assert!(!limiter.admit(Some(false)));
    }

    #[test]
    fn refused_edge_stays_an_edge() {
        let mut limiter = PlayerRateLimiter::new(1);
        assert!(limiter.admit(Some(true)));
        assert!(limiter.admit(Some(false)));
        assert!(!limiter.admit(Some(true)));
        // The press was never seen, so a retry is still charged to the edge bucket
        assert!(!limiter.admit(Some(true)));
        // Regular traffic keeps its own budget
        assert!(limiter.admit(None));
    }
}
