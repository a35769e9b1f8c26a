use crate::config::{RateLimitConfiguration, RateLimitsConfig};
use crate::error::ProfileError;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::Quota;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::debug;

type KeyedRateLimiter =
    governor::RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Per-key request gate
pub trait RateLimiter: Send + Sync {
    /// Consume one unit of quota for `key`, failing once it is exhausted
    fn validate(&self, key: &str) -> Result<(), ProfileError>;

    /// Drop state for keys whose buckets have fully drained
    fn retain_recent(&self) {}

    /// Number of keys currently tracked
    fn tracked_keys(&self) -> usize {
        0
    }
}

/// Leaky bucket limiter with independent state per key
pub struct LeakyBucketLimiter {
    name: String,
    limiter: KeyedRateLimiter,
    clock: DefaultClock,
}

impl LeakyBucketLimiter {
    pub fn new(name: impl Into<String>, config: &RateLimitConfiguration) -> Self {
        // Both values are checked at config validation; fall back to 1 rather than panic
        let leak = NonZeroU32::new(config.leak_rate_per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.bucket_size).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(leak).allow_burst(burst);

        Self {
            name: name.into(),
            limiter: governor::RateLimiter::keyed(quota),
            clock: DefaultClock::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl RateLimiter for LeakyBucketLimiter {
    fn validate(&self, key: &str) -> Result<(), ProfileError> {
        match self.limiter.check_key(&key.to_string()) {
            Ok(_) => Ok(()),
            Err(not_until) => {
                let wait_time = not_until.wait_time_from(self.clock.now());
                debug!(
                    limiter = %self.name,
                    key = %key,
                    "Rate limited: waiting {:?}",
                    wait_time
                );
                Err(ProfileError::RateLimitExceeded {
                    limiter: self.name.clone(),
                    retry_after: wait_time,
                })
            }
        }
    }

    fn retain_recent(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }
}

/// Process-wide set of named limiters, built once at startup
#[derive(Clone)]
pub struct RateLimiters {
    profile: Arc<dyn RateLimiter>,
}

impl RateLimiters {
    pub fn new(profile: Arc<dyn RateLimiter>) -> Self {
        Self { profile }
    }

    pub fn from_config(config: &RateLimitsConfig) -> Self {
        Self::new(Arc::new(LeakyBucketLimiter::new("profile", &config.profile)))
    }

    /// The limiter shared by every profile lookup
    pub fn profile_limiter(&self) -> Arc<dyn RateLimiter> {
        Arc::clone(&self.profile)
    }

    /// Prune idle keys from every limiter
    pub fn retain_recent(&self) {
        self.profile.retain_recent();
        debug!(
            "Profile limiter tracking {} callers after cleanup",
            self.profile.tracked_keys()
        );
    }
}
