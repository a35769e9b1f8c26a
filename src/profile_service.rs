//! Profile lookup orchestration
//!
//! Checks run in a fixed order: caller identity, then the caller's rate
//! limit, then the target account. Missing and disabled targets produce the
//! same error so the endpoint does not reveal which accounts exist.

use crate::account::AccountStore;
use crate::auth::AuthenticatedCaller;
use crate::avatar_locator::AvatarLocator;
use crate::error::ProfileError;
use crate::profile::Profile;
use crate::rate_limiters::RateLimiters;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Counters for lookup outcomes
#[derive(Debug, Default)]
pub struct ProfileServiceMetrics {
    pub total_served: AtomicU64,
    pub total_unauthenticated: AtomicU64,
    pub total_rate_limited: AtomicU64,
    pub total_target_missing: AtomicU64,
    pub total_target_disabled: AtomicU64,
    pub total_storage_failures: AtomicU64,
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileServiceMetricsSnapshot {
    pub total_served: u64,
    pub total_unauthenticated: u64,
    pub total_rate_limited: u64,
    pub total_target_missing: u64,
    pub total_target_disabled: u64,
    pub total_storage_failures: u64,
}

impl ProfileServiceMetrics {
    pub fn snapshot(&self) -> ProfileServiceMetricsSnapshot {
        ProfileServiceMetricsSnapshot {
            total_served: self.total_served.load(Ordering::Relaxed),
            total_unauthenticated: self.total_unauthenticated.load(Ordering::Relaxed),
            total_rate_limited: self.total_rate_limited.load(Ordering::Relaxed),
            total_target_missing: self.total_target_missing.load(Ordering::Relaxed),
            total_target_disabled: self.total_target_disabled.load(Ordering::Relaxed),
            total_storage_failures: self.total_storage_failures.load(Ordering::Relaxed),
        }
    }
}

/// Answers "profile of `target` as seen by `caller`"
pub struct ProfileService {
    rate_limiters: RateLimiters,
    accounts: Arc<dyn AccountStore>,
    avatars: Arc<dyn AvatarLocator>,
    lookup_timeout: Duration,
    metrics: ProfileServiceMetrics,
}

impl ProfileService {
    pub fn new(
        rate_limiters: RateLimiters,
        accounts: Arc<dyn AccountStore>,
        avatars: Arc<dyn AvatarLocator>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            rate_limiters,
            accounts,
            avatars,
            lookup_timeout,
            metrics: ProfileServiceMetrics::default(),
        }
    }

    pub fn metrics(&self) -> ProfileServiceMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Look up the public profile of `target` on behalf of `caller`
    pub async fn get_profile(
        &self,
        caller: Option<&AuthenticatedCaller>,
        target: &str,
    ) -> Result<Profile, ProfileError> {
        let caller_id = match caller {
            Some(AuthenticatedCaller::Enabled(id)) => id.as_str(),
            Some(AuthenticatedCaller::Disabled(id)) => {
                debug!(caller = %id, "Rejecting profile lookup from disabled account");
                return Err(self.reject(ProfileError::Unauthenticated));
            }
            None => return Err(self.reject(ProfileError::Unauthenticated)),
        };

        // Charged against the caller, never the target
        if let Err(e) = self.rate_limiters.profile_limiter().validate(caller_id) {
            info!(caller = %caller_id, "Profile lookup rate limited: {}", e);
            return Err(self.reject(e));
        }

        let lookup = tokio::time::timeout(self.lookup_timeout, self.accounts.get(target)).await;
        let account = match lookup {
            Ok(Ok(Some(account))) => account,
            Ok(Ok(None)) => {
                debug!(caller = %caller_id, target_id = %target, "Profile target not found");
                self.metrics
                    .total_target_missing
                    .fetch_add(1, Ordering::Relaxed);
                return Err(ProfileError::TargetUnavailable);
            }
            Ok(Err(e)) => {
                warn!(target_id = %target, "Account lookup failed: {}", e);
                return Err(self.reject(e));
            }
            Err(_) => {
                warn!(
                    target_id = %target,
                    "Account lookup timed out after {:?}",
                    self.lookup_timeout
                );
                return Err(self.reject(ProfileError::StorageFailure(format!(
                    "account lookup timed out after {:?}",
                    self.lookup_timeout
                ))));
            }
        };

        if !account.enabled {
            debug!(caller = %caller_id, target_id = %target, "Profile target disabled");
            self.metrics
                .total_target_disabled
                .fetch_add(1, Ordering::Relaxed);
            return Err(ProfileError::TargetUnavailable);
        }

        let profile = Profile::project(&account, self.avatars.as_ref()).map_err(|e| {
            warn!(target_id = %target, "Avatar resolution failed: {}", e);
            self.reject(e)
        })?;

        self.metrics.total_served.fetch_add(1, Ordering::Relaxed);
        debug!(caller = %caller_id, target_id = %target, "Profile served");
        Ok(profile)
    }

    /// Count a rejection and hand the error back
    fn reject(&self, error: ProfileError) -> ProfileError {
        let counter = match &error {
            ProfileError::Unauthenticated => &self.metrics.total_unauthenticated,
            ProfileError::RateLimitExceeded { .. } => &self.metrics.total_rate_limited,
            ProfileError::StorageFailure(_) => &self.metrics.total_storage_failures,
            // Split into missing/disabled at the call site
            ProfileError::TargetUnavailable => return error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        error
    }
}
