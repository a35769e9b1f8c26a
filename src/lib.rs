pub mod account;
pub mod auth;
pub mod avatar_locator;
pub mod config;
pub mod error;
pub mod profile;
pub mod profile_handler;
pub mod profile_service;
pub mod rate_limiters;


pub use account::{Account, AccountRecord, AccountStore, InMemoryAccountStore};
pub use auth::{AuthenticatedCaller, Authenticator, BasicAuthenticator};
pub use avatar_locator::{
    build_avatar_locator, AvatarLocator, PassthroughAvatarLocator, PresignedAvatarLocator,
};
pub use config::{AvatarConfig, AvatarUrlMode, CdnConfiguration, Config, RateLimitsConfig};
pub use error::{ConfigError, ProfileError};
pub use profile::Profile;
pub use profile_handler::{router, AppState};
pub use profile_service::{ProfileService, ProfileServiceMetricsSnapshot};
pub use rate_limiters::{LeakyBucketLimiter, RateLimiter, RateLimiters};
