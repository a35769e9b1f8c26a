//! Process configuration, read once at startup

use crate::error::ConfigError;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Object storage coordinates for avatar blobs
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CdnConfiguration {
    pub access_key: String,
    pub access_secret: String,
    pub region: String,
    pub bucket: String,
}

impl fmt::Debug for CdnConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdnConfiguration")
            .field("access_key", &self.access_key)
            .field("access_secret", &"<redacted>")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// How stored avatar paths are turned into client-facing references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AvatarUrlMode {
    /// Return the stored path unchanged
    #[default]
    Passthrough,
    /// Return a time-limited signed URL against the CDN bucket
    Presigned,
}

impl FromStr for AvatarUrlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passthrough" => Ok(AvatarUrlMode::Passthrough),
            "presigned" => Ok(AvatarUrlMode::Presigned),
            other => Err(format!("unknown avatar URL mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarConfig {
    pub mode: AvatarUrlMode,
    pub url_ttl: Duration,
    pub cdn: CdnConfiguration,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            mode: AvatarUrlMode::Passthrough,
            url_ttl: Duration::from_secs(3600),
            cdn: CdnConfiguration::default(),
        }
    }
}

/// Leaky bucket parameters for one limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfiguration {
    /// Requests allowed in a burst
    pub bucket_size: u32,
    /// Requests the bucket drains per minute
    pub leak_rate_per_minute: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitsConfig {
    pub profile: RateLimitConfiguration,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            profile: RateLimitConfiguration {
                bucket_size: 4320,
                leak_rate_per_minute: 3,
            },
        }
    }
}

/// Top-level service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub accounts_file: PathBuf,
    pub lookup_timeout: Duration,
    pub limiter_cleanup_interval: Duration,
    pub rate_limits: RateLimitsConfig,
    pub avatar: AvatarConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            accounts_file: PathBuf::from("./data/accounts.json"),
            lookup_timeout: Duration::from_millis(2000),
            limiter_cleanup_interval: Duration::from_secs(300),
            rate_limits: RateLimitsConfig::default(),
            avatar: AvatarConfig::default(),
        }
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

impl Config {
    /// Load from process environment (after `.env` has been applied)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; unset keys take their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let lookup_timeout_ms: u64 = parse_var(
            &lookup,
            "ACCOUNT_LOOKUP_TIMEOUT_MS",
            defaults.lookup_timeout.as_millis() as u64,
        )?;
        let cleanup_secs: u64 = parse_var(
            &lookup,
            "RATE_LIMIT_CLEANUP_SECS",
            defaults.limiter_cleanup_interval.as_secs(),
        )?;
        let ttl_secs: u64 = parse_var(
            &lookup,
            "AVATAR_URL_TTL_SECS",
            defaults.avatar.url_ttl.as_secs(),
        )?;

        let config = Config {
            bind_addr: parse_var(&lookup, "BIND_ADDR", defaults.bind_addr)?,
            accounts_file: lookup("ACCOUNTS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.accounts_file),
            lookup_timeout: Duration::from_millis(lookup_timeout_ms),
            limiter_cleanup_interval: Duration::from_secs(cleanup_secs),
            rate_limits: RateLimitsConfig {
                profile: RateLimitConfiguration {
                    bucket_size: parse_var(
                        &lookup,
                        "PROFILE_RATE_LIMIT_BUCKET_SIZE",
                        defaults.rate_limits.profile.bucket_size,
                    )?,
                    leak_rate_per_minute: parse_var(
                        &lookup,
                        "PROFILE_RATE_LIMIT_LEAK_PER_MINUTE",
                        defaults.rate_limits.profile.leak_rate_per_minute,
                    )?,
                },
            },
            avatar: AvatarConfig {
                mode: parse_var(&lookup, "AVATAR_URL_MODE", defaults.avatar.mode)?,
                url_ttl: Duration::from_secs(ttl_secs),
                cdn: CdnConfiguration {
                    access_key: lookup("CDN_ACCESS_KEY").unwrap_or_default(),
                    access_secret: lookup("CDN_ACCESS_SECRET").unwrap_or_default(),
                    region: lookup("CDN_REGION").unwrap_or_default(),
                    bucket: lookup("CDN_BUCKET").unwrap_or_default(),
                },
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let profile = &self.rate_limits.profile;
        if profile.bucket_size == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "profile bucket_size cannot be 0".into(),
            ));
        }
        if profile.leak_rate_per_minute == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "profile leak_rate_per_minute cannot be 0".into(),
            ));
        }

        if self.lookup_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "ACCOUNT_LOOKUP_TIMEOUT_MS",
                reason: "must be greater than 0".into(),
            });
        }
        if self.limiter_cleanup_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "RATE_LIMIT_CLEANUP_SECS",
                reason: "must be greater than 0".into(),
            });
        }

        if self.avatar.mode == AvatarUrlMode::Presigned {
            let cdn = &self.avatar.cdn;
            let required = [
                ("CDN_ACCESS_KEY", &cdn.access_key),
                ("CDN_ACCESS_SECRET", &cdn.access_secret),
                ("CDN_REGION", &cdn.region),
                ("CDN_BUCKET", &cdn.bucket),
            ];
            if let Some((key, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
                return Err(ConfigError::MissingCdnSetting(*key));
            }
            if self.avatar.url_ttl.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key: "AVATAR_URL_TTL_SECS",
                    reason: "must be greater than 0".into(),
                });
            }
        }

        Ok(())
    }
}
