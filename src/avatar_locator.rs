//! Avatar reference resolution
//! Turns storage-relative avatar paths into references a client can fetch.
//! Nothing here performs network I/O.

use crate::config::{AvatarConfig, AvatarUrlMode, CdnConfiguration};
use crate::error::ProfileError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
/// SigV4 caps presigned URLs at seven days
const MAX_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;

/// Everything except SigV4 unreserved characters
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Object keys keep their `/` separators
const PATH_ENCODE_SET: &AsciiSet = &QUERY_ENCODE_SET.remove(b'/');

/// Resolves a stored avatar path to an external reference
pub trait AvatarLocator: Send + Sync {
    fn locate(&self, avatar_path: &str) -> Result<String, ProfileError>;
}

/// Returns the stored path as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughAvatarLocator;

impl AvatarLocator for PassthroughAvatarLocator {
    fn locate(&self, avatar_path: &str) -> Result<String, ProfileError> {
        Ok(avatar_path.to_string())
    }
}

/// Produces SigV4 query-string presigned GET URLs for the avatar bucket
#[derive(Debug, Clone)]
pub struct PresignedAvatarLocator {
    cdn: CdnConfiguration,
    ttl: Duration,
}

impl PresignedAvatarLocator {
    pub fn new(cdn: CdnConfiguration, ttl: Duration) -> Self {
        Self { cdn, ttl }
    }

    /// Virtual-hosted bucket endpoint; us-east-1 uses the global host
    pub fn host(&self) -> String {
        if self.cdn.region == "us-east-1" {
            format!("{}.s3.amazonaws.com", self.cdn.bucket)
        } else {
            format!("{}.s3.{}.amazonaws.com", self.cdn.bucket, self.cdn.region)
        }
    }

    /// Sign `avatar_path` as of `now`
    pub fn presign_at(&self, avatar_path: &str, now: DateTime<Utc>) -> Result<String, ProfileError> {
        let host = self.host();
        let date = now.format("%Y%m%d").to_string();
        let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
        let scope = format!("{date}/{}/{SERVICE}/aws4_request", self.cdn.region);
        let expires = self.ttl.as_secs().clamp(1, MAX_EXPIRY_SECS);

        let canonical_uri = format!(
            "/{}",
            uri_encode(avatar_path.trim_start_matches('/'), false)
        );

        // Already in lexicographic order
        let canonical_query = [
            ("X-Amz-Algorithm", ALGORITHM.to_string()),
            (
                "X-Amz-Credential",
                format!("{}/{scope}", self.cdn.access_key),
            ),
            ("X-Amz-Date", timestamp.clone()),
            ("X-Amz-Expires", expires.to_string()),
            ("X-Amz-SignedHeaders", "host".to_string()),
        ]
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k, true), uri_encode(v, true)))
        .collect::<Vec<_>>()
        .join("&");

        let canonical_request = format!(
            "GET\n{canonical_uri}\n{canonical_query}\nhost:{host}\n\nhost\nUNSIGNED-PAYLOAD"
        );

        let string_to_sign = format!(
            "{ALGORITHM}\n{timestamp}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = [
            date.as_str(),
            self.cdn.region.as_str(),
            SERVICE,
            "aws4_request",
        ]
        .iter()
        .try_fold(
            format!("AWS4{}", self.cdn.access_secret).into_bytes(),
            |key, part| hmac_sha256(&key, part.as_bytes()),
        )?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        Ok(format!(
            "https://{host}{canonical_uri}?{canonical_query}&X-Amz-Signature={signature}"
        ))
    }
}

impl AvatarLocator for PresignedAvatarLocator {
    fn locate(&self, avatar_path: &str) -> Result<String, ProfileError> {
        self.presign_at(avatar_path, Utc::now())
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, ProfileError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| ProfileError::StorageFailure(format!("avatar signing key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn uri_encode(input: &str, encode_slash: bool) -> String {
    let set = if encode_slash {
        QUERY_ENCODE_SET
    } else {
        PATH_ENCODE_SET
    };
    utf8_percent_encode(input, set).to_string()
}

/// Pick the locator for the configured mode
pub fn build_avatar_locator(config: &AvatarConfig) -> Arc<dyn AvatarLocator> {
    match config.mode {
        AvatarUrlMode::Passthrough => Arc::new(PassthroughAvatarLocator),
        AvatarUrlMode::Presigned => Arc::new(PresignedAvatarLocator::new(
            config.cdn.clone(),
            config.url_ttl,
        )),
    }
}
