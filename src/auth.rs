//! Caller authentication

use crate::account::{AccountRecord, AccountStore};
use crate::error::ProfileError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// An identity resolved from request credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticatedCaller {
    /// Credentials are valid and the account is enabled
    Enabled(String),
    /// Credentials are valid but the account is disabled
    Disabled(String),
}

impl AuthenticatedCaller {
    pub fn identifier(&self) -> &str {
        match self {
            AuthenticatedCaller::Enabled(id) | AuthenticatedCaller::Disabled(id) => id,
        }
    }
}

/// Resolves an `Authorization` header to a caller identity.
///
/// `Ok(None)` means the request is unauthenticated.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        authorization: Option<&str>,
    ) -> Result<Option<AuthenticatedCaller>, ProfileError>;
}

/// HTTP Basic authentication against SHA-256 password digests
pub struct BasicAuthenticator {
    digests: HashMap<String, String>,
    accounts: Arc<dyn AccountStore>,
    lookup_timeout: Duration,
}

impl BasicAuthenticator {
    pub fn new(
        digests: HashMap<String, String>,
        accounts: Arc<dyn AccountStore>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            digests,
            accounts,
            lookup_timeout,
        }
    }

    /// Build from account records; records without a digest cannot log in
    pub fn from_records(
        records: &[AccountRecord],
        accounts: Arc<dyn AccountStore>,
        lookup_timeout: Duration,
    ) -> Self {
        let digests = records
            .iter()
            .filter_map(|r| {
                r.password_sha256
                    .as_ref()
                    .map(|d| (r.account.identifier.clone(), d.to_lowercase()))
            })
            .collect();
        Self::new(digests, accounts, lookup_timeout)
    }

    /// Hex SHA-256 of a password, as stored in account records
    pub fn digest_password(password: &str) -> String {
        hex::encode(Sha256::digest(password.as_bytes()))
    }

    fn verify(&self, identifier: &str, password: &str) -> bool {
        let presented = Self::digest_password(password);
        self.digests
            .get(identifier)
            .is_some_and(|expected| constant_time_compare(expected, &presented))
    }
}

/// Compare two strings in time independent of where they first differ.
///
/// Inputs are padded to equal length with distinct fill bytes so a length
/// mismatch can never compare equal.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    let max_len = a.len().max(b.len());

    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];
    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);
    (lengths_equal & contents_equal).into()
}

/// Split `Basic <base64(user:password)>` into its parts
pub fn parse_basic_credentials(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    if user.is_empty() {
        return None;
    }
    Some((user.to_string(), password.to_string()))
}

#[async_trait]
impl Authenticator for BasicAuthenticator {
    async fn authenticate(
        &self,
        authorization: Option<&str>,
    ) -> Result<Option<AuthenticatedCaller>, ProfileError> {
        let Some((identifier, password)) = authorization.and_then(parse_basic_credentials) else {
            debug!("Missing or malformed authorization header");
            return Ok(None);
        };

        if !self.verify(&identifier, &password) {
            debug!(caller = %identifier, "Credential check failed");
            return Ok(None);
        }

        let lookup = tokio::time::timeout(self.lookup_timeout, self.accounts.get(&identifier)).await;
        let account = match lookup {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    caller = %identifier,
                    "Caller account lookup timed out after {:?}",
                    self.lookup_timeout
                );
                return Err(ProfileError::StorageFailure(format!(
                    "caller account lookup timed out after {:?}",
                    self.lookup_timeout
                )));
            }
        };

        let caller = match account {
            Some(account) if account.enabled => AuthenticatedCaller::Enabled(identifier),
            Some(_) => AuthenticatedCaller::Disabled(identifier),
            None => {
                debug!(caller = %identifier, "Credentials valid but account missing");
                return Ok(None);
            }
        };
        Ok(Some(caller))
    }
}
