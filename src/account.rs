//! Account records and the account store capability

use crate::error::{ConfigError, ProfileError};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Read-only snapshot of an account as held by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(rename = "number")]
    pub identifier: String,
    pub identity_key: String,
    #[serde(rename = "name", default)]
    pub profile_name: String,
    #[serde(rename = "avatar", default, skip_serializing_if = "Option::is_none")]
    pub avatar_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_digest: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// On-disk account entry: the account plus its credential digest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    #[serde(flatten)]
    pub account: Account,
    /// Lowercase hex SHA-256 of the account password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_sha256: Option<String>,
}

/// Keyed lookup of accounts by identifier
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, identifier: &str) -> Result<Option<Account>, ProfileError>;
}

/// Process-local account store
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: &[AccountRecord]) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record.account.clone());
        }
        store
    }

    /// Read a JSON array of account records from disk
    pub fn load_records(path: &Path) -> Result<Vec<AccountRecord>, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::AccountsRead {
            path: path.to_path_buf(),
            source,
        })?;
        let records: Vec<AccountRecord> =
            serde_json::from_str(&raw).map_err(|source| ConfigError::AccountsParse {
                path: path.to_path_buf(),
                source,
            })?;
        info!(
            "Loaded {} account records from {}",
            records.len(),
            path.display()
        );
        Ok(records)
    }

    /// Insert or replace an account
    pub fn insert(&self, account: Account) {
        self.accounts
            .write()
            .insert(account.identifier.clone(), account);
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get(&self, identifier: &str) -> Result<Option<Account>, ProfileError> {
        Ok(self.accounts.read().get(identifier).cloned())
    }
}
