use crate::account::Account;
use crate::avatar_locator::AvatarLocator;
use crate::error::ProfileError;
use serde::{Deserialize, Serialize};

/// Public view of an account, built fresh for each response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub identity_key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Profile {
    /// Project an enabled account into its public profile; disabled
    /// accounts yield `TargetUnavailable`
    pub fn project(account: &Account, avatars: &dyn AvatarLocator) -> Result<Self, ProfileError> {
        if !account.enabled {
            return Err(ProfileError::TargetUnavailable);
        }

        let avatar = account
            .avatar_path
            .as_deref()
            .map(|path| avatars.locate(path))
            .transpose()?;

        Ok(Self {
            identity_key: account.identity_key.clone(),
            name: account.profile_name.clone(),
            avatar,
        })
    }
}
