//! Cached account entry

use serde::{Deserialize, Serialize};

/// An account known to the token cache
///
/// `home_account_id` is `"{uid}.{utid}"` from the provider's `client_info`
/// and keys every cache entry belonging to the account. `local_account_id`
/// is the object id (`oid`) of the user in the tenant that issued the token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAccount {
    pub home_account_id: String,

    pub local_account_id: String,

    /// Login host, e.g. `login.microsoftonline.com`
    #[serde(default)]
    pub environment: String,

    /// Tenant id
    #[serde(default)]
    pub realm: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default = "default_authority_type")]
    pub authority_type: String,
}

fn default_authority_type() -> String {
    "MSSTS".to_string()
}

impl LocalAccount {
    /// Case-insensitive username match
    pub fn matches_username(&self, username: &str) -> bool {
        self.username
            .as_deref()
            .is_some_and(|u| u.eq_ignore_ascii_case(username))
    }
}
