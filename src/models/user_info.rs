//! User profile projection of ID token claims

use serde::{Deserialize, Serialize};

use super::IDTokenClaims;

/// Profile fields an application typically shows or stores
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default, alias = "oid", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(default, alias = "given_name", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, alias = "family_name", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(default, alias = "name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default, alias = "postalCode", skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,

    #[serde(default, alias = "streetAddress", skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,

    #[serde(default)]
    pub emails: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_name: Option<String>,

    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default)]
    pub has_groups: bool,

    #[serde(default)]
    pub is_new_user: bool,
}

impl UserInfo {
    /// First email address, falling back to the preferred username
    pub fn primary_email(&self) -> Option<&str> {
        self.emails
            .first()
            .map(String::as_str)
            .or(self.preferred_username.as_deref())
    }
}

impl From<&IDTokenClaims> for UserInfo {
    fn from(claims: &IDTokenClaims) -> Self {
        Self {
            user_id: claims.user_id.clone(),
            preferred_username: claims.preferred_username.clone(),
            first_name: claims.given_name.clone(),
            last_name: claims.family_name.clone(),
            display_name: claims.display_name.clone(),
            city: claims.city.clone(),
            country: claims.country.clone(),
            postal_code: claims.postal_code.clone(),
            street_address: claims.street_address.clone(),
            emails: claims.emails.clone().unwrap_or_default(),
            unique_name: claims.unique_name.clone(),
            roles: claims.roles.clone().unwrap_or_default(),
            has_groups: claims.hasgroups.unwrap_or(false),
            is_new_user: claims.is_new_user.unwrap_or(false),
        }
    }
}
