//! Configuration management for msal-authcode
//!
//! This module handles loading, validating, and managing the identity client
//! configuration from YAML files, environment variables, and CLI arguments.
//! It also owns authority URL construction for the supported Azure AD and
//! Azure AD B2C policies.

use crate::error::{MsalAuthError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

const AAD_LOGIN_HOST: &str = "https://login.microsoftonline.com";

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Authority kind used to build the identity provider URL
///
/// The B2C variants double as predefined user-flow names. A custom policy
/// is selected by setting [`MsalClientConfig::b2c_policy`] alongside any B2C
/// variant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Policy {
    /// Sign in users of a specific organization only
    #[default]
    #[serde(rename = "AAD_SINGLE")]
    AadSingle,
    /// Sign in work, school and personal Microsoft accounts
    #[serde(rename = "AAD_MULTI")]
    AadMulti,
    /// Predefined B2C sign-in flow
    #[serde(rename = "B2C_1_LOGIN", alias = "B2C_LOGIN")]
    B2cLogin,
    /// Predefined B2C profile editing flow
    #[serde(rename = "B2C_1_PROFILE", alias = "B2C_PROFILE")]
    B2cProfile,
    /// Predefined B2C custom (identity experience framework) flow
    #[serde(rename = "B2C_1A_LOGIN", alias = "B2C_CUSTOM")]
    B2cCustom,
}

impl Policy {
    /// Returns the wire value of the policy
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::AadSingle => "AAD_SINGLE",
            Policy::AadMulti => "AAD_MULTI",
            Policy::B2cLogin => "B2C_1_LOGIN",
            Policy::B2cProfile => "B2C_1_PROFILE",
            Policy::B2cCustom => "B2C_1A_LOGIN",
        }
    }

    /// Returns `true` for the Azure AD B2C variants
    pub fn is_b2c(&self) -> bool {
        matches!(
            self,
            Policy::B2cLogin | Policy::B2cProfile | Policy::B2cCustom
        )
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = MsalAuthError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AAD_SINGLE" => Ok(Policy::AadSingle),
            "AAD_MULTI" => Ok(Policy::AadMulti),
            "B2C_1_LOGIN" | "B2C_LOGIN" => Ok(Policy::B2cLogin),
            "B2C_1_PROFILE" | "B2C_PROFILE" => Ok(Policy::B2cProfile),
            "B2C_1A_LOGIN" | "B2C_CUSTOM" => Ok(Policy::B2cCustom),
            other => Err(MsalAuthError::Config(format!(
                "Invalid policy: {}. Must be one of: AAD_SINGLE, AAD_MULTI, B2C_1_LOGIN, B2C_1_PROFILE, B2C_1A_LOGIN",
                other
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionType
// ---------------------------------------------------------------------------

/// Session store backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    /// Process-lifetime map, lost on restart
    Memory,
    /// One JSON file per session id
    #[default]
    Filesystem,
}

impl FromStr for SessionType {
    type Err = MsalAuthError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "inmemory" | "in_memory" => Ok(SessionType::Memory),
            "filesystem" | "file" => Ok(SessionType::Filesystem),
            other => Err(MsalAuthError::Config(format!(
                "Invalid session type: {}. Must be one of: memory, filesystem",
                other
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// MsalClientConfig
// ---------------------------------------------------------------------------

/// Identity client configuration
///
/// The application registration values (`client_id`, `client_credential`,
/// `tenant`) come from the Azure portal. Everything else has a usable
/// default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsalClientConfig {
    /// Application (client) id
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret for the confidential client
    #[serde(default, skip_serializing)]
    pub client_credential: Option<String>,

    /// Tenant name or id
    #[serde(default)]
    pub tenant: Option<String>,

    /// Authority kind
    #[serde(default)]
    pub policy: Policy,

    /// Custom B2C policy name, overrides the policy's own value
    #[serde(default)]
    pub b2c_policy: Option<String>,

    /// Extra scopes requested on top of the reserved OIDC scopes
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Session store backend
    #[serde(default)]
    pub session_type: SessionType,

    /// Directory for the filesystem session store
    #[serde(default)]
    pub session_file_path: Option<PathBuf>,

    /// Prefix prepended to the route paths below
    #[serde(default)]
    pub path_prefix: String,

    /// Login route path
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Token (callback) route path
    #[serde(default = "default_token_path")]
    pub token_path: String,

    /// Logout route path
    #[serde(default = "default_logout_path")]
    pub logout_path: String,

    /// Explicit redirect URI, for apps running behind a reverse proxy
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Landing path after login and default post-logout target
    #[serde(default = "default_return_to_path")]
    pub return_to_path: String,

    /// Expected `iss` claim; issuer is not checked when unset
    #[serde(default)]
    pub issuer: Option<String>,

    /// Replaces the computed authority URL (sovereign clouds, test servers)
    #[serde(default)]
    pub authority_override: Option<String>,

    /// Application name sent as telemetry header
    #[serde(default)]
    pub app_name: Option<String>,

    /// Application version sent as telemetry header
    #[serde(default)]
    pub app_version: Option<String>,

    /// Keep the raw provider payload on parsed models
    #[serde(default)]
    pub debug_payloads: bool,

    /// Timeout for every request to the identity provider
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
}

fn default_login_path() -> String {
    "/_login_route".to_string()
}

fn default_token_path() -> String {
    "/token".to_string()
}

fn default_logout_path() -> String {
    "/_logout_route".to_string()
}

fn default_return_to_path() -> String {
    "/".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    30
}

impl Default for MsalClientConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_credential: None,
            tenant: None,
            policy: Policy::default(),
            b2c_policy: None,
            scopes: Vec::new(),
            session_type: SessionType::default(),
            session_file_path: None,
            path_prefix: String::new(),
            login_path: default_login_path(),
            token_path: default_token_path(),
            logout_path: default_logout_path(),
            redirect_uri: None,
            return_to_path: default_return_to_path(),
            issuer: None,
            authority_override: None,
            app_name: None,
            app_version: None,
            debug_payloads: false,
            http_timeout_seconds: default_http_timeout_seconds(),
        }
    }
}

impl MsalClientConfig {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration. Call
    /// [`validate`](Self::validate) before use.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Parse configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns [`MsalAuthError::Config`] when the file is unreadable or not
    /// valid YAML for this structure
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| MsalAuthError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| MsalAuthError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(client_id) = std::env::var("MSAL_CLIENT_ID") {
            self.client_id = Some(client_id);
        }

        if let Ok(secret) = std::env::var("MSAL_CLIENT_CREDENTIAL") {
            self.client_credential = Some(secret);
        }

        if let Ok(tenant) = std::env::var("MSAL_TENANT") {
            self.tenant = Some(tenant);
        }

        if let Ok(policy) = std::env::var("MSAL_POLICY") {
            match policy.parse() {
                Ok(value) => self.policy = value,
                Err(_) => tracing::warn!("Invalid MSAL_POLICY: {}", policy),
            }
        }

        if let Ok(b2c_policy) = std::env::var("MSAL_B2C_POLICY") {
            self.b2c_policy = Some(b2c_policy);
        }

        if let Ok(scopes) = std::env::var("MSAL_SCOPES") {
            self.scopes = scopes
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(session_type) = std::env::var("MSAL_SESSION_TYPE") {
            match session_type.parse() {
                Ok(value) => self.session_type = value,
                Err(_) => tracing::warn!("Invalid MSAL_SESSION_TYPE: {}", session_type),
            }
        }

        if let Ok(path) = std::env::var("MSAL_SESSION_FILE_PATH") {
            self.session_file_path = Some(PathBuf::from(path));
        }

        if let Ok(redirect_uri) = std::env::var("MSAL_REDIRECT_URI") {
            self.redirect_uri = Some(redirect_uri);
        }

        if let Ok(return_to) = std::env::var("MSAL_RETURN_TO_PATH") {
            self.return_to_path = return_to;
        }

        if let Ok(issuer) = std::env::var("MSAL_ISSUER") {
            self.issuer = Some(issuer);
        }

        if let Ok(authority) = std::env::var("MSAL_AUTHORITY_OVERRIDE") {
            self.authority_override = Some(authority);
        }

        if let Ok(value) = std::env::var("MSAL_DEBUG_PAYLOADS") {
            match value.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.debug_payloads = true,
                "0" | "false" | "no" => self.debug_payloads = false,
                _ => tracing::warn!("Invalid MSAL_DEBUG_PAYLOADS: {}", value),
            }
        }

        if let Ok(timeout) = std::env::var("MSAL_HTTP_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.http_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid MSAL_HTTP_TIMEOUT_SECONDS: {}", timeout);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(client_id) = &cli.client_id {
            self.client_id = Some(client_id.clone());
        }

        if let Some(tenant) = &cli.tenant {
            self.tenant = Some(tenant.clone());
        }

        if let Some(policy) = &cli.policy {
            match policy.parse() {
                Ok(value) => self.policy = value,
                Err(_) => tracing::warn!("Ignoring invalid --policy: {}", policy),
            }
        }

        if let Some(path) = &cli.session_path {
            self.session_file_path = Some(path.clone());
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`MsalAuthError::Config`] when the client id is missing, the
    /// tenant is missing for a tenant-bound policy, a route path does not
    /// start with `/`, a URL field does not parse, or the timeout is zero
    pub fn validate(&self) -> Result<()> {
        if self.client_id.as_deref().map_or(true, str::is_empty) {
            return Err(MsalAuthError::Config("client_id is required".to_string()).into());
        }

        if self.policy != Policy::AadMulti && self.tenant.as_deref().map_or(true, str::is_empty) {
            return Err(MsalAuthError::Config(format!(
                "tenant is required for policy {}",
                self.policy
            ))
            .into());
        }

        for (name, value) in [
            ("login_path", &self.login_path),
            ("token_path", &self.token_path),
            ("logout_path", &self.logout_path),
        ] {
            if !value.starts_with('/') {
                return Err(
                    MsalAuthError::Config(format!("{} must start with '/': {}", name, value))
                        .into(),
                );
            }
        }

        if let Some(redirect_uri) = &self.redirect_uri {
            Url::parse(redirect_uri).map_err(|e| {
                MsalAuthError::Config(format!("Invalid redirect_uri {}: {}", redirect_uri, e))
            })?;
        }

        if let Some(authority) = &self.authority_override {
            Url::parse(authority).map_err(|e| {
                MsalAuthError::Config(format!("Invalid authority_override {}: {}", authority, e))
            })?;
        }

        if self.http_timeout_seconds == 0 {
            return Err(MsalAuthError::Config(
                "http_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// Build the authority URL for the configured policy
    ///
    /// # Returns
    ///
    /// * single tenant: `https://login.microsoftonline.com/{tenant}`
    /// * multi tenant: `https://login.microsoftonline.com/common/`
    /// * B2C: `https://{tenant}.b2clogin.com/{tenant}.onmicrosoft.com/{policy}`
    ///   where `{policy}` is `b2c_policy` when set, else the policy value
    ///
    /// `authority_override` replaces all of the above when set.
    ///
    /// # Errors
    ///
    /// Returns [`MsalAuthError::Config`] when a tenant-bound policy has no
    /// tenant
    ///
    /// # Examples
    ///
    /// ```
    /// use msal_authcode::config::{MsalClientConfig, Policy};
    ///
    /// let config = MsalClientConfig {
    ///     tenant: Some("contoso".to_string()),
    ///     policy: Policy::B2cLogin,
    ///     ..Default::default()
    /// };
    /// assert_eq!(
    ///     config.authority().unwrap(),
    ///     "https://contoso.b2clogin.com/contoso.onmicrosoft.com/B2C_1_LOGIN"
    /// );
    /// ```
    pub fn authority(&self) -> Result<String> {
        if let Some(authority) = &self.authority_override {
            return Ok(authority.clone());
        }

        if self.policy == Policy::AadMulti {
            return Ok(format!("{}/common/", AAD_LOGIN_HOST));
        }

        let tenant = self
            .tenant
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                MsalAuthError::Config(format!("tenant is required for policy {}", self.policy))
            })?;

        if self.policy == Policy::AadSingle {
            return Ok(format!("{}/{}", AAD_LOGIN_HOST, tenant));
        }

        let policy = self
            .b2c_policy
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(self.policy.as_str());
        Ok(format!(
            "https://{tenant}.b2clogin.com/{tenant}.onmicrosoft.com/{policy}"
        ))
    }

    /// Build `{authority}/oauth2/v2.0/{leaf}`
    ///
    /// # Errors
    ///
    /// Propagates [`authority`](Self::authority) errors
    pub fn oauth_endpoint(&self, leaf: &str) -> Result<String> {
        let authority = self.authority()?;
        Ok(format!(
            "{}/oauth2/v2.0/{}",
            authority.trim_end_matches('/'),
            leaf
        ))
    }

    /// Build the provider logout URL with `post_logout_redirect_uri` set
    ///
    /// The callback is URL-encoded.
    ///
    /// # Errors
    ///
    /// Returns [`MsalAuthError::Config`] when the authority is unusable
    pub fn logout_url(&self, callback_url: &str) -> Result<String> {
        let endpoint = self.oauth_endpoint("logout")?;
        let mut url = Url::parse(&endpoint)
            .map_err(|e| MsalAuthError::Config(format!("Invalid logout endpoint URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("post_logout_redirect_uri", callback_url);
        Ok(url.to_string())
    }

    /// Full login route path
    pub fn login_full_path(&self) -> String {
        format!("{}{}", self.path_prefix, self.login_path)
    }

    /// Full token route path
    pub fn token_full_path(&self) -> String {
        format!("{}{}", self.path_prefix, self.token_path)
    }

    /// Full logout route path
    pub fn logout_full_path(&self) -> String {
        format!("{}{}", self.path_prefix, self.logout_path)
    }

    /// Directory used by the filesystem session store
    ///
    /// Falls back to `sessions/` under the user's data directory when
    /// `session_file_path` is unset.
    ///
    /// # Errors
    ///
    /// Returns [`MsalAuthError::Storage`] when no data directory can be
    /// determined for the current user
    pub fn session_directory(&self) -> Result<PathBuf> {
        if let Some(path) = &self.session_file_path {
            return Ok(path.clone());
        }

        let proj_dirs = ProjectDirs::from("com", "msal-authcode", "msal-authcode")
            .ok_or_else(|| MsalAuthError::Storage("Could not determine data directory".into()))?;

        Ok(proj_dirs.data_dir().join("sessions"))
    }
}

/// Pick the post-logout redirect target
///
/// An explicit callback wins over the `Referer` header, which wins over the
/// configured default. Empty strings count as absent.
///
/// # Examples
///
/// ```
/// use msal_authcode::config::resolve_logout_callback;
///
/// assert_eq!(
///     resolve_logout_callback(Some("https://b"), Some("https://a"), "/"),
///     "https://b"
/// );
/// assert_eq!(resolve_logout_callback(None, Some("https://a"), "/"), "https://a");
/// assert_eq!(resolve_logout_callback(None, None, "/"), "/");
/// ```
pub fn resolve_logout_callback(
    explicit: Option<&str>,
    referer: Option<&str>,
    default_path: &str,
) -> String {
    explicit
        .filter(|s| !s.is_empty())
        .or_else(|| referer.filter(|s| !s.is_empty()))
        .unwrap_or(default_path)
        .to_string()
}
