/*!
Command handlers for the CLI

Each submodule backs one subcommand and is a thin layer over the library:

- `authority` — print the authority and route paths
- `login`     — start a login flow, print the authorization and logout URLs
- `decode`    — decode and optionally validate an ID token
- `session`   — inspect or clear a stored session
*/

use std::sync::Arc;

use crate::config::MsalClientConfig;
use crate::error::Result;

// Authority command handler
pub mod authority {
    //! Prints the authority URL and the endpoints derived from it.

    use super::*;

    /// Print the authority, its endpoints and the route paths
    pub fn run_authority(config: &MsalClientConfig) -> Result<()> {
        let authority = config.authority()?;
        tracing::debug!(policy = %config.policy, "Resolved authority");

        println!("Authority:      {}", authority);
        println!("Authorize:      {}", config.oauth_endpoint("authorize")?);
        println!("Token:          {}", config.oauth_endpoint("token")?);
        println!("Login route:    {}", config.login_full_path());
        println!("Token route:    {}", config.token_full_path());
        println!("Logout route:   {}", config.logout_full_path());
        Ok(())
    }
}

// Login and logout URL handlers
pub mod login {
    //! Starts login flows and builds logout URLs.
    //!
    //! `login-url` stores the flow in the configured session backend, so a
    //! filesystem store keeps it for a later callback.

    use super::*;
    use crate::config::resolve_logout_callback;
    use crate::handler::AuthCodeHandler;
    use crate::session::CookieSession;

    /// Start a login flow and print where to send the user
    pub async fn run_login_url(
        config: MsalClientConfig,
        redirect_uri: Option<String>,
        state: Option<String>,
        json: bool,
    ) -> Result<()> {
        let handler = AuthCodeHandler::from_config(Arc::new(config))?;
        let mut cookie = CookieSession::new();

        let url = handler
            .authorize_redirect(&mut cookie, redirect_uri.as_deref(), state)
            .await?;
        let session_id = cookie.session_id.unwrap_or_default();

        if json {
            let output = serde_json::json!({
                "authorization_uri": url,
                "session_id": session_id,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("Session:  {}", session_id);
            println!("Login:    {}", url);
        }
        Ok(())
    }

    /// Print the provider logout URL
    pub fn run_logout_url(
        config: &MsalClientConfig,
        callback_url: Option<String>,
        referer: Option<String>,
    ) -> Result<()> {
        let callback = resolve_logout_callback(
            callback_url.as_deref(),
            referer.as_deref(),
            &config.return_to_path,
        );
        println!("{}", config.logout_url(&callback)?);
        Ok(())
    }
}

// Decode command handler
pub mod decode {
    //! Decodes ID tokens without signature checks.

    use super::*;
    use crate::client::jwt;
    use crate::validation::validate_token;

    /// Print the claims of `token` and, when asked, the validation status
    pub fn run_decode(
        config: &MsalClientConfig,
        token: &str,
        validate: bool,
        nonce: Option<String>,
    ) -> Result<()> {
        let claims = jwt::decode_claims(token, false)?;
        println!("{}", serde_json::to_string_pretty(&claims)?);

        if validate {
            let status = validate_token(
                &claims,
                config.client_id.as_deref(),
                config.issuer.as_deref(),
                nonce.as_deref(),
                None,
            );
            println!("Status: {}", status);
        }
        Ok(())
    }
}

// Session command handlers
pub mod session {
    //! Inspects stored sessions. Token secrets are never printed.

    use super::*;
    use crate::cli::SessionCommand;
    use crate::client::TokenCache;
    use crate::models::{AuthToken, FlowState};
    use crate::session::{build_backend, CookieSession, SessionManager};

    /// Dispatch a session subcommand
    pub async fn run_session(config: MsalClientConfig, command: SessionCommand) -> Result<()> {
        let backend = build_backend(&config)?;

        match command {
            SessionCommand::Show { session_id } => {
                let mut cookie = CookieSession::with_id(session_id.clone());
                let manager = SessionManager::new(&mut cookie, backend);
                show(&manager, &session_id).await
            }
            SessionCommand::Clear { session_id } => {
                let mut cookie = CookieSession::with_id(session_id.clone());
                let mut manager = SessionManager::new(&mut cookie, backend);
                manager.clear().await?;
                println!("Cleared session {}", session_id);
                Ok(())
            }
        }
    }

    async fn show(manager: &SessionManager<'_>, session_id: &str) -> Result<()> {
        let flow = manager.load::<FlowState>().await?;
        let token = manager.load::<AuthToken>().await?;
        let cache = manager.load::<TokenCache>().await?;

        if flow.is_none() && token.is_none() && cache.is_none() {
            println!("No session stored under {}", session_id);
            return Ok(());
        }

        println!("\nSession {}\n", session_id);

        if let Some(flow) = flow {
            println!("Pending login");
            println!("  Redirect URI:  {}", flow.redirect_uri);
            println!("  Scopes:        {}", flow.requested_scopes.join(" "));
        }

        if let Some(token) = token {
            println!("Token");
            match token.id_token_claims {
                Some(claims) => {
                    let user = claims.user_info();
                    println!("  User id:       {}", user.user_id.unwrap_or_default());
                    println!(
                        "  Username:      {}",
                        user.preferred_username.unwrap_or_default()
                    );
                    if let Some(expiration) = claims.expiration {
                        println!("  Expires:       {}", expiration.to_rfc3339());
                    }
                }
                None => println!("  (no decoded claims)"),
            }
        }

        if let Some(cache) = cache {
            println!("Cached accounts");
            for account in cache.accounts() {
                println!(
                    "  {}  {}",
                    account.home_account_id,
                    account.username.as_deref().unwrap_or("-")
                );
            }
        }
        println!();
        Ok(())
    }
}
