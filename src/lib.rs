//! msal-authcode - OAuth2 authorization code flow for Azure AD / B2C
//!
//! This library implements the client side of the authorization code flow:
//! session-bound flow state, a per-session token cache, and ID token claim
//! validation. Route registration and the HTTP server belong to the host
//! application.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: session backends and the typed [`SessionManager`]
//! - `client`: the [`IdentityClient`] seam and its HTTP implementation
//! - `validation`: pure claim validation producing a [`TokenStatus`]
//! - `handler`: the auth-code state machine, [`AuthCodeHandler`]
//! - `scheme`: per-request authentication from a bearer header or session
//! - `models`: tokens, claims, flow state and accounts
//! - `config`: configuration management and authority construction
//! - `error`: error types and result aliases
//! - `cli`, `commands`: the diagnostic command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use msal_authcode::{AuthCodeHandler, CookieSession, MsalClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = MsalClientConfig::from_file("config/msal.yaml")?;
//!     config.validate()?;
//!
//!     let handler = AuthCodeHandler::from_config(Arc::new(config))?;
//!     let mut cookie = CookieSession::new();
//!     let login_url = handler.authorize_redirect(&mut cookie, None, None).await?;
//!     println!("{}", login_url);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod handler;
pub mod models;
pub mod scheme;
pub mod session;
pub mod validation;

// Re-export commonly used types
pub use client::{ConfidentialClient, IdentityClient, TokenCache};
pub use config::{MsalClientConfig, Policy, SessionType};
pub use error::{MsalAuthError, Result};
pub use handler::{AuthCodeHandler, AuthFlowState};
pub use models::{AuthToken, BearerToken, FlowState, IDTokenClaims, LocalAccount, UserInfo};
pub use scheme::MsalScheme;
pub use session::{CookieSession, SessionBackend, SessionManager};
pub use validation::{validate_token, TokenStatus};
