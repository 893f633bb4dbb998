//! Command-line interface definition for msal-authcode
//!
//! This module defines the CLI structure using clap's derive API. The binary
//! is a diagnostic companion to the library: it prints authority and login
//! URLs, decodes ID tokens, and inspects or clears stored sessions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// msal-authcode - Azure AD / B2C authorization code flow toolkit
#[derive(Parser, Debug, Clone)]
#[command(name = "msal-authcode")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/msal.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the application (client) id
    #[arg(long)]
    pub client_id: Option<String>,

    /// Override the tenant
    #[arg(long)]
    pub tenant: Option<String>,

    /// Override the policy (AAD_SINGLE, AAD_MULTI, B2C_1_LOGIN, B2C_1_PROFILE, B2C_1A_LOGIN)
    #[arg(long)]
    pub policy: Option<String>,

    /// Override the filesystem session directory
    #[arg(long)]
    pub session_path: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print the authority URL for the configured policy
    Authority,

    /// Start a login flow and print the provider authorization URL
    LoginUrl {
        /// Redirect URI registered for the application
        #[arg(short, long)]
        redirect_uri: Option<String>,

        /// Caller supplied state value
        #[arg(short, long)]
        state: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the provider logout URL
    LogoutUrl {
        /// Post-logout callback URL
        #[arg(long)]
        callback_url: Option<String>,

        /// Referer header value used when no callback is given
        #[arg(long)]
        referer: Option<String>,
    },

    /// Decode an ID token and print its claims
    Decode {
        /// The raw ID token (JWT)
        token: String,

        /// Also validate the claims against the configuration
        #[arg(long)]
        validate: bool,

        /// Expected nonce, checked during validation
        #[arg(long)]
        nonce: Option<String>,
    },

    /// Inspect stored sessions
    Session {
        /// Session subcommand
        #[command(subcommand)]
        command: SessionCommand,
    },
}

/// Session management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// Show the artifacts stored for a session
    Show {
        /// Session id
        session_id: String,
    },

    /// Remove a stored session
    Clear {
        /// Session id
        session_id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
