//! msal-authcode - Azure AD / B2C authorization code flow toolkit
//!
//! Main entry point for the diagnostic CLI.

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use msal_authcode::cli::{Cli, Commands};
use msal_authcode::commands;
use msal_authcode::config::MsalClientConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/msal.yaml");
    let config = MsalClientConfig::load(config_path, &cli)?;

    // Decoding works on the token alone; everything else needs a usable client config
    if !matches!(cli.command, Commands::Decode { validate: false, .. }) {
        config.validate()?;
    }

    match cli.command {
        Commands::Authority => commands::authority::run_authority(&config),
        Commands::LoginUrl {
            redirect_uri,
            state,
            json,
        } => {
            tracing::info!("Starting login flow");
            commands::login::run_login_url(config, redirect_uri, state, json).await
        }
        Commands::LogoutUrl {
            callback_url,
            referer,
        } => commands::login::run_logout_url(&config, callback_url, referer),
        Commands::Decode {
            token,
            validate,
            nonce,
        } => commands::decode::run_decode(&config, &token, validate, nonce),
        Commands::Session { command } => commands::session::run_session(config, command).await,
    }
}

/// Initialize the tracing subscriber
///
/// `RUST_LOG` wins when set. Logs go to stderr so command output stays
/// machine readable.
fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "msal_authcode=debug"
    } else {
        "msal_authcode=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
