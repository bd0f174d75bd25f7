//! sessionkit - command-line front end for an authenticated API session.
//!
//! Logs in against the token endpoint, keeps the session in durable storage
//! between runs, and sends authenticated requests that refresh an expired
//! access token on their own.

mod commands;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sessionkit_core::{AuthClient, Config, HttpTransport, LoginRedirect, SessionStore, StorageBackend};

#[derive(Parser)]
#[command(name = "sessionkit", version, about = "Authenticated API session from the command line")]
struct Cli {
    /// API base URL (overrides the config file)
    #[arg(long, global = true, env = "SESSIONKIT_BASE_URL")]
    base_url: Option<String>,

    /// Session storage backend: file, keyring or memory
    #[arg(long, global = true, env = "SESSIONKIT_STORAGE")]
    storage: Option<StorageBackend>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store the session
    Login {
        /// Username (defaults to the last one used)
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Clear the stored session
    Logout,
    /// Fetch the current user profile from the server
    Whoami,
    /// Show the stored session without contacting the server
    Status,
    /// Send an authenticated GET request
    Get { path: String },
    /// Send an authenticated POST request with a JSON body
    Post { path: String, body: String },
    /// Send an authenticated DELETE request
    Delete { path: String },
}

/// Tells the user to log in again once the refresh token is rejected
struct CliRedirect;

impl LoginRedirect for CliRedirect {
    fn redirect_to_login(&self, login_path: &str) {
        eprintln!(
            "Session expired ({}). Run `sessionkit login` to sign in again.",
            login_path
        );
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(storage) = cli.storage {
        config.storage = storage;
    }
    info!(base_url = %config.base_url, storage = ?config.storage, "sessionkit starting");

    let transport = Arc::new(HttpTransport::with_timeout(
        &config.base_url,
        config.request_timeout(),
    )?);
    let session = SessionStore::restore(config.open_storage()?, transport.clone());
    let client = AuthClient::builder(transport, session.clone())
        .redirect(Arc::new(CliRedirect))
        .login_path(config.login_path.clone())
        .build();

    match cli.command {
        Command::Login { username } => commands::login(&mut config, &session, username).await,
        Command::Logout => {
            commands::logout(&session);
            Ok(())
        }
        Command::Whoami => commands::whoami(&session).await,
        Command::Status => commands::status(&session),
        Command::Get { path } => commands::get(&client, &path).await,
        Command::Post { path, body } => commands::post(&client, &path, &body).await,
        Command::Delete { path } => commands::delete(&client, &path).await,
    }
}
