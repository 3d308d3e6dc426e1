#![forbid(unsafe_code)]

use anyhow::{bail, Context, Result};
use cacadores_auth::client::{ApiClient, AuthSession, FileSnapshotStorage, SnapshotStorage};
use cacadores_auth::{gateway, Config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Caçadores de Falhas auth gateway and client.
#[derive(Parser, Debug)]
#[command(name = "cacadores", version, about)]
struct Cli {
    /// Path to config.toml (defaults to the platform config dir)
    #[arg(long, global = true, env = "CACADORES_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for the user database and the saved session
    #[arg(long, global = true, env = "CACADORES_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the auth gateway
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create an account and save the session
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Prompted when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign in and save the session
    Login {
        #[arg(long)]
        email: String,
        /// Prompted when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Show the signed-in user after re-validating the saved token
    Whoami,
    /// Forget the saved session
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cacadores_auth=info,cacadores=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref(), cli.data_dir.as_deref())?;

    match cli.command {
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            gateway::run_gateway(&host, port, config).await
        }
        Command::Register {
            name,
            email,
            password,
        } => {
            let password = resolve_password(password, true)?;
            let session = open_session(&config)?;
            let response = session.register(&name, &email, &password).await;
            report(&response.message, response.success)?;
            if let Some(user) = session.user() {
                println!("Signed in as {} <{}> ({})", user.name, user.email, user.role);
            }
            Ok(())
        }
        Command::Login { email, password } => {
            let password = resolve_password(password, false)?;
            let session = open_session(&config)?;
            let response = session.login(&email, &password).await;
            report(&response.message, response.success)?;
            if let Some(user) = session.user() {
                println!("Signed in as {} <{}> ({})", user.name, user.email, user.role);
            }
            Ok(())
        }
        Command::Whoami => {
            let session = open_session(&config)?;
            if session.initialize().await {
                if let Some(user) = session.user() {
                    println!("{} <{}> ({}) id={}", user.name, user.email, user.role, user.id);
                }
                Ok(())
            } else {
                bail!("Not signed in. Run `cacadores login --email <email>`.");
            }
        }
        Command::Logout => {
            let session = open_session(&config)?;
            let route = session.logout();
            println!("Signed out. Sign in again via {route} or `cacadores login`.");
            Ok(())
        }
    }
}

fn open_session(config: &Config) -> Result<AuthSession> {
    let storage: Arc<dyn SnapshotStorage> =
        Arc::new(FileSnapshotStorage::new(config.client_session_dir()));
    let api = ApiClient::new(config.client.clone(), storage)
        .context("Failed to build HTTP client")?;
    Ok(AuthSession::new(api))
}

fn resolve_password(password: Option<String>, confirm: bool) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    let mut prompt = dialoguer::Password::new().with_prompt("Password");
    if confirm {
        prompt = prompt.with_confirmation("Confirm password", "Passwords do not match");
    }
    prompt.interact().context("Failed to read password")
}

fn report(message: &str, success: bool) -> Result<()> {
    if success {
        println!("✅ {message}");
        Ok(())
    } else {
        bail!("{message}")
    }
}
