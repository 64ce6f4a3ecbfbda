//! SmartDeal CLI - sign in to a SmartDeal account from the terminal.
//!
//! The token is persisted between runs (file or OS keychain, see config), so
//! `smartdeal status` after a `smartdeal login` restores the same session.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use smartdeal_core::api::client::ME_PATH;
use smartdeal_core::{
    current_auth_header, ApiError, AuthOutcome, AuthorizedClient, Config, SessionManager,
    SessionState, SessionStatus,
};

/// Password source for non-interactive use
const PASSWORD_ENV: &str = "SMARTDEAL_PASSWORD";

const USAGE: &str = "\
Usage: smartdeal <command>

Commands:
  login [email]      Sign in and remember the session
  register [email]   Create an account and sign in
  logout             Forget the stored session
  status             Verify the stored session and show who is signed in
  whoami             Ask the server who owns the stored token
  header             Print the Authorization header for the stored token

Environment:
  SMARTDEAL_API_URL        API base URL (default http://localhost:8000/api)
  SMARTDEAL_TOKEN_STORE    file | keyring
  SMARTDEAL_PASSWORD       password for login/register (skips the prompt)
  RUST_LOG                 log filter (default warn)";

#[derive(Debug, Clone, Copy)]
enum CredentialCommand {
    Login,
    Register,
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
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("status");

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };

    let session = SessionManager::from_config(&config).context("Failed to set up session")?;
    info!(api = %session.api().base_url(), command, "SmartDeal CLI starting");

    let ok = match command {
        "login" => authenticate(&session, &mut config, CredentialCommand::Login, args.get(2)).await?,
        "register" => {
            authenticate(&session, &mut config, CredentialCommand::Register, args.get(2)).await?
        }
        "logout" => {
            session.logout();
            println!("Signed out");
            true
        }
        "status" => {
            session.initialize().await;
            print_status(&session.state());
            session.status() == SessionStatus::Authenticated
        }
        "whoami" => whoami(&session).await?,
        "header" => print_header(&session),
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            true
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            false
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn authenticate(
    session: &SessionManager,
    config: &mut Config,
    command: CredentialCommand,
    email_arg: Option<&String>,
) -> Result<bool> {
    let email = match email_arg {
        Some(email) => email.clone(),
        None => prompt_email(config.last_email.as_deref())?,
    };
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => password,
        _ => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };

    let outcome = match command {
        CredentialCommand::Login => session.login(&email, &password).await?,
        CredentialCommand::Register => session.register(&email, &password).await?,
    };

    match outcome {
        AuthOutcome::Success => {
            config.last_email = Some(email);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            print_status(&session.state());
            Ok(true)
        }
        AuthOutcome::Failure { error } => {
            eprintln!("{}", error);
            Ok(false)
        }
    }
}

fn prompt_email(last_email: Option<&str>) -> Result<String> {
    match last_email {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    Ok(match (input.is_empty(), last_email) {
        (true, Some(last)) => last.to_string(),
        _ => input.to_string(),
    })
}

fn print_status(state: &SessionState) {
    match (state.status(), &state.user) {
        (SessionStatus::Authenticated, Some(user)) => {
            let since = state
                .authenticated_at
                .map(|t| t.format(" since %Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_default();
            println!("{} as {} (id {}){}", state.status().label(), user.email, user.id, since);
        }
        (status, _) => println!("{}", status.label()),
    }
}

/// Query `/auth/me` with the persisted credential, without initializing
/// the session.
async fn whoami(session: &SessionManager) -> Result<bool> {
    let client = AuthorizedClient::new(session.api().clone(), session.store());

    match client.get_json::<serde_json::Value>(ME_PATH).await {
        Ok(me) => {
            println!("{}", serde_json::to_string_pretty(&me)?);
            Ok(true)
        }
        Err(ApiError::Unauthorized) => {
            eprintln!("Not signed in");
            Ok(false)
        }
        Err(e) => Err(e).context("Failed to fetch current user"),
    }
}

fn print_header(session: &SessionManager) -> bool {
    let headers = current_auth_header(session.store().as_ref());
    match headers.values().next().and_then(|v| v.to_str().ok()) {
        Some(value) => {
            println!("Authorization: {}", value);
            true
        }
        None => false,
    }
}
