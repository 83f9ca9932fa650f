//! Tally CLI - operator tool
//!
//! Usage:
//!   tally hash-password [password]
//!   tally check-password [password]
//!   tally inspect-token <token>
//!   tally create-admin <username> <email> --first-name <name> --last-name <name>
//!   tally show-config
//!
//! Passwords are read from stdin when not given as an argument.

use anyhow::{bail, Context};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use tally_api::auth::{
    hash_password_with_config, validate_password_strength, JwtConfig, PasswordConfig,
    PgCredentialStore, TokenService,
};
use tally_core::config::AppConfig;
use tally_core::{CredentialStore, Identity, Role};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Tally identity service operator tool")]
#[command(version)]
struct Cli {
    /// TOML configuration file (default: `$TALLY_CONFIG`); environment
    /// variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash a password with the configured Argon2 parameters
    HashPassword { password: Option<String> },
    /// Check a password against the password policy
    CheckPassword { password: Option<String> },
    /// Verify a token with the configured key and print its claims
    InspectToken { token: String },
    /// Create an identity with role ADMIN in the configured database
    CreateAdmin {
        username: String,
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Print the effective configuration (the signing secret is never shown)
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(|| std::env::var_os("TALLY_CONFIG").map(PathBuf::from));
    let config = load_config(config_path.as_ref())?;

    match cli.command {
        Commands::HashPassword { password } => {
            let password = password_or_stdin(password)?;
            let hash =
                hash_password_with_config(&password, &PasswordConfig::from(&config.security))?;
            println!("{hash}");
        }
        Commands::CheckPassword { password } => {
            let password = password_or_stdin(password)?;
            match validate_password_strength(&password) {
                Ok(()) => println!("Password satisfies the policy"),
                Err(reason) => bail!(reason),
            }
        }
        Commands::InspectToken { token } => {
            let tokens = TokenService::new(JwtConfig::from(&config.security));
            let claims = tokens.decode(&token).context("token rejected")?;

            println!("subject:    {}", claims.sub);
            println!("kind:       {}", claims.kind);
            println!("issuer:     {}", claims.iss);
            println!("token id:   {}", claims.jti);
            println!("issued at:  {}", timestamp(claims.iat));
            println!("expires at: {}", timestamp(claims.exp));
        }
        Commands::CreateAdmin {
            username,
            email,
            first_name,
            last_name,
            password,
        } => {
            let password = password_or_stdin(password)?;
            validate_password_strength(&password).map_err(anyhow::Error::msg)?;

            let Some(url) = config.database.url.as_deref() else {
                bail!("DATABASE_URL is not configured");
            };
            let store = PgCredentialStore::connect(url, 1).await?;

            let hash =
                hash_password_with_config(&password, &PasswordConfig::from(&config.security))?;
            let identity = Identity::new(username, email, hash, first_name, last_name)
                .with_role(Role::Admin);
            let saved = store.save(identity).await?;

            println!("Created admin {} (id {:?})", saved.username, saved.id);
        }
        Commands::ShowConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
            if config.security.uses_development_secret() {
                eprintln!("warning: using the development signing secret");
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path.clone())?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn password_or_stdin(password: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("no password given");
    }
    Ok(password)
}

fn timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
