// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use clap::Parser;
use cli::{Cli, Commands};
use tollgate_core::auth::config::TokenConfig;
use tollgate_core::auth::jwt::TokenCodec;
use tollgate_core::auth::password::hash_password;
use tollgate_core::models::auth::Principal;

mod cli;
mod logging;

fn main() -> Result<()> {
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

/// Token settings from the environment. The CLI never generates a secret.
fn token_codec() -> Result<TokenCodec> {
    let config = TokenConfig::from_lookup(
        |key| std::env::var(key).ok(),
        String::new,
    )?;
    Ok(TokenCodec::new(&config))
}

fn run() -> Result<()> {
    let args = Cli::parse();
    logging::init(args.verbose)?;

    match &args.command {
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
        Commands::HashPassword { password } => {
            if password.is_empty() {
                return Err(Error::Custom("password must not be empty".into()));
            }
            println!("{}", hash_password(password)?);
        }
        Commands::InspectToken {
            token,
            allow_expired,
        } => {
            let codec = token_codec()?;
            let claims = if *allow_expired {
                codec.decode_access_ignoring_expiry(token)?
            } else {
                codec.decode_access(token)?
            };
            log::debug!("verified token for {}", claims.sub);
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
        Commands::IssueToken { sub, email, roles } => {
            let codec = token_codec()?;
            let principal = Principal::new(sub.as_str(), email.as_str(), roles.iter().cloned());
            let claims = codec.access_claims(&principal);
            log::info!("issuing access token for {sub} expiring at {}", claims.exp);
            println!("{}", codec.encode(&claims)?);
        }
    }

    Ok(())
}
