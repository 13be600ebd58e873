use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tollgate_cli", version, about = "Tollgate operator tools")]
pub struct Cli {
    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the CLI version.
    Version,

    /// Print a bcrypt hash for a password.
    HashPassword {
        password: String,
    },

    /// Verify an access token and print its claims as JSON.
    ///
    /// Signing settings are read from `JWT_SECRET`, `JWT_ALGORITHM`, etc.
    InspectToken {
        token: String,

        /// Print claims even if the token has expired.
        #[arg(long, default_value_t = false)]
        allow_expired: bool,
    },

    /// Sign an access token for a principal (no refresh token is stored).
    IssueToken {
        /// Subject (user ID).
        #[arg(long)]
        sub: String,

        #[arg(long)]
        email: String,

        /// Role name; repeat for several roles.
        #[arg(long = "role")]
        roles: Vec<String>,
    },
}
