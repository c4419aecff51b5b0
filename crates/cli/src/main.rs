//! kreddig CLI - database migrations and user support tools.
//!
//! # Usage
//!
//! ```bash
//! # Run site database migrations
//! kreddig-cli migrate
//!
//! # Show the stored record for an email
//! kreddig-cli user show a@b.com
//!
//! # Give an email its confirmation links and inquiries back
//! kreddig-cli user reset a@b.com
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "kreddig-cli")]
#[command(author, version, about = "kreddig CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Inspect and support user records
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Show the record for an email
    Show {
        /// Email address
        email: String,
    },
    /// Reset confirmation link and inquiry counters
    Reset {
        /// Email address
        email: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Show { email } => commands::user::show(&email).await?,
            UserAction::Reset { email } => commands::user::reset(&email).await?,
        },
    }
    Ok(())
}
