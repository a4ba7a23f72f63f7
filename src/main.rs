//! Macrochat sync - real-time sync client for the Macrochat platform
//!
//! Keeps a local view of connections, departments, contacts, agents and
//! calls, and streams chat and call events from the push service.

mod api;
mod auth;
mod cache;
mod commands;
mod config;
mod engine;
mod error;
mod events;
mod models;
mod normalize;
mod push;
mod reconcile;
#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "macrochat-sync")]
#[command(about = "Real-time sync client for Macrochat", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with account credentials
    Login {
        #[arg(short, long)]
        email: String,

        /// Read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,

        /// Log in again even if a session is stored
        #[arg(short, long)]
        force: bool,
    },

    /// Log out and clear the stored session
    Logout,

    /// Show current authentication status
    Status,

    /// Stream chat and call events until Ctrl+C
    Watch,

    /// List calls from the last day, or one call by id
    Calls {
        #[arg(long)]
        id: Option<i64>,
    },

    /// Send a message
    Send {
        /// Phone number or chat id
        #[arg(short, long)]
        to: String,

        /// Message content
        message: String,

        /// Connection id (defaults to the first active connection)
        #[arg(short, long)]
        connection: Option<i64>,
    },

    /// Transfer a call to another department or agent
    Transfer {
        call_id: i64,

        #[arg(short, long)]
        department: i64,

        #[arg(short, long)]
        agent: Option<i64>,
    },

    /// Close a call
    Close {
        call_id: i64,

        /// Do not notify the contact
        #[arg(short, long)]
        silent: bool,
    },

    /// Show remote details for a phone number
    ContactInfo { phone: String },

    /// Save a contact name for a phone number
    RegisterContact { phone: String, name: String },

    /// Download the media attached to a message
    Media {
        message_id: i64,

        #[arg(short, long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Login {
            email,
            password,
            force,
        } => {
            auth::login(&email, password, force).await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout().await?;
        }
        Commands::Status => {
            auth::status().await?;
        }
        Commands::Watch => {
            commands::watch().await?;
        }
        Commands::Calls { id } => {
            tracing::info!("Fetching calls...");
            commands::list_calls(id).await?;
        }
        Commands::Send {
            to,
            message,
            connection,
        } => {
            commands::send(to, message, connection).await?;
        }
        Commands::Transfer {
            call_id,
            department,
            agent,
        } => {
            commands::transfer(call_id, department, agent).await?;
        }
        Commands::Close { call_id, silent } => {
            commands::close(call_id, silent).await?;
        }
        Commands::ContactInfo { phone } => {
            commands::contact_info(&phone).await?;
        }
        Commands::RegisterContact { phone, name } => {
            commands::register_contact(&phone, &name).await?;
        }
        Commands::Media { message_id, out } => {
            commands::media(message_id, &out).await?;
        }
    }

    Ok(())
}
