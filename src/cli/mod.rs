mod connect;
mod show;
mod status;

use crate::config::Config;
use crate::connection::{Notifier, TerminalNotifier};
use crate::error::Result;
use crate::sheets::SpreadsheetConnection;
use crate::whatsapp::MessagingConnection;
use clap::{Parser, Subcommand};
use std::sync::Arc;

pub use connect::ConnectProvider;
pub use show::ShowResource;

#[derive(Parser, Debug)]
#[command(name = "reservation-desk")]
#[command(about = "Manage the Google Sheets and WhatsApp connections of the reservation desk", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Status => status::execute().await,
            Commands::Connect { provider } => provider.execute().await,
            Commands::Show { resource } => resource.execute().await,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check both connections and print their status
    Status,
    /// Connect a provider, prompting for authorization when needed
    Connect {
        #[command(subcommand)]
        provider: ConnectProvider,
    },
    Show {
        #[command(subcommand)]
        resource: ShowResource,
    },
}

fn spreadsheet_connection(config: &Config) -> Result<SpreadsheetConnection> {
    SpreadsheetConnection::new(
        &config.google.credentials_file,
        &config.google.token_file,
        notifier(),
    )
}

fn messaging_connection(config: &Config) -> MessagingConnection {
    MessagingConnection::new(
        &config.whatsapp.secrets_file,
        config.whatsapp.phone_number_key.clone(),
        config.whatsapp.api_base_url.clone(),
        notifier(),
    )
}

fn notifier() -> Arc<dyn Notifier> {
    Arc::new(TerminalNotifier)
}
