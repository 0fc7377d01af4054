use crate::config::Config;
use crate::connection::{Connection, ConnectionStatus};
use crate::error::{AppError, Result};
use crate::sheets::SheetsOverrides;
use crate::whatsapp::MessagingOverrides;
use clap::Subcommand;
use dialoguer::Confirm;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Subcommand, Debug)]
pub enum ConnectProvider {
    /// Authorize access to Google Sheets and Drive
    Google {
        /// Client secret file from the Google Cloud console
        #[arg(long)]
        credentials_file: Option<PathBuf>,
        /// Where the user credential is cached
        #[arg(long)]
        token_file: Option<PathBuf>,
        /// Discard the cached credential and authorize again
        #[arg(long)]
        reset: bool,
    },
    /// Verify the WhatsApp Business API secrets
    Whatsapp {
        #[arg(long)]
        secrets_file: Option<PathBuf>,
        /// Entry of the phone_number_id mapping to use
        #[arg(long)]
        phone_number_key: Option<String>,
    },
}

impl ConnectProvider {
    pub async fn execute(&self) -> Result<()> {
        let mut config = Config::load()?;

        let connected = match self {
            ConnectProvider::Google {
                credentials_file,
                token_file,
                reset,
            } => {
                let mut connection = super::spreadsheet_connection(&config)?;
                let overrides = SheetsOverrides {
                    credentials_file: credentials_file.clone(),
                    token_file: token_file.clone(),
                };

                if *reset && confirm_reset(&mut connection, &overrides).await? {
                    connection.clear_token()?;
                }

                connection.connect_with(overrides).await;
                report(&connection);

                if connection.status().state() {
                    config.google.credentials_file = connection.credentials_file().to_path_buf();
                    config.google.token_file = connection.token_file().to_path_buf();
                }
                connection.status().state()
            }
            ConnectProvider::Whatsapp {
                secrets_file,
                phone_number_key,
            } => {
                let mut connection = super::messaging_connection(&config);
                connection
                    .connect_with(MessagingOverrides {
                        token_file: secrets_file.clone(),
                        phone_number_key: phone_number_key.clone(),
                    })
                    .await;
                report(&connection);

                if connection.status().state() {
                    config.whatsapp.secrets_file = connection.token_file().to_path_buf();
                    config.whatsapp.phone_number_key = connection.phone_number_key().to_string();
                }
                connection.status().state()
            }
        };

        if connected {
            config.save()?;
        }

        Ok(())
    }
}

/// Ask before discarding any cached credential, working or not
async fn confirm_reset(
    connection: &mut crate::sheets::SpreadsheetConnection,
    overrides: &SheetsOverrides,
) -> Result<bool> {
    if let Some(token_file) = &overrides.token_file {
        connection.set_token_file(token_file.clone());
    }

    connection.login().await;

    let Some(prompt) = reset_prompt(
        connection.token_file(),
        connection.token_file().exists(),
        connection.status(),
        connection.account(),
    ) else {
        return Ok(true);
    };

    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| AppError::Other(e.into()))
}

/// Confirmation text for `--reset`, or `None` when nothing is cached
fn reset_prompt(
    token_file: &Path,
    token_exists: bool,
    status: &ConnectionStatus,
    account: Option<&str>,
) -> Option<String> {
    if !token_exists {
        return None;
    }

    if status.state() {
        let account = account.unwrap_or("the current account");
        return Some(format!(
            "Google is connected as {}. Discard the saved credentials?",
            account
        ));
    }

    Some(format!(
        "Google login failed ({}). Discard the saved credentials at {}?",
        status.message(),
        token_file.display()
    ))
}

fn report(connection: &dyn Connection) {
    let status = connection.status();
    match status.state() {
        true => info!(connection = connection.name(), "{}", status.message()),
        false => warn!(connection = connection.name(), "{}", status.message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_without_cached_credential_needs_no_prompt() {
        let status = ConnectionStatus::failed("Token file not found.");

        assert_eq!(reset_prompt(Path::new("token.json"), false, &status, None), None);
    }

    #[test]
    fn test_reset_prompt_names_connected_account() {
        let status = ConnectionStatus::connected("Connected as host@restaurant.example");

        let prompt = reset_prompt(
            Path::new("token.json"),
            true,
            &status,
            Some("host@restaurant.example"),
        )
        .unwrap();

        assert!(prompt.contains("host@restaurant.example"));
    }

    #[test]
    fn test_reset_asks_when_login_fails_with_cached_credential() {
        let status = ConnectionStatus::failed(
            "An error occurred during Google login: HTTP request failed: connection refused",
        );

        let prompt = reset_prompt(Path::new("token.json"), true, &status, None)
            .expect("a cached credential should never be discarded silently");

        assert!(prompt.contains("connection refused"));
        assert!(prompt.contains("token.json"));
    }
}
