use crate::error::{AppError, Result};
use chrono::{DateTime, Duration, Utc};
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Tokens are treated as expired slightly before the provider would reject them
const EXPIRY_SKEW_SECS: i64 = 10;

// Access tokens issued without an explicit lifetime last an hour on Google
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

// Longer lifetimes are capped so the expiry stays representable
const MAX_EXPIRES_IN_SECS: i64 = 365 * 24 * 3600;

/// Cached Google user credential, stored in the authorized-user JSON layout
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CredentialBundle {
    pub token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl CredentialBundle {
    /// Build a bundle from a token endpoint response.
    ///
    /// Refresh responses usually omit the refresh token, in which case
    /// `previous_refresh_token` is carried over.
    pub fn from_token_response(
        response: &BasicTokenResponse,
        client_id: &str,
        client_secret: &str,
        token_uri: &str,
        requested_scopes: &[String],
        previous_refresh_token: Option<&str>,
    ) -> Self {
        let refresh_token = response
            .refresh_token()
            .map(|t| t.secret().clone())
            .or_else(|| previous_refresh_token.map(str::to_string));

        let expires_in = response
            .expires_in()
            .map(|d| {
                i64::try_from(d.as_secs())
                    .unwrap_or(MAX_EXPIRES_IN_SECS)
                    .min(MAX_EXPIRES_IN_SECS)
            })
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        let scopes = match response.scopes() {
            Some(granted) => granted.iter().map(|s| (**s).clone()).collect(),
            None => requested_scopes.to_vec(),
        };

        Self {
            token: response.access_token().secret().clone(),
            refresh_token,
            token_uri: token_uri.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scopes,
            expiry: Some(Utc::now() + Duration::seconds(expires_in)),
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS) >= expiry,
            None => false,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.token.is_empty() && !self.is_expired()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Returns `None` when no credential has been cached at `path` yet
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| AppError::Auth(format!("Failed to read token file: {}", e)))?;

        let bundle: CredentialBundle = serde_json::from_str(&contents)
            .map_err(|e| AppError::Auth(format!("Failed to parse token file: {}", e)))?;

        Ok(Some(bundle))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Auth(format!("Failed to create token directory: {}", e))
            })?;
        }

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Auth(format!("Failed to serialize credentials: {}", e)))?;

        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(path)
            .map_err(|e| AppError::Auth(format!("Failed to create token file: {}", e)))?;

        file.write_all(contents.as_bytes())
            .map_err(|e| AppError::Auth(format!("Failed to write token file: {}", e)))?;

        Ok(())
    }
}
