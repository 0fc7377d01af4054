use crate::error::{AppError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Contents of the locally stored WhatsApp secrets file
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct WhatsAppSecrets {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    /// Phone number IDs keyed by a short name, so several numbers can be configured
    #[serde(default)]
    pub phone_number_id: HashMap<String, String>,
}

impl WhatsAppSecrets {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AppError::SecretsNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_str(&contents)?)
    }

    /// Access token and phone number ID for `phone_number_key`, when both are set
    pub fn credentials_for(&self, phone_number_key: &str) -> Result<(String, String)> {
        let access_token = self.access_token.as_deref().filter(|t| !t.is_empty());
        let phone_number_id = self
            .phone_number_id
            .get(phone_number_key)
            .map(String::as_str)
            .filter(|id| !id.is_empty());

        match (access_token, phone_number_id) {
            (Some(token), Some(id)) => Ok((token.to_string(), id.to_string())),
            _ => Err(AppError::MissingSecrets),
        }
    }
}
