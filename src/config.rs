use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_DIR_PREFIX: &str = "reservation-desk";

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub google: GoogleConfig,
    pub whatsapp: WhatsAppConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GoogleConfig {
    /// OAuth client secret downloaded from the Google Cloud console
    pub credentials_file: PathBuf,
    /// Cached user credential (access + refresh token)
    pub token_file: PathBuf,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            credentials_file: PathBuf::from("google_secrets.json"),
            token_file: PathBuf::from("google_token.json"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WhatsAppConfig {
    pub secrets_file: PathBuf,
    /// Selects one entry of the `phone_number_id` mapping in the secrets file
    pub phone_number_key: String,
    pub api_base_url: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            secrets_file: PathBuf::from("whatsapp_secrets.json"),
            phone_number_key: "test".to_string(),
            api_base_url: "https://graph.facebook.com".to_string(),
        }
    }
}

impl Config {
    /// Load the settings file, falling back to defaults when it does not exist yet
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file()?;
        let config_dir = Self::config_dir()?;

        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(&config_path)?;
            toml::from_str(&contents)
                .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            Config::default()
        };

        if config.whatsapp.phone_number_key.is_empty() {
            return Err(AppError::Config(
                "WhatsApp phone_number_key must not be empty".to_string(),
            ));
        }

        config.resolve_paths(&config_dir);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file()?;
        let contents = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(&config_path, contents)?;
        Ok(())
    }

    /// Anchor relative file paths to the config directory
    fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.google.credentials_file,
            &mut self.google.token_file,
            &mut self.whatsapp.secrets_file,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    fn xdg_dirs() -> xdg::BaseDirectories {
        xdg::BaseDirectories::with_prefix(CONFIG_DIR_PREFIX)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        let xdg_dirs = Self::xdg_dirs();
        xdg_dirs
            .place_config_file("config.toml")
            .map_err(|e| AppError::Config(format!("Failed to create config directory: {}", e)))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_file = Self::config_file()?;
        config_file
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| AppError::Config("Failed to determine config directory".to_string()))
    }
}
