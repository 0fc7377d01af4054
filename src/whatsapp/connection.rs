use crate::connection::{Connection, ConnectionStatus, Notifier};
use crate::error::{AppError, Result};
use crate::whatsapp::types::WhatsAppSecrets;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const GRAPH_API_VERSION: &str = "v20.0";
const PROFILE_FIELDS: &str = "about,address,description,email,profile_picture_url,websites,vertical";

const SETUP_INSTRUCTIONS: &str = r#"You need to configure WhatsApp API and then create a JSON file in the format:
{
  "access_token": "[access_token]"
  "account_id": "[account_id]"
  "phone_number_id": {
    "id1": "[phone_number_id1]"
    ...
  }
}"#;

/// Per-call replacements for the stored secrets file and phone number key
#[derive(Debug, Default, Clone)]
pub struct MessagingOverrides {
    pub token_file: Option<PathBuf>,
    pub phone_number_key: Option<String>,
}

/// Session with the WhatsApp Business Cloud API
pub struct MessagingConnection {
    token_file: PathBuf,
    phone_number_key: String,
    access_token: Option<String>,
    phone_number_id: Option<String>,
    status: ConnectionStatus,
    client: Client,
    api_base_url: String,
    notifier: Arc<dyn Notifier>,
}

impl MessagingConnection {
    pub fn new(
        token_file: impl Into<PathBuf>,
        phone_number_key: impl Into<String>,
        api_base_url: impl Into<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            token_file: token_file.into(),
            phone_number_key: phone_number_key.into(),
            access_token: None,
            phone_number_id: None,
            status: ConnectionStatus::default(),
            client: Client::new(),
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            notifier,
        }
    }

    pub fn token_file(&self) -> &Path {
        &self.token_file
    }

    pub fn set_token_file(&mut self, path: impl Into<PathBuf>) {
        self.token_file = path.into();
    }

    pub fn phone_number_key(&self) -> &str {
        &self.phone_number_key
    }

    pub fn set_phone_number_key(&mut self, key: impl Into<String>) {
        self.phone_number_key = key.into();
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn phone_number_id(&self) -> Option<&str> {
        self.phone_number_id.as_deref()
    }

    fn profile_url(&self, phone_number_id: &str) -> String {
        format!(
            "{}/{}/{}/whatsapp_business_profile",
            self.api_base_url, GRAPH_API_VERSION, phone_number_id
        )
    }

    /// Validate the stored token by fetching the business profile.
    ///
    /// On success the overrides used by this call become the stored values.
    #[instrument(name = "WhatsApp login", skip_all)]
    pub async fn login_with(&mut self, overrides: MessagingOverrides) {
        let token_file = overrides.token_file.unwrap_or_else(|| self.token_file.clone());
        let phone_number_key = overrides
            .phone_number_key
            .unwrap_or_else(|| self.phone_number_key.clone());

        match self.try_login(&token_file, &phone_number_key).await {
            Ok(()) => {
                debug!(phone_number_key = %phone_number_key, "WhatsApp login successful");
                self.status = ConnectionStatus::connected("Login successful.");
                self.token_file = token_file;
                self.phone_number_key = phone_number_key;
            }
            Err(e) => {
                warn!(error = %e, "WhatsApp login failed");
                self.status = ConnectionStatus::failed(failure_message(&e));
            }
        }
    }

    async fn try_login(&mut self, token_file: &Path, phone_number_key: &str) -> Result<()> {
        self.access_token = None;
        self.phone_number_id = None;

        let secrets = WhatsAppSecrets::load(token_file)?;
        self.access_token = secrets.access_token.clone();
        self.phone_number_id = secrets.phone_number_id.get(phone_number_key).cloned();

        let (access_token, phone_number_id) = secrets.credentials_for(phone_number_key)?;

        let response = self
            .client
            .get(self.profile_url(&phone_number_id))
            .query(&[("fields", PROFILE_FIELDS)])
            .bearer_auth(&access_token)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let profile: serde_json::Value = response.json().await?;
        if profile.get("data").is_none() {
            return Err(AppError::UnexpectedResponse);
        }

        Ok(())
    }

    /// Log in, or show the secrets file layout the operator has to provide
    #[instrument(name = "WhatsApp connect", skip_all)]
    pub async fn connect_with(&mut self, overrides: MessagingOverrides) {
        self.login_with(overrides).await;

        if self.status.state() {
            info!("WhatsApp connection verified");
            self.status = ConnectionStatus::connected("WhatsApp connection successful.");
            return;
        }

        self.notifier.info("WhatsApp API", SETUP_INSTRUCTIONS);
        self.status =
            ConnectionStatus::failed("WhatsApp connection failed. Please check your credentials.");
    }
}

fn failure_message(err: &AppError) -> String {
    match err {
        AppError::SecretsNotFound(_) => "Secrets file not found.".to_string(),
        AppError::Serialization(e) => format!("Error decoding secrets file: {}", e),
        AppError::MissingSecrets => {
            "Missing access token or phone number ID in secrets file.".to_string()
        }
        AppError::UnexpectedResponse => "Unexpected response format.".to_string(),
        AppError::Api { status, body } => {
            format!("API request failed with status code {}: {}", status, body)
        }
        other => format!("An error occurred during WhatsApp login: {}", other),
    }
}

#[async_trait]
impl Connection for MessagingConnection {
    fn name(&self) -> &str {
        "Whatsapp API"
    }

    fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    async fn login(&mut self) {
        self.login_with(MessagingOverrides::default()).await;
    }

    async fn connect(&mut self) {
        self.connect_with(MessagingOverrides::default()).await;
    }
}
