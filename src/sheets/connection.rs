use crate::connection::{Connection, ConnectionStatus, Notifier};
use crate::error::{AppError, Result};
use crate::sheets::auth::{GOOGLE_SCOPES, GoogleOAuth, SheetsAuthProvider};
use crate::sheets::credentials::CredentialBundle;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const BROWSER_PROMPT: &str =
    "You are going to be prompted in the browser.\nFollow the instructions and authorize the app.";

/// Per-call replacements for the stored file paths
#[derive(Debug, Default, Clone)]
pub struct SheetsOverrides {
    pub credentials_file: Option<PathBuf>,
    pub token_file: Option<PathBuf>,
}

/// OAuth session with Google Sheets and Drive
pub struct SpreadsheetConnection<A = GoogleOAuth> {
    credentials_file: PathBuf,
    token_file: PathBuf,
    scopes: Vec<String>,
    credential: Option<CredentialBundle>,
    account: Option<String>,
    status: ConnectionStatus,
    auth: A,
    notifier: Arc<dyn Notifier>,
}

impl SpreadsheetConnection<GoogleOAuth> {
    pub fn new(
        credentials_file: impl Into<PathBuf>,
        token_file: impl Into<PathBuf>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        Ok(Self::with_provider(
            credentials_file,
            token_file,
            GoogleOAuth::new()?,
            notifier,
        ))
    }
}

impl<A: SheetsAuthProvider> SpreadsheetConnection<A> {
    pub fn with_provider(
        credentials_file: impl Into<PathBuf>,
        token_file: impl Into<PathBuf>,
        auth: A,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            credentials_file: credentials_file.into(),
            token_file: token_file.into(),
            scopes: GOOGLE_SCOPES.iter().map(|s| s.to_string()).collect(),
            credential: None,
            account: None,
            status: ConnectionStatus::default(),
            auth,
            notifier,
        }
    }

    pub fn credentials_file(&self) -> &Path {
        &self.credentials_file
    }

    pub fn set_credentials_file(&mut self, path: impl Into<PathBuf>) {
        self.credentials_file = path.into();
    }

    pub fn token_file(&self) -> &Path {
        &self.token_file
    }

    pub fn set_token_file(&mut self, path: impl Into<PathBuf>) {
        self.token_file = path.into();
    }

    pub fn credential(&self) -> Option<&CredentialBundle> {
        self.credential.as_ref()
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    #[instrument(name = "Google login", skip_all)]
    pub async fn login_with(&mut self, overrides: SheetsOverrides) {
        let token_file = overrides.token_file.unwrap_or_else(|| self.token_file.clone());

        self.status = match self.try_login(&token_file).await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Google login failed");
                self.account = None;
                ConnectionStatus::failed(format!("An error occurred during Google login: {}", e))
            }
        };
    }

    async fn try_login(&mut self, token_file: &Path) -> Result<ConnectionStatus> {
        let Some(credential) = CredentialBundle::load(token_file)? else {
            debug!(path = ?token_file, "No cached Google credentials");
            self.credential = None;
            self.account = None;
            return Ok(ConnectionStatus::failed("Token file not found."));
        };

        if credential.is_valid() {
            let account = self.auth.account_email(&credential).await?;
            let status = ConnectionStatus::connected(format!("Connected as {}", account));
            self.credential = Some(credential);
            self.account = Some(account);
            return Ok(status);
        }

        // Only a login that reaches the account lookup knows who is signed in
        self.account = None;

        if !credential.has_refresh_token() {
            self.credential = Some(credential);
            return Ok(ConnectionStatus::failed(
                "Cached credentials expired and no refresh token is available.",
            ));
        }

        debug!("Access token expired, refreshing...");
        let refreshed = self.auth.refresh(&credential).await?;
        refreshed.save(token_file)?;
        self.credential = Some(refreshed);

        Ok(ConnectionStatus::connected("Successfully refreshed credentials."))
    }

    /// Log in, falling back to the interactive browser flow.
    ///
    /// An already valid session is reported without authorizing again. On
    /// success the paths used by this call become the stored ones.
    #[instrument(name = "Google connect", skip_all)]
    pub async fn connect_with(&mut self, overrides: SheetsOverrides) {
        let credentials_file = overrides
            .credentials_file
            .unwrap_or_else(|| self.credentials_file.clone());
        let token_file = overrides.token_file.unwrap_or_else(|| self.token_file.clone());

        self.login_with(SheetsOverrides {
            credentials_file: Some(credentials_file.clone()),
            token_file: Some(token_file.clone()),
        })
        .await;

        if self.status.state() {
            let message = match &self.account {
                Some(account) => format!("Successfully connected to Google as {}.", account),
                None => "Successfully connected to Google.".to_string(),
            };
            self.notifier.info("Google Connection", &message);
            self.adopt_paths(credentials_file, token_file);
            return;
        }

        self.notifier.info("OAuth Login", BROWSER_PROMPT);

        match self.authorize(&credentials_file, &token_file).await {
            Ok(account) => {
                info!(account = %account, "Google account connected");
                self.status = ConnectionStatus::connected(format!("Connected as {}", account));
                self.adopt_paths(credentials_file, token_file);
            }
            Err(e) => {
                warn!(error = %e, "Google authorization failed");
                self.status = ConnectionStatus::failed(format!(
                    "An error occurred during Google login: {}",
                    e
                ));
                self.notifier.error("OAuth Error", self.status.message());
            }
        }
    }

    async fn authorize(&mut self, credentials_file: &Path, token_file: &Path) -> Result<String> {
        let secret = yup_oauth2::read_application_secret(credentials_file)
            .await
            .map_err(|e| {
                AppError::Auth(format!(
                    "Failed to read client secret file {:?}: {}",
                    credentials_file, e
                ))
            })?;

        let credential = self.auth.authorize(&secret, &self.scopes).await?;
        credential.save(token_file)?;
        info!(path = ?token_file, "Saved Google credentials");

        // The token is already cached, so a failed lookup can be retried by a plain login
        let account = self.auth.account_email(&credential).await?;
        self.credential = Some(credential);
        self.account = Some(account.clone());

        Ok(account)
    }

    fn adopt_paths(&mut self, credentials_file: PathBuf, token_file: PathBuf) {
        self.credentials_file = credentials_file;
        self.token_file = token_file;
    }

    /// Delete the cached credential so the next connect authorizes again
    #[instrument(name = "Clearing auth tokens for Google Sheets", skip_all)]
    pub fn clear_token(&mut self) -> Result<()> {
        self.credential = None;
        self.account = None;
        self.status = ConnectionStatus::default();

        if !self.token_file.exists() {
            debug!("No Google Sheets tokens to clear");
            return Ok(());
        }

        fs::remove_file(&self.token_file)
            .map_err(|e| AppError::Auth(format!("Failed to delete tokens file: {}", e)))?;
        info!("Cleared Google Sheets cached tokens");

        Ok(())
    }
}

#[async_trait]
impl<A: SheetsAuthProvider> Connection for SpreadsheetConnection<A> {
    fn name(&self) -> &str {
        "Google API"
    }

    fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    async fn login(&mut self) {
        self.login_with(SheetsOverrides::default()).await;
    }

    async fn connect(&mut self) {
        self.connect_with(SheetsOverrides::default()).await;
    }
}


#[cfg(test)]
mod tests {
    use super::mocks::{MockSheetsAuth, write_client_secret};
    use super::*;
    use crate::connection::test_helpers::{Dialog, RecordingNotifier};
    use crate::sheets::credentials::test_helpers::mock_credential;
    use chrono::Duration;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        notifier: Arc<RecordingNotifier>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                notifier: Arc::new(RecordingNotifier::default()),
            }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn connection(&self, auth: MockSheetsAuth) -> SpreadsheetConnection<MockSheetsAuth> {
            SpreadsheetConnection::with_provider(
                self.path("client_secret.json"),
                self.path("token.json"),
                auth,
                self.notifier.clone(),
            )
        }
    }

    #[tokio::test]
    async fn test_login_without_token_file() {
        let fixture = Fixture::new();
        let (auth, calls) = MockSheetsAuth::new();
        let mut connection = fixture.connection(auth);

        connection.login().await;

        assert!(!connection.status().state());
        assert!(connection.status().message().contains("not found"));
        let calls = calls.lock().unwrap();
        assert_eq!(
            (calls.authorize, calls.refresh, calls.account_email),
            (0, 0, 0),
            "no provider call should be made without a cached token"
        );
    }

    #[tokio::test]
    async fn test_login_with_valid_token() {
        let fixture = Fixture::new();
        mock_credential(Duration::hours(1), None)
            .save(&fixture.path("token.json"))
            .unwrap();
        let (auth, calls) = MockSheetsAuth::new();
        let mut connection = fixture.connection(auth);

        assert!(connection.get_state().await);
        assert_eq!(connection.status().message(), "Connected as host@restaurant.example");
        assert_eq!(connection.account(), Some("host@restaurant.example"));
        assert_eq!(calls.lock().unwrap().refresh, 0);
    }

    #[tokio::test]
    async fn test_login_refreshes_expired_token() {
        let fixture = Fixture::new();
        let token_file = fixture.path("token.json");
        mock_credential(-Duration::hours(2), Some("1//refresh"))
            .save(&token_file)
            .unwrap();
        let (auth, calls) = MockSheetsAuth::new();
        let mut connection = fixture.connection(auth);

        connection.login().await;

        assert!(connection.status().state());
        assert_eq!(connection.status().message(), "Successfully refreshed credentials.");

        let persisted = CredentialBundle::load(&token_file).unwrap().unwrap();
        assert_eq!(persisted.token, "ya29.refreshed");
        assert_eq!(persisted.refresh_token.as_deref(), Some("1//refresh"));

        // The renewed credential is picked up without another refresh
        connection.login().await;
        assert_eq!(connection.status().message(), "Connected as host@restaurant.example");
        assert_eq!(calls.lock().unwrap().refresh, 1);
    }

    #[tokio::test]
    async fn test_login_expired_without_refresh_token() {
        let fixture = Fixture::new();
        mock_credential(-Duration::hours(2), None)
            .save(&fixture.path("token.json"))
            .unwrap();
        let (auth, calls) = MockSheetsAuth::new();
        let mut connection = fixture.connection(auth);

        assert!(!connection.get_state().await);
        assert!(connection.status().message().contains("no refresh token"));
        assert_eq!(calls.lock().unwrap().refresh, 0);
    }

    #[tokio::test]
    async fn test_login_with_corrupt_token_file() {
        let fixture = Fixture::new();
        fs::write(fixture.path("token.json"), "{ truncated").unwrap();
        let (auth, _calls) = MockSheetsAuth::new();
        let mut connection = fixture.connection(auth);

        let message = connection.get_message().await;

        assert!(!connection.status().state());
        assert!(message.starts_with("An error occurred during Google login:"));
    }

    #[tokio::test]
    async fn test_login_fails_when_account_lookup_fails() {
        let fixture = Fixture::new();
        mock_credential(Duration::hours(1), None)
            .save(&fixture.path("token.json"))
            .unwrap();
        let (mut auth, _calls) = MockSheetsAuth::new();
        auth.fail_account_lookup = true;
        let mut connection = fixture.connection(auth);

        connection.login().await;

        assert!(!connection.status().state());
        assert!(connection.status().message().contains("Failed to look up account"));
        assert_eq!(connection.account(), None);
    }

    #[tokio::test]
    async fn test_login_reports_refresh_failure() {
        let fixture = Fixture::new();
        let token_file = fixture.path("token.json");
        mock_credential(-Duration::hours(2), Some("1//revoked"))
            .save(&token_file)
            .unwrap();
        let before = fs::read_to_string(&token_file).unwrap();
        let (mut auth, calls) = MockSheetsAuth::new();
        auth.fail_refresh = true;
        let mut connection = fixture.connection(auth);

        connection.login().await;

        assert!(!connection.status().state());
        assert!(
            connection
                .status()
                .message()
                .starts_with("An error occurred during Google login:")
        );
        assert!(connection.status().message().contains("invalid_grant"));
        assert_eq!(calls.lock().unwrap().refresh, 1);
        assert_eq!(fs::read_to_string(&token_file).unwrap(), before);
    }

    #[tokio::test]
    async fn test_login_forgets_account_when_switching_to_expired_token() {
        let fixture = Fixture::new();
        mock_credential(Duration::hours(1), None)
            .save(&fixture.path("token.json"))
            .unwrap();
        let other_token = fixture.path("other_token.json");
        mock_credential(-Duration::hours(2), Some("1//refresh"))
            .save(&other_token)
            .unwrap();
        let (auth, _calls) = MockSheetsAuth::new();
        let mut connection = fixture.connection(auth);

        connection.login().await;
        assert_eq!(connection.account(), Some("host@restaurant.example"));

        connection
            .login_with(SheetsOverrides {
                credentials_file: None,
                token_file: Some(other_token),
            })
            .await;

        assert_eq!(connection.status().message(), "Successfully refreshed credentials.");
        assert_eq!(connection.account(), None);
    }

    #[tokio::test]
    async fn test_login_forgets_account_after_failure() {
        let fixture = Fixture::new();
        mock_credential(Duration::hours(1), None)
            .save(&fixture.path("token.json"))
            .unwrap();
        let (auth, _calls) = MockSheetsAuth::new();
        let mut connection = fixture.connection(auth);

        connection.login().await;
        assert!(connection.account().is_some());

        fs::write(fixture.path("token.json"), "{ truncated").unwrap();
        connection.login().await;

        assert!(!connection.status().state());
        assert_eq!(connection.account(), None);
    }

    #[tokio::test]
    async fn test_connect_authorizes_once() {
        let fixture = Fixture::new();
        write_client_secret(&fixture.path("client_secret.json"));
        let (auth, calls) = MockSheetsAuth::new();
        let mut connection = fixture.connection(auth);

        connection.connect().await;

        assert!(connection.status().state());
        assert_eq!(connection.status().message(), "Connected as host@restaurant.example");
        let persisted = CredentialBundle::load(&fixture.path("token.json")).unwrap().unwrap();
        assert_eq!(persisted.client_id, "client-id.apps.googleusercontent.com");
        assert_eq!(persisted.scopes, GOOGLE_SCOPES);
        assert_eq!(connection.credential(), Some(&persisted));

        connection.connect().await;

        assert!(connection.status().state());
        assert_eq!(
            calls.lock().unwrap().authorize,
            1,
            "an already valid session should not be authorized again"
        );
        assert_eq!(
            fixture.notifier.titles(),
            vec!["OAuth Login", "Google Connection"]
        );
    }

    #[tokio::test]
    async fn test_connect_reports_authorization_failure() {
        let fixture = Fixture::new();
        write_client_secret(&fixture.path("client_secret.json"));
        let (mut auth, _calls) = MockSheetsAuth::new();
        auth.fail_authorize = true;
        let mut connection = fixture.connection(auth);

        connection.connect().await;

        assert!(!connection.status().state());
        assert!(connection.status().message().contains("access_denied"));
        assert!(!fixture.path("token.json").exists());

        let dialogs = fixture.notifier.dialogs.lock().unwrap();
        assert_eq!(
            dialogs.last(),
            Some(&Dialog::Error(
                "OAuth Error".to_string(),
                connection.status().message().to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_connect_with_missing_client_secret() {
        let fixture = Fixture::new();
        let (auth, calls) = MockSheetsAuth::new();
        let mut connection = fixture.connection(auth);
        connection.set_credentials_file(fixture.path("absent.json"));

        connection.connect().await;

        assert!(!connection.status().state());
        assert!(connection.status().message().contains("client secret file"));
        assert_eq!(calls.lock().unwrap().authorize, 0);
    }

    #[tokio::test]
    async fn test_connect_adopts_path_overrides_on_success() {
        let fixture = Fixture::new();
        let credentials_file = fixture.path("other_secret.json");
        let token_file = fixture.path("other_token.json");
        write_client_secret(&credentials_file);
        let (auth, _calls) = MockSheetsAuth::new();
        let mut connection = fixture.connection(auth);

        connection
            .connect_with(SheetsOverrides {
                credentials_file: Some(credentials_file.clone()),
                token_file: Some(token_file.clone()),
            })
            .await;

        assert!(connection.status().state());
        assert_eq!(connection.credentials_file(), credentials_file);
        assert_eq!(connection.token_file(), token_file);
        assert!(token_file.exists());
        assert!(!fixture.path("token.json").exists());
    }

    #[tokio::test]
    async fn test_connect_keeps_paths_on_failure() {
        let fixture = Fixture::new();
        let (mut auth, _calls) = MockSheetsAuth::new();
        auth.fail_authorize = true;
        let mut connection = fixture.connection(auth);
        write_client_secret(&fixture.path("other_secret.json"));

        connection
            .connect_with(SheetsOverrides {
                credentials_file: Some(fixture.path("other_secret.json")),
                token_file: None,
            })
            .await;

        assert!(!connection.status().state());
        assert_eq!(connection.credentials_file(), fixture.path("client_secret.json"));
    }

    #[tokio::test]
    async fn test_clear_token_forces_reauthorization() {
        let fixture = Fixture::new();
        write_client_secret(&fixture.path("client_secret.json"));
        let (auth, calls) = MockSheetsAuth::new();
        let mut connection = fixture.connection(auth);

        connection.connect().await;
        connection.clear_token().unwrap();

        assert!(!fixture.path("token.json").exists());
        assert!(!connection.get_state().await);

        connection.connect().await;
        assert!(connection.status().state());
        assert_eq!(calls.lock().unwrap().authorize, 2);
    }
}
