use crate::error::{AppError, Result};
use crate::sheets::credentials::CredentialBundle;
use async_trait::async_trait;
use google_drive3::api::DriveHub;
use hyper_util::client::legacy::Client;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, RefreshToken, Scope, TokenUrl,
};
use reqwest::redirect::Policy;
use tiny_http::{Response, Server};
use tracing::{debug, info, instrument, warn};
use url::Url;
use yup_oauth2::ApplicationSecret;

/// Permissions requested for the reservation spreadsheet and its Drive folder
pub const GOOGLE_SCOPES: &[&str] = &[
    "openid",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];

/// Provider calls behind the spreadsheet connection
#[async_trait]
pub trait SheetsAuthProvider: Send + Sync {
    /// Run the interactive authorization flow. Blocks until the browser
    /// redirects back or the flow fails.
    async fn authorize(
        &self,
        secret: &ApplicationSecret,
        scopes: &[String],
    ) -> Result<CredentialBundle>;

    async fn refresh(&self, credential: &CredentialBundle) -> Result<CredentialBundle>;

    /// Resolve the email address of the account the credential belongs to
    async fn account_email(&self, credential: &CredentialBundle) -> Result<String>;
}

pub struct GoogleOAuth {
    http_client: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new() -> Result<Self> {
        let http_client = reqwest::ClientBuilder::new()
            .redirect(Policy::none())
            .build()
            .map_err(|e| AppError::Auth(format!("Failed to build reqwest client: {}", e)))?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl SheetsAuthProvider for GoogleOAuth {
    #[instrument(name = "Authorizing with Google", skip_all)]
    async fn authorize(
        &self,
        secret: &ApplicationSecret,
        scopes: &[String],
    ) -> Result<CredentialBundle> {
        // Let the OS pick a free port for the loopback redirect
        let server = Server::http("127.0.0.1:0")
            .map_err(|e| AppError::Auth(format!("Failed to start callback server: {}", e)))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .ok_or_else(|| AppError::Auth("Callback server has no TCP address".to_string()))?;
        let redirect_url = format!("http://localhost:{}/", port);

        let client = BasicClient::new(ClientId::new(secret.client_id.clone()))
            .set_client_secret(ClientSecret::new(secret.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(secret.auth_uri.clone())
                    .map_err(|e| AppError::Auth(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(secret.token_uri.clone())
                    .map_err(|e| AppError::Auth(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect_url)
                    .map_err(|e| AppError::Auth(format!("Invalid redirect URL: {}", e)))?,
            );

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(pkce_challenge)
            // Ask for a refresh token so later logins can renew silently
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        if let Err(e) = open::that(auth_url.as_str()) {
            warn!(error = %e, "Failed to open browser");
        }
        println!("Open this URL in your browser if it did not open automatically:\n{}", auth_url);
        println!();
        println!("Waiting for authorization...");

        let request = server
            .recv()
            .map_err(|e| AppError::Auth(format!("Failed to receive request: {}", e)))?;

        let callback = parse_callback(port, request.url(), csrf_token.secret());
        let reply = match &callback {
            Ok(_) => "Authentication successful! You can close this window.".to_string(),
            Err(e) => format!("Authentication failed: {}", e),
        };
        if let Err(e) = request.respond(Response::from_string(reply)) {
            warn!(error = %e, "Failed to answer the browser callback");
        }
        let code = callback?;

        let token_result = client
            .exchange_code(code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http_client)
            .await
            .map_err(|e| AppError::Auth(format!("Failed to exchange code: {:?}", e)))?;

        info!("Google authorization completed");

        Ok(CredentialBundle::from_token_response(
            &token_result,
            &secret.client_id,
            &secret.client_secret,
            &secret.token_uri,
            scopes,
            None,
        ))
    }

    #[instrument(name = "Refreshing Google credentials", skip_all)]
    async fn refresh(&self, credential: &CredentialBundle) -> Result<CredentialBundle> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| AppError::Auth("No refresh token available".to_string()))?;

        let client = BasicClient::new(ClientId::new(credential.client_id.clone()))
            .set_client_secret(ClientSecret::new(credential.client_secret.clone()))
            .set_token_uri(
                TokenUrl::new(credential.token_uri.clone())
                    .map_err(|e| AppError::Auth(format!("Invalid token URL: {}", e)))?,
            );

        let token_result = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| AppError::Auth(format!("Failed to refresh token: {:?}", e)))?;

        debug!("Token refresh successful");

        Ok(CredentialBundle::from_token_response(
            &token_result,
            &credential.client_id,
            &credential.client_secret,
            &credential.token_uri,
            &credential.scopes,
            Some(refresh_token),
        ))
    }

    #[instrument(name = "Looking up Google account", skip_all)]
    async fn account_email(&self, credential: &CredentialBundle) -> Result<String> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| AppError::Sheets(format!("Failed to load TLS roots: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(hyper_util::rt::TokioExecutor::new()).build(connector);
        let drive_hub = DriveHub::new(client, credential.token.clone());

        let (_, about) = drive_hub
            .about()
            .get()
            .param("fields", "user(emailAddress)")
            .doit()
            .await
            .map_err(|e| AppError::Sheets(format!("Failed to look up account: {}", e)))?;

        about
            .user
            .and_then(|user| user.email_address)
            .ok_or_else(|| AppError::Sheets("Account has no email address".to_string()))
    }
}

/// Extract the authorization code from the loopback redirect
fn parse_callback(port: u16, request_url: &str, expected_state: &str) -> Result<AuthorizationCode> {
    let callback_url = format!("http://localhost:{}{}", port, request_url);
    let url = Url::parse(&callback_url)
        .map_err(|e| AppError::Auth(format!("Failed to parse callback URL: {}", e)))?;

    let param = |name: &str| {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };

    if let Some(error) = param("error") {
        return Err(AppError::Auth(format!("Authorization denied: {}", error)));
    }

    let code = param("code").ok_or_else(|| AppError::Auth("No code in callback".to_string()))?;
    let state = param("state").ok_or_else(|| AppError::Auth("No state in callback".to_string()))?;

    if state != expected_state {
        return Err(AppError::Auth("CSRF token mismatch".to_string()));
    }

    Ok(AuthorizationCode::new(code))
}
