use crate::domain::models::OAuthToken;
use crate::infrastructure::calendar_sink::AccessTokenProvider;
use crate::infrastructure::config::GoogleConfig;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::oauth_client::{OAuthClientCredentials, OAuthHttpClient, OAuthTokenResponse};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

const DEFAULT_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_LEEWAY_SECONDS: i64 = 60;

#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub credentials: OAuthClientCredentials,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub authorization_endpoint: String,
    /// Refresh token supplied through configuration; used when the keyring
    /// holds nothing usable.
    pub seed_refresh_token: Option<String>,
}

impl OAuthSettings {
    pub fn from_google_config(config: &GoogleConfig) -> Self {
        Self {
            credentials: OAuthClientCredentials {
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
            },
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            authorization_endpoint: DEFAULT_AUTHORIZATION_ENDPOINT.to_string(),
            seed_refresh_token: config.refresh_token.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureTokenResult {
    Existing(OAuthToken),
    Refreshed(OAuthToken),
    ReauthenticationRequired,
}

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct GoogleAuthenticator<S, C>
where
    S: CredentialStore,
    C: OAuthHttpClient,
{
    settings: OAuthSettings,
    credential_store: Arc<S>,
    oauth_client: Arc<C>,
    now_provider: NowProvider,
}

impl<S, C> GoogleAuthenticator<S, C>
where
    S: CredentialStore,
    C: OAuthHttpClient,
{
    pub fn new(settings: OAuthSettings, credential_store: Arc<S>, oauth_client: Arc<C>) -> Self {
        Self {
            settings,
            credential_store,
            oauth_client,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn build_authorization_url(&self, state: &str) -> Result<String, InfraError> {
        if state.trim().is_empty() {
            return Err(InfraError::OAuth("state must not be empty".to_string()));
        }
        if self.settings.scopes.is_empty() {
            return Err(InfraError::OAuth("at least one scope is required".to_string()));
        }

        let mut url = Url::parse(&self.settings.authorization_endpoint)
            .map_err(|error| InfraError::OAuth(format!("invalid authorization endpoint: {error}")))?;
        let scope = self.settings.scopes.join(" ");

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.settings.credentials.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_uri)
            .append_pair("scope", &scope)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);

        Ok(url.to_string())
    }

    pub async fn authenticate_with_code(&self, authorization_code: &str) -> Result<OAuthToken, InfraError> {
        let authorization_code = authorization_code.trim();
        if authorization_code.is_empty() {
            return Err(InfraError::OAuth("authorization code must not be empty".to_string()));
        }

        let response = self
            .oauth_client
            .exchange_authorization_code(
                &self.settings.credentials,
                &self.settings.redirect_uri,
                authorization_code,
            )
            .await?;

        let token = self.token_from_response(response, None);
        self.credential_store.save_token(&token)?;
        info!(has_refresh_token = token.refresh_token.is_some(), "stored google oauth token");
        Ok(token)
    }

    /// A stored, still-valid token is reused; otherwise the stored refresh
    /// token (or the configured one) is exchanged for a new access token.
    pub async fn ensure_access_token(&self) -> Result<EnsureTokenResult, InfraError> {
        let stored = self.credential_store.load_token()?;
        if let Some(token) = stored.as_ref() {
            if token.is_valid_at((self.now_provider)(), TOKEN_LEEWAY_SECONDS) {
                return Ok(EnsureTokenResult::Existing(token.clone()));
            }
        }

        let refresh_token = stored
            .and_then(|token| token.refresh_token)
            .or_else(|| self.settings.seed_refresh_token.clone())
            .filter(|value| !value.trim().is_empty());
        let Some(refresh_token) = refresh_token else {
            return Ok(EnsureTokenResult::ReauthenticationRequired);
        };

        match self
            .oauth_client
            .refresh_access_token(&self.settings.credentials, &refresh_token)
            .await
        {
            Ok(response) => {
                let token = self.token_from_response(response, Some(refresh_token));
                self.credential_store.save_token(&token)?;
                Ok(EnsureTokenResult::Refreshed(token))
            }
            Err(InfraError::OAuth(message)) => {
                warn!(error = %message, "google token refresh rejected");
                Ok(EnsureTokenResult::ReauthenticationRequired)
            }
            Err(error) => Err(error),
        }
    }

    pub fn clear_stored_token(&self) -> Result<(), InfraError> {
        self.credential_store.delete_token()
    }

    fn token_from_response(
        &self,
        response: OAuthTokenResponse,
        fallback_refresh_token: Option<String>,
    ) -> OAuthToken {
        let expires_at = (self.now_provider)() + Duration::seconds(response.expires_in.max(0));
        OAuthToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(fallback_refresh_token),
            expires_at,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: response.scope,
        }
    }
}

#[async_trait]
impl<S, C> AccessTokenProvider for GoogleAuthenticator<S, C>
where
    S: CredentialStore,
    C: OAuthHttpClient,
{
    async fn access_token(&self) -> Result<String, InfraError> {
        match self.ensure_access_token().await? {
            EnsureTokenResult::Existing(token) | EnsureTokenResult::Refreshed(token) => {
                Ok(token.access_token)
            }
            EnsureTokenResult::ReauthenticationRequired => Err(InfraError::OAuth(
                "google authorization required; run `auth url` then `auth exchange`".to_string(),
            )),
        }
    }
}
