use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;

pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone)]
pub struct OAuthClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

#[async_trait]
pub trait OAuthHttpClient: Send + Sync {
    async fn exchange_authorization_code(
        &self,
        credentials: &OAuthClientCredentials,
        redirect_uri: &str,
        authorization_code: &str,
    ) -> Result<OAuthTokenResponse, InfraError>;

    async fn refresh_access_token(
        &self,
        credentials: &OAuthClientCredentials,
        refresh_token: &str,
    ) -> Result<OAuthTokenResponse, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestOAuthClient {
    client: Client,
    token_endpoint: String,
}

impl Default for ReqwestOAuthClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, serde::Deserialize)]
struct TokenResponsePayload {
    #[serde(default)]
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ReqwestOAuthClient {
    pub fn new() -> Self {
        Self::with_token_endpoint(GOOGLE_TOKEN_ENDPOINT)
    }

    pub fn with_token_endpoint(token_endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token_endpoint: token_endpoint.into(),
        }
    }

    async fn post_form(&self, params: &[(&str, &str)]) -> Result<OAuthTokenResponse, InfraError> {
        let response = self
            .client
            .post(&self.token_endpoint)
            .form(params)
            .send()
            .await
            .map_err(|error| InfraError::OAuth(format!("request failed: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::OAuth(format!("failed reading token response: {error}")))?;

        let parsed = serde_json::from_str::<TokenResponsePayload>(&body).map_err(|error| {
            InfraError::OAuth(format!("invalid token response payload: {error}; body={body}"))
        })?;

        if !status.is_success() || parsed.error.is_some() {
            let code = parsed
                .error
                .unwrap_or_else(|| format!("http_{}", status.as_u16()));
            let detail = parsed.error_description.unwrap_or(body);
            return Err(InfraError::OAuth(format!("token endpoint error: {code}; {detail}")));
        }
        if parsed.access_token.trim().is_empty() {
            return Err(InfraError::OAuth(
                "token endpoint response did not include access_token".to_string(),
            ));
        }

        Ok(OAuthTokenResponse {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
            expires_in: parsed.expires_in.unwrap_or(0).max(0),
            token_type: parsed.token_type,
            scope: parsed.scope,
        })
    }
}

#[async_trait]
impl OAuthHttpClient for ReqwestOAuthClient {
    async fn exchange_authorization_code(
        &self,
        credentials: &OAuthClientCredentials,
        redirect_uri: &str,
        authorization_code: &str,
    ) -> Result<OAuthTokenResponse, InfraError> {
        self.post_form(&[
            ("grant_type", "authorization_code"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("code", authorization_code),
        ])
        .await
    }

    async fn refresh_access_token(
        &self,
        credentials: &OAuthClientCredentials,
        refresh_token: &str,
    ) -> Result<OAuthTokenResponse, InfraError> {
        self.post_form(&[
            ("grant_type", "refresh_token"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> OAuthClientCredentials {
        OAuthClientCredentials {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
        }
    }

    #[tokio::test]
    async fn refresh_posts_refresh_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-1",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let client = ReqwestOAuthClient::with_token_endpoint(format!("{}/token", server.uri()));
        let response = client
            .refresh_access_token(&credentials(), "refresh-1")
            .await
            .expect("refresh");
        assert_eq!(response.access_token, "access-1");
        assert_eq!(response.expires_in, 3599);
        assert_eq!(response.refresh_token, None);
    }

    #[tokio::test]
    async fn code_exchange_returns_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-2",
                "refresh_token": "refresh-2",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let client = ReqwestOAuthClient::with_token_endpoint(format!("{}/token", server.uri()));
        let response = client
            .exchange_authorization_code(&credentials(), "urn:ietf:wg:oauth:2.0:oob", "auth-code")
            .await
            .expect("exchange");
        assert_eq!(response.refresh_token.as_deref(), Some("refresh-2"));
    }

    #[tokio::test]
    async fn error_payload_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let client = ReqwestOAuthClient::with_token_endpoint(format!("{}/token", server.uri()));
        let error = client
            .refresh_access_token(&credentials(), "stale")
            .await
            .expect_err("must fail");
        assert!(matches!(error, InfraError::OAuth(message) if message.contains("invalid_grant")));
    }
}
