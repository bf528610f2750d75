//! Schwab OAuth token endpoint.

use async_trait::async_trait;
use reqwest::Url;

use super::error::SchwabError;
use super::http_client::SchwabHttpClient;
use crate::application::ports::{CredentialError, TokenEndpoint};
use crate::domain::TokenGrant;
use crate::infrastructure::config::SchwabSettings;

const TOKEN_PATH: &str = "/v1/oauth/token";
const AUTHORIZE_PATH: &str = "/v1/oauth/authorize";

/// [`TokenEndpoint`] backed by the Schwab OAuth API.
pub struct SchwabTokenEndpoint {
    http: SchwabHttpClient,
    app_key: String,
    app_secret: String,
    redirect_uri: String,
    probe_path: String,
    authorization_url: String,
}

impl SchwabTokenEndpoint {
    /// Create the endpoint from settings.
    pub fn new(settings: &SchwabSettings, http: SchwabHttpClient) -> Result<Self, SchwabError> {
        if settings.app_key().is_empty() || settings.app_secret().is_empty() {
            return Err(SchwabError::InvalidConfig(
                "application key and secret are required".to_string(),
            ));
        }

        let authorization_url = Url::parse_with_params(
            &format!("{}{AUTHORIZE_PATH}", http.base_url()),
            &[
                ("client_id", settings.app_key()),
                ("redirect_uri", settings.redirect_uri.as_str()),
            ],
        )
        .map_err(|e| SchwabError::InvalidConfig(e.to_string()))?
        .to_string();

        Ok(Self {
            probe_path: format!("/marketdata/v1/{}/quotes", settings.probe_symbol),
            app_key: settings.app_key().to_string(),
            app_secret: settings.app_secret().to_string(),
            redirect_uri: settings.redirect_uri.clone(),
            authorization_url,
            http,
        })
    }

    async fn token(
        &self,
        form: &[(&str, &str)],
        rejected: fn(u16, String) -> CredentialError,
    ) -> Result<TokenGrant, CredentialError> {
        self.http
            .post_form_basic(
                "oauth_token",
                TOKEN_PATH,
                form,
                &self.app_key,
                &self.app_secret,
            )
            .await
            .map_err(|err| err.into_credential_error(rejected))
    }
}

#[async_trait]
impl TokenEndpoint for SchwabTokenEndpoint {
    fn authorization_url(&self) -> String {
        self.authorization_url.clone()
    }

    async fn probe(&self, access_token: &str) -> Result<bool, CredentialError> {
        match self
            .http
            .get_bearer::<serde_json::Value>("probe", &self.probe_path, &[], access_token)
            .await
        {
            Ok(_) => Ok(true),
            Err(SchwabError::Unauthorized { status }) => {
                tracing::debug!(status, "Stored credential rejected by probe");
                Ok(false)
            }
            Err(err) => Err(CredentialError::Transport {
                message: err.to_string(),
            }),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, CredentialError> {
        self.token(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
            |status, message| CredentialError::RefreshRejected { status, message },
        )
        .await
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, CredentialError> {
        self.token(
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ],
            |status, message| CredentialError::AuthorizationRejected { status, message },
        )
        .await
    }
}

impl std::fmt::Debug for SchwabTokenEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchwabTokenEndpoint")
            .field("base_url", &self.http.base_url())
            .field("app_key", &"[REDACTED]")
            .field("app_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::infrastructure::schwab::RetryConfig;

    fn endpoint(server: &MockServer) -> SchwabTokenEndpoint {
        let mut settings = SchwabSettings::new("key".to_string(), "secret".to_string());
        settings.base_url = server.uri();
        let http =
            SchwabHttpClient::new(&server.uri(), Duration::from_secs(5), RetryConfig::disabled())
                .unwrap();
        SchwabTokenEndpoint::new(&settings, http).unwrap()
    }

    fn grant_body() -> serde_json::Value {
        json!({
            "access_token": "access-2",
            "refresh_token": "refresh-2",
            "token_type": "Bearer",
            "scope": "api",
            "expires_in": 1800,
            "id_token": "id-2"
        })
    }

    #[tokio::test]
    async fn authorization_url_encodes_parameters() {
        let server = MockServer::start().await;
        let url = endpoint(&server).authorization_url();
        assert!(url.starts_with(&format!("{}/v1/oauth/authorize?", server.uri())));
        assert!(url.contains("client_id=key"));
        assert!(url.contains("redirect_uri=https%3A%2F%2F127.0.0.1"));
    }

    #[tokio::test]
    async fn refresh_posts_refresh_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/oauth/token"))
            .and(header("authorization", "Basic a2V5OnNlY3JldA=="))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(grant_body()))
            .expect(1)
            .mount(&server)
            .await;

        let grant = endpoint(&server).refresh("refresh-1").await.unwrap();
        assert_eq!(grant.access_token, "access-2");
        assert_eq!(grant.refresh_token, "refresh-2");
        assert_eq!(grant.expires_in, 1800);
        assert_eq!(grant.id_token.as_deref(), Some("id-2"));
    }

    #[tokio::test]
    async fn rejected_refresh_is_not_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "expired"
            })))
            .mount(&server)
            .await;

        let err = endpoint(&server).refresh("old").await.unwrap_err();
        assert_eq!(
            err,
            CredentialError::RefreshRejected {
                status: 400,
                message: "expired".to_string()
            }
        );
        assert!(!err.is_terminal());
    }

    #[tokio::test]
    async fn code_exchange_sends_redirect_uri() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc%40def"))
            .and(body_string_contains("redirect_uri=https%3A%2F%2F127.0.0.1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(grant_body()))
            .expect(1)
            .mount(&server)
            .await;

        let grant = endpoint(&server).exchange_code("abc@def").await.unwrap();
        assert_eq!(grant.access_token, "access-2");
    }

    #[tokio::test]
    async fn rejected_code_exchange_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = endpoint(&server).exchange_code("bad").await.unwrap_err();
        assert!(matches!(
            err,
            CredentialError::AuthorizationRejected { status: 401, .. }
        ));
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn probe_distinguishes_rejection_from_outage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/marketdata/v1/AAPL/quotes"))
            .and(header("authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"AAPL": {}})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/marketdata/v1/AAPL/quotes"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/marketdata/v1/AAPL/quotes"))
            .and(header("authorization", "Bearer outage"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let endpoint = endpoint(&server);
        assert!(endpoint.probe("good").await.unwrap());
        assert!(!endpoint.probe("stale").await.unwrap());
        assert!(matches!(
            endpoint.probe("outage").await.unwrap_err(),
            CredentialError::Transport { .. }
        ));
    }

    #[test]
    fn empty_keys_are_rejected() {
        let settings = SchwabSettings::new(String::new(), "secret".to_string());
        let http = SchwabHttpClient::new(
            SchwabSettings::DEFAULT_BASE_URL,
            Duration::from_secs(5),
            RetryConfig::disabled(),
        )
        .unwrap();
        assert!(matches!(
            SchwabTokenEndpoint::new(&settings, http),
            Err(SchwabError::InvalidConfig(_))
        ));
    }
}
