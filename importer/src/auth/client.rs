//! Token endpoint client (OAuth2 client-credentials grant).

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::TokenFetcher;
use crate::api::TokenResponse;
use crate::config::Connection;
use crate::error::{AuthError, AuthResult, ConfigError, ConfigResult};

/// Requests tokens from `base_url + token_endpoint`.
pub struct ClientCredentialsClient {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    timeout_secs: u64,
}

impl ClientCredentialsClient {
    pub fn new(connection: &Connection) -> ConfigResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(connection.timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            token_url: connection.token_url(),
            client_id: connection.client_id.clone(),
            client_secret: connection.client_secret.clone(),
            timeout_secs: connection.timeout.as_secs(),
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> AuthError {
        if err.is_timeout() {
            AuthError::Timeout(self.timeout_secs)
        } else {
            AuthError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl TokenFetcher for ClientCredentialsClient {
    #[instrument(skip(self), fields(url = %self.token_url))]
    async fn request_token(&self) -> AuthResult<TokenResponse> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        debug!(expires_in = token.expires_in, "Token endpoint answered");
        Ok(token)
    }
}
