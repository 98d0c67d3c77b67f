//! Kordiam element API client.
//!
//! The pipeline only sees the [`Submitter`] trait; [`KordiamClient`] is the
//! reqwest implementation over the element endpoints.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::types::CreatedElement;
use crate::auth::AccessToken;
use crate::config::Connection;
use crate::error::{ConfigError, ConfigResult, SubmissionError};
use crate::models::{Element, ElementId};

/// Sends one element to the remote system.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, element: &Element, token: &AccessToken) -> Result<ElementId, SubmissionError>;
}

/// HTTP client for `base_url + elements_endpoint`.
pub struct KordiamClient {
    http: reqwest::Client,
    connection: Connection,
}

impl KordiamClient {
    pub fn new(connection: &Connection) -> ConfigResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(connection.timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            connection: connection.clone(),
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> SubmissionError {
        if err.is_timeout() {
            SubmissionError::Timeout(self.connection.timeout.as_secs())
        } else {
            SubmissionError::Network(err.to_string())
        }
    }

    fn map_status_error(status: StatusCode, body: String) -> SubmissionError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                SubmissionError::Unauthorized(status.as_u16())
            }
            _ => SubmissionError::Rejected {
                status: status.as_u16(),
                body,
            },
        }
    }

    /// Fetch one element as raw JSON.
    #[instrument(skip(self, token))]
    pub async fn get_element(&self, id: &str, token: &AccessToken) -> Result<Value, SubmissionError> {
        let url = self.connection.element_url(id);
        debug!(url = %url, "GET element");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token.secret())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Element lookup failed");
            return Err(Self::map_status_error(status, body));
        }

        response
            .json()
            .await
            .map_err(|e| SubmissionError::MalformedResponse(e.to_string()))
    }

    /// Replace an existing element, returning the updated body.
    #[instrument(skip(self, element, token))]
    pub async fn update_element(
        &self,
        id: &str,
        element: &Element,
        token: &AccessToken,
    ) -> Result<Value, SubmissionError> {
        let url = self.connection.element_url(id);
        debug!(url = %url, "PUT element");

        let response = self
            .http
            .put(&url)
            .bearer_auth(token.secret())
            .json(element)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Element update failed");
            return Err(Self::map_status_error(status, body));
        }

        info!(id = %id, "Element updated");
        response
            .json()
            .await
            .map_err(|e| SubmissionError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl Submitter for KordiamClient {
    #[instrument(skip_all)]
    async fn submit(&self, element: &Element, token: &AccessToken) -> Result<ElementId, SubmissionError> {
        let url = self.connection.elements_url();
        debug!(url = %url, "POST element");

        let response = self
            .http
            .post(&url)
            .bearer_auth(token.secret())
            .json(element)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status_error(status, body));
        }

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        let created: CreatedElement = serde_json::from_str(&body)
            .map_err(|e| SubmissionError::MalformedResponse(e.to_string()))?;
        let id = created
            .id_string()
            .ok_or_else(|| SubmissionError::MalformedResponse("response has no element id".to_string()))?;

        info!(id = %id, "Element created");
        Ok(ElementId::new(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenState;
    use crate::models::{CoercedValue, SectionObject};
    use chrono::{Duration, Utc};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token() -> AccessToken {
        AccessToken::new(TokenState {
            access_token: "abc123".into(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    fn element() -> Element {
        let mut fields = SectionObject::new();
        fields.insert_path("title", CoercedValue::Text("A".into()));
        Element::new(fields, vec![], vec![], vec![5], None, None).unwrap()
    }

    fn client_for(server: &MockServer) -> KordiamClient {
        KordiamClient::new(&Connection::new(server.uri(), "id", "secret")).unwrap()
    }

    #[tokio::test]
    async fn test_submit_returns_created_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1_0_1/elements/"))
            .and(header("authorization", "Bearer abc123"))
            .and(body_json(json!({"title": "A", "groups": [5]})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 4711, "title": "A"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client_for(&server).submit(&element(), &token()).await.unwrap();
        assert_eq!(id.as_str(), "4711");
    }

    #[tokio::test]
    async fn test_submit_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client_for(&server).submit(&element(), &token()).await.unwrap_err();
        assert_eq!(err, SubmissionError::Unauthorized(401));
    }

    #[tokio::test]
    async fn test_submit_rejected_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("{\"tasks\":[\"invalid format\"]}"))
            .mount(&server)
            .await;

        let err = client_for(&server).submit(&element(), &token()).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Rejected { status: 400, body } if body.contains("invalid format")));
    }

    #[tokio::test]
    async fn test_submit_without_id_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let err = client_for(&server).submit(&element(), &token()).await.unwrap_err();
        assert!(matches!(err, SubmissionError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_get_element() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1_0_1/elements/4711/"))
            .and(header("authorization", "Bearer abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 4711, "title": "A"})))
            .mount(&server)
            .await;

        let element = client_for(&server).get_element("4711", &token()).await.unwrap();
        assert_eq!(element["title"], "A");
    }

    #[tokio::test]
    async fn test_update_element() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1_0_1/elements/4711/"))
            .and(header("authorization", "Bearer abc123"))
            .and(body_json(json!({"title": "A", "groups": [5]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 4711, "title": "A"})))
            .expect(1)
            .mount(&server)
            .await;

        let updated = client_for(&server).update_element("4711", &element(), &token()).await.unwrap();
        assert_eq!(updated["id"], 4711);
    }

    #[tokio::test]
    async fn test_update_element_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client_for(&server).update_element("4711", &element(), &token()).await.unwrap_err();
        assert_eq!(err, SubmissionError::Unauthorized(403));
    }
}
