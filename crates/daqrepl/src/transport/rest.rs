//! REST command transport.
//!
//! POSTs the same JSON payload the pipe transport writes to an application's
//! HTTP command endpoint. The `x-answer-port` header tells the application
//! where to send its asynchronous reply; replies are not collected here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;

use super::CommandSink;
use crate::version::DAQREPL_VERSION;

pub const DEFAULT_COMMAND_URL: &str = "http://localhost:12345/command";
pub const DEFAULT_ANSWER_PORT: u16 = 12333;
pub const ANSWER_PORT_HEADER: &str = "x-answer-port";

#[derive(Debug, Clone)]
pub struct RestConfig {
    pub url: String,
    pub answer_port: u16,
    pub timeout: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_COMMAND_URL.to_string(),
            answer_port: DEFAULT_ANSWER_PORT,
            timeout: Duration::from_secs(30),
        }
    }
}

impl RestConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_answer_port(mut self, port: u16) -> Self {
        self.answer_port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("command is not serializable: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("command request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("command rejected with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Status and body of the application's reply to a command POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestResponse {
    pub status: u16,
    pub body: String,
}

impl RestResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct RestClient {
    url: String,
    client: reqwest::Client,
}

impl RestClient {
    pub fn new(config: RestConfig) -> Result<Self, RestError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ANSWER_PORT_HEADER, HeaderValue::from(config.answer_port));

        let user_agent = format!("daqrepl/{}", DAQREPL_VERSION);
        if let Ok(value) = HeaderValue::from_str(&user_agent) {
            headers.insert(USER_AGENT, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(RestError::Client)?;

        Ok(Self {
            url: config.url,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST one command. Any HTTP status is returned to the caller.
    pub async fn submit<C: Serialize + ?Sized>(
        &self,
        command: &C,
    ) -> Result<RestResponse, RestError> {
        let payload = serde_json::to_vec(command)?;

        tracing::debug!(url = %self.url, payload_bytes = payload.len(), "Posting command");
        let response = self
            .client
            .post(&self.url)
            .body(payload)
            .send()
            .await
            .map_err(RestError::Request)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(RestError::Request)?;
        tracing::debug!(status, "Command response");

        Ok(RestResponse { status, body })
    }
}

#[async_trait]
impl CommandSink for RestClient {
    type Error = RestError;

    async fn submit(
        &mut self,
        command: &serde_json::Value,
        _wait: Option<Duration>,
    ) -> Result<String, RestError> {
        let response = RestClient::submit(self, command).await?;
        if !response.is_success() {
            return Err(RestError::Status {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RestClient {
        let config = RestConfig::new(format!("{}/command", server.uri()))
            .with_answer_port(4242)
            .with_timeout(Duration::from_secs(5));
        RestClient::new(config).unwrap()
    }

    #[test]
    fn config_defaults() {
        let config = RestConfig::default();
        assert_eq!(config.url, "http://localhost:12345/command");
        assert_eq!(config.answer_port, 12333);
    }

    #[tokio::test]
    async fn posts_json_with_answer_port() {
        let server = MockServer::start().await;
        let cmd = json!({"id": "init", "data": {"queues": [], "modules": []}});

        Mock::given(method("POST"))
            .and(path("/command"))
            .and(header("content-type", "application/json"))
            .and(header("x-answer-port", "4242"))
            .and(body_json(&cmd))
            .respond_with(ResponseTemplate::new(200).set_body_string("accepted"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let response = client.submit(&cmd).await.unwrap();
        assert_eq!(
            response,
            RestResponse {
                status: 200,
                body: "accepted".to_string()
            }
        );
    }

    #[tokio::test]
    async fn submit_returns_error_statuses() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/command"))
            .respond_with(ResponseTemplate::new(500).set_body_string("no such command"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let response = client.submit(&json!({"id": "bogus"})).await.unwrap();
        assert_eq!(response.status, 500);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn sink_rejects_non_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/command"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad command"))
            .mount(&server)
            .await;

        let mut client = client_for(&server);
        let err = CommandSink::submit(&mut client, &json!({"id": "conf"}), None)
            .await
            .unwrap_err();
        match err {
            RestError::Status { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad command");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_request_error() {
        let config = RestConfig::new("http://127.0.0.1:9/command")
            .with_timeout(Duration::from_secs(2));
        let client = RestClient::new(config).unwrap();

        let err = client.submit(&json!({"id": "init"})).await.unwrap_err();
        assert!(matches!(err, RestError::Request(_)));
    }
}
