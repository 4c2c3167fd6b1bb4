use crate::config::HttpConfig;
use crate::model::FetchError;
use crate::utils::truncate_body;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const LOGGED_BODY_CHARS: usize = 300;

/// Thin wrapper around `reqwest::Client` that turns every outcome into
/// either a body or a classified `FetchError`. It never retries.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(cfg: &HttpConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| FetchError::Transport(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        bearer: Option<&str>,
    ) -> Result<Value, FetchError> {
        let mut request = self
            .client
            .get(url)
            .query(query)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let body = self.send(request, url).await?;
        decode_json(&body)
    }

    /// JSON GET with extra request headers (GraphQL gateways want operation headers).
    pub async fn get_json_with_headers(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&'static str, &str)],
    ) -> Result<Value, FetchError> {
        let mut request = self
            .client
            .get(url)
            .query(query)
            .header(reqwest::header::ACCEPT, "application/json");
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let body = self.send(request, url).await?;
        decode_json(&body)
    }

    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.send(self.client.get(url), url).await
    }

    /// Form POST with HTTP basic credentials (OAuth2 client-credentials grant).
    pub async fn post_form_basic(
        &self,
        url: &str,
        form: &[(&str, &str)],
        user: &str,
        password: &str,
    ) -> Result<Value, FetchError> {
        let request = self
            .client
            .post(url)
            .basic_auth(user, Some(password))
            .form(form);
        let body = self.send(request, url).await?;
        decode_json(&body)
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<String, FetchError> {
        debug!("HTTP request: {}", url);
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        classify_status(status, body, url)
    }
}

fn classify_status(status: StatusCode, body: String, url: &str) -> Result<String, FetchError> {
    if status.is_success() {
        return Ok(body);
    }
    let body = truncate_body(&body, LOGGED_BODY_CHARS);
    warn!("HTTP {} from {}: {}", status.as_u16(), url, body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FetchError::Auth {
            status: status.as_u16(),
        }),
        _ => Err(FetchError::Remote {
            status: status.as_u16(),
            body,
        }),
    }
}

fn decode_json(body: &str) -> Result<Value, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))
}
