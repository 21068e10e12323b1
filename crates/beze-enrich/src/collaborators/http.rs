use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::EnrichmentError;

/// Minimal JSON-over-HTTP client shared by the collaborator adapters.
#[derive(Clone)]
pub struct JsonClient {
    service: &'static str,
    base_url: String,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl JsonClient {
    pub fn new(service: &'static str, base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            service,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            request_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `{base_url}{path}` and decode the JSON answer.
    /// Any status >= 400 maps to [`EnrichmentError::Unavailable`].
    pub async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, EnrichmentError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(service = self.service, url = %url, "Calling collaborator");

        let response = self
            .client
            .post(&url)
            .json(body)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(self.unavailable(format!("status {status}")));
        }

        response.json::<Resp>().await.map_err(|e| self.unavailable(e))
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> EnrichmentError {
        EnrichmentError::Unavailable {
            service: self.service,
            reason: reason.to_string(),
        }
    }
}
