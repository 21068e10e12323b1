use std::time::Duration;

use async_trait::async_trait;
use beze_shared::collaborators::{StructurizationRequest, StructurizedMessage};

use super::{JsonClient, Structurizer};
use crate::error::EnrichmentError;

/// Explanation service client: `POST {base}/explane`.
pub struct HttpStructurizer {
    client: JsonClient,
}

impl HttpStructurizer {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            client: JsonClient::new("structurization", base_url, request_timeout),
        }
    }
}

#[async_trait]
impl Structurizer for HttpStructurizer {
    async fn structurize(&self, query: &str, answer: &str) -> Result<String, EnrichmentError> {
        let request = StructurizationRequest {
            query: query.to_string(),
            answer: answer.to_string(),
        };
        let response: StructurizedMessage = self.client.post("/explane", &request).await?;
        Ok(response.explanation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn returns_explanation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/explane"))
            .and(body_json(serde_json::json!({"query": "what is 2+2?", "answer": "4"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"explanation": "Addition."})),
            )
            .mount(&server)
            .await;

        let client = HttpStructurizer::new(format!("{}/", server.uri()), Duration::from_secs(5));
        assert_eq!(client.structurize("what is 2+2?", "4").await.unwrap(), "Addition.");
    }

    #[tokio::test]
    async fn slow_service_fails_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/explane"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"explanation": "late"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = HttpStructurizer::new(server.uri(), Duration::from_millis(50));
        let err = client.structurize("q", "a").await.unwrap_err();
        assert!(err.is_collaborator_failure());
    }
}
