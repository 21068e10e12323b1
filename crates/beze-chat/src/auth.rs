//! Session token validation.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use beze_shared::UserId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ChatError;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session_id";

/// Resolves a session token to the identity that owns it.
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// `Ok(None)` means the token is well-formed but not a live session.
    async fn validate(&self, token: &str) -> Result<Option<UserId>, ChatError>;
}

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    session_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    valid: bool,
    #[serde(default)]
    user_id: String,
}

/// Credential service client: `POST {base}/api/v1/auth/validate`.
pub struct HttpSessionValidator {
    http: reqwest::Client,
    url: String,
}

impl HttpSessionValidator {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ChatError::Internal(e.to_string()))?;
        Ok(Self {
            http,
            url: format!("{}/api/v1/auth/validate", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl SessionValidator for HttpSessionValidator {
    async fn validate(&self, token: &str) -> Result<Option<UserId>, ChatError> {
        let response = self
            .http
            .post(&self.url)
            .json(&ValidateRequest { session_id: token })
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Auth service unreachable");
                ChatError::ServiceUnavailable("auth".into())
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            warn!(%status, "Auth service returned an error");
            return Err(ChatError::ServiceUnavailable("auth".into()));
        }

        let body: ValidateResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "Auth service returned an unreadable body");
            ChatError::ServiceUnavailable("auth".into())
        })?;

        let user = UserId::from(body.user_id);
        if !body.valid || user.is_empty() {
            debug!("Session rejected by auth service");
            return Ok(None);
        }
        Ok(Some(user))
    }
}

/// Extract the session token from the `session_id` cookie, falling back to
/// an `Authorization: Bearer` header.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty());

    from_cookie.or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

/// Validate the request's session, mapping every failure to
/// [`ChatError::Unauthorized`] except an unreachable auth service.
pub async fn authenticate(
    validator: &dyn SessionValidator,
    headers: &HeaderMap,
) -> Result<UserId, ChatError> {
    let token = session_token(headers).ok_or(ChatError::Unauthorized)?;
    validator.validate(&token).await?.ok_or(ChatError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; session_id=abc123"));
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_token_from_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert_eq!(session_token(&headers).as_deref(), Some("tok"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic tok"));
        assert!(session_token(&headers).is_none());
    }

    #[test]
    fn test_cookie_wins_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("session_id=cookie"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer header"));
        assert_eq!(session_token(&headers).as_deref(), Some("cookie"));
    }

    #[tokio::test]
    async fn test_valid_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/validate"))
            .and(body_json(serde_json::json!({"session_id": "abc"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"valid": true, "user_id": "alice"})),
            )
            .mount(&server)
            .await;

        let validator = HttpSessionValidator::new(&server.uri(), Duration::from_secs(5)).unwrap();
        assert_eq!(validator.validate("abc").await.unwrap(), Some(UserId::from("alice")));
    }

    #[tokio::test]
    async fn test_invalid_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/validate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"valid": false})))
            .mount(&server)
            .await;

        let validator = HttpSessionValidator::new(&server.uri(), Duration::from_secs(5)).unwrap();
        assert_eq!(validator.validate("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_auth_service_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let validator = HttpSessionValidator::new(&server.uri(), Duration::from_secs(5)).unwrap();
        assert!(matches!(
            validator.validate("abc").await,
            Err(ChatError::ServiceUnavailable(_))
        ));
    }
}
