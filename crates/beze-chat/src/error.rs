use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use beze_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// The inbound frame is not a valid message.
    #[error("Malformed message: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A synchronous collaborator call failed.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Shutting down")]
    ShuttingDown,

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Bus error: {0}")]
    Bus(#[from] beze_bus::BusError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ChatError::NotFound("record".into()),
            other => ChatError::Store(other),
        }
    }
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::Decode(_) | ChatError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ChatError::Unauthorized => StatusCode::UNAUTHORIZED,
            ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::ServiceUnavailable(_) | ChatError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::Store(_) | ChatError::Bus(_) | ChatError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text shown to the client. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            ChatError::Store(_) => "Storage error".to_string(),
            ChatError::Bus(_) => "Delivery error".to_string(),
            ChatError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Inline error frame written only to the sender's connection.
    pub fn frame(&self) -> String {
        serde_json::json!({ "error": self.public_message() }).to_string()
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.public_message(),
        });

        (self.status(), axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_shape() {
        let frame = ChatError::Decode("expected value".into()).frame();
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["error"], "Malformed message: expected value");
    }

    #[test]
    fn test_internal_details_hidden() {
        let frame = ChatError::Internal("db path /secret".into()).frame();
        assert!(!frame.contains("secret"));
    }

    #[test]
    fn test_store_not_found_maps_to_404() {
        let err: ChatError = StoreError::NotFound.into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
