use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    routing::get,
    Json, Router,
};
use beze_shared::{Channel, ChannelId, Message, MessageId, UserId};
use beze_store::repository::{ChannelRepository, MessageRepository};
use beze_store::StoreError;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::auth::{authenticate, SessionValidator};
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::service::ChatService;
use crate::sessions::SessionRegistry;
use crate::ws::ws_handler;

/// Largest page the history endpoint serves.
pub const MAX_HISTORY_LIMIT: u32 = 1000;

const DEFAULT_HISTORY_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
    pub registry: Arc<SessionRegistry>,
    pub validator: Arc<dyn SessionValidator>,
    pub channels: Arc<dyn ChannelRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub config: Arc<ChatConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/chat/ws", get(ws_handler))
        .route("/api/v1/chat/channels", get(list_channels))
        .route("/api/v1/chat/channels/by-peer", get(channel_by_peer))
        .route("/api/v1/chat/messages/{message_id}", get(get_message))
        .route("/api/v1/chat/{channel_id}", get(list_messages))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    sessions: usize,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
    #[serde(default)]
    offset: u32,
}

#[derive(Debug, Deserialize)]
struct ChannelsQuery {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PeerQuery {
    peer_id: String,
}

#[derive(Serialize)]
struct MessagesResponse {
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct ChannelsResponse {
    channels: Vec<Channel>,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.registry.len().await,
    })
}

/// Load a channel the caller belongs to.
async fn member_channel(state: &AppState, id: ChannelId, caller: &UserId) -> Result<Channel, ChatError> {
    let channel = state.channels.get_channel(id).await.map_err(|e| match e {
        StoreError::NotFound => ChatError::NotFound(format!("channel {id}")),
        other => other.into(),
    })?;
    if !channel.has_participant(caller) {
        return Err(ChatError::Forbidden("not a member of this channel".into()));
    }
    Ok(channel)
}

/// `GET /api/v1/chat/{channel_id}`: newest first.
async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<MessagesResponse>, ChatError> {
    let caller = authenticate(state.validator.as_ref(), &headers).await?;

    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit == 0 || limit > MAX_HISTORY_LIMIT {
        return Err(ChatError::BadRequest(format!(
            "limit must be between 1 and {MAX_HISTORY_LIMIT}"
        )));
    }

    let channel = member_channel(&state, ChannelId(channel_id), &caller).await?;
    let messages = state
        .messages
        .list_messages_for_channel(channel.id, limit, query.offset)
        .await?;
    Ok(Json(MessagesResponse { messages }))
}

/// `GET /api/v1/chat/channels?user_id=`: only the caller's own channels.
async fn list_channels(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ChannelsQuery>,
) -> Result<Json<ChannelsResponse>, ChatError> {
    let caller = authenticate(state.validator.as_ref(), &headers).await?;
    if let Some(requested) = query.user_id.as_deref().map(str::trim) {
        if !requested.is_empty() && requested != caller.as_str() {
            return Err(ChatError::Forbidden("cannot list another user's channels".into()));
        }
    }

    let channels = state.channels.list_channels_for_user(&caller).await?;
    Ok(Json(ChannelsResponse { channels }))
}

/// `GET /api/v1/chat/channels/by-peer?peer_id=`
async fn channel_by_peer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PeerQuery>,
) -> Result<Json<Channel>, ChatError> {
    let caller = authenticate(state.validator.as_ref(), &headers).await?;
    let participants = Channel::canonical_participants([caller, UserId::from(query.peer_id)])
        .map_err(|e| ChatError::BadRequest(e.to_string()))?;

    let channel = state
        .channels
        .get_channel_by_participants(&participants)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => ChatError::NotFound("channel".into()),
            other => other.into(),
        })?;
    Ok(Json(channel))
}

/// `GET /api/v1/chat/messages/{message_id}`
async fn get_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(message_id): Path<Uuid>,
) -> Result<Json<Message>, ChatError> {
    let caller = authenticate(state.validator.as_ref(), &headers).await?;
    let id = MessageId(message_id);

    let message = state.messages.get_message(id).await.map_err(|e| match e {
        StoreError::NotFound => ChatError::NotFound(format!("message {id}")),
        other => other.into(),
    })?;
    let channel_id = message
        .channel_id
        .ok_or_else(|| ChatError::Internal(format!("message {id} has no channel")))?;
    member_channel(&state, channel_id, &caller).await?;
    Ok(Json(message))
}

/// Serve until `shutdown` resolves, then stop accepting connections and
/// wait for in-flight requests.
pub async fn serve(
    state: AppState,
    addr: std::net::SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use beze_bus::MemoryBroker;
    use beze_enrich::collaborators::Structurizer;
    use beze_enrich::{EnrichmentError, RetryPolicy};
    use beze_store::SqliteStore;
    use tower::ServiceExt;

    use crate::service::ChatTopics;

    /// Accepts any token equal to a user id.
    struct TokenIsUser;

    #[async_trait]
    impl SessionValidator for TokenIsUser {
        async fn validate(&self, token: &str) -> Result<Option<UserId>, ChatError> {
            Ok(Some(UserId::from(token)))
        }
    }

    struct NoStructurizer;

    #[async_trait]
    impl Structurizer for NoStructurizer {
        async fn structurize(&self, _: &str, _: &str) -> Result<String, EnrichmentError> {
            Err(EnrichmentError::InvalidInput("unused".into()))
        }
    }

    fn state() -> AppState {
        let store = SqliteStore::open_in_memory().unwrap();
        let broker = MemoryBroker::new();
        let config = ChatConfig::default();
        let service = ChatService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(broker),
            Arc::new(NoStructurizer),
            RetryPolicy::default(),
            ChatTopics {
                delivery: config.delivery_topic.clone(),
                raw_voice: config.raw_voice_topic.clone(),
                attachment: config.attachment_topic.clone(),
            },
        );
        AppState {
            service: Arc::new(service),
            registry: Arc::new(SessionRegistry::new(config.session_write_timeout, config.session_queue)),
            validator: Arc::new(TokenIsUser),
            channels: Arc::new(store.clone()),
            messages: Arc::new(store.clone()),
            config: Arc::new(config),
        }
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header("cookie", format!("session_id={token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn seed_channel(state: &AppState) -> Message {
        state
            .service
            .handle_frame(
                &UserId::from("alice"),
                br#"{"event":"text","peer_id":"bob","payload":"hi"}"#,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let state = state();
        let response = build_router(state).oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_history_requires_session() {
        let state = state();
        let uri = format!("/api/v1/chat/{}", Uuid::new_v4());
        let response = build_router(state).oneshot(get(&uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_history_for_member_and_stranger() {
        let state = state();
        let sent = seed_channel(&state).await;
        let uri = format!("/api/v1/chat/{}?limit=10", sent.channel_id.unwrap());

        let ok = build_router(state.clone()).oneshot(get(&uri, Some("bob"))).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let body = axum::body::to_bytes(ok.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["messages"][0]["payload"], "hi");

        let denied = build_router(state).oneshot(get(&uri, Some("mallory"))).await.unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_history_limit_bounded() {
        let state = state();
        let sent = seed_channel(&state).await;
        let uri = format!("/api/v1/chat/{}?limit=1001", sent.channel_id.unwrap());
        let response = build_router(state).oneshot(get(&uri, Some("alice"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_channels_only_for_caller() {
        let state = state();
        seed_channel(&state).await;

        let own = build_router(state.clone())
            .oneshot(get("/api/v1/chat/channels?user_id=bob", Some("bob")))
            .await
            .unwrap();
        assert_eq!(own.status(), StatusCode::OK);

        let other = build_router(state)
            .oneshot(get("/api/v1/chat/channels?user_id=alice", Some("bob")))
            .await
            .unwrap();
        assert_eq!(other.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_channel_by_peer() {
        let state = state();
        let sent = seed_channel(&state).await;

        let response = build_router(state.clone())
            .oneshot(get("/api/v1/chat/channels/by-peer?peer_id=alice", Some("bob")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let channel: Channel = serde_json::from_slice(&body).unwrap();
        assert_eq!(Some(channel.id), sent.channel_id);

        let missing = build_router(state)
            .oneshot(get("/api/v1/chat/channels/by-peer?peer_id=carol", Some("bob")))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_message_by_id() {
        let state = state();
        let sent = seed_channel(&state).await;
        let uri = format!("/api/v1/chat/messages/{}", sent.message_id.unwrap());

        let response = build_router(state.clone()).oneshot(get(&uri, Some("alice"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let denied = build_router(state).oneshot(get(&uri, Some("carol"))).await.unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_ws_refused_without_session() {
        let state = state();
        let response = build_router(state)
            .oneshot(get("/api/v1/chat/ws", None))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
