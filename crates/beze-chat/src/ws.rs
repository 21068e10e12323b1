//! Live connection transport.
//!
//! The session is authenticated before the upgrade. After it, the socket is
//! split: a forwarder task drains the session's registry queue into the
//! sink while this task reads inbound frames and hands them to the
//! [`ChatService`](crate::service::ChatService).

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use beze_shared::{ChannelId, SessionId, UserId};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::api::AppState;
use crate::auth::authenticate;
use crate::error::ChatError;
use crate::sessions::SessionTags;

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Identity the client believes it has; only compared and logged.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
}

/// `GET /api/v1/chat/ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Result<Response, ChatError> {
    let user = authenticate(state.validator.as_ref(), &headers).await?;

    if let Some(claimed) = query.user_id.as_deref().map(str::trim) {
        if !claimed.is_empty() && claimed != user.as_str() {
            warn!(
                claimed,
                authenticated = %user,
                "Query user id does not match the session, using the session identity"
            );
        }
    }

    let channel_id = query.channel_id;
    Ok(ws
        .max_message_size(state.config.max_frame_size)
        .on_upgrade(move |socket| run_session(socket, state, user, channel_id))
        .into_response())
}

async fn run_session(socket: WebSocket, state: AppState, user: UserId, channel_id: Option<ChannelId>) {
    let id = SessionId::new();
    let tags = SessionTags {
        user_id: Some(user.clone()),
        channel_id,
    };

    let mut outbound = match state.registry.register(id, tags).await {
        Ok(rx) => rx,
        Err(e) => {
            debug!(session = %id, error = %e, "Session refused");
            let (mut sink, _) = socket.split();
            let _ = sink.send(WsMessage::Text(e.frame().into())).await;
            let _ = sink.close().await;
            return;
        }
    };

    info!(session = %id, user = %user, "Live connection open");
    let (mut sink, mut stream) = socket.split();

    let forwarder = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(WsMessage::Text(frame.to_string().into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(received) = stream.next().await {
        match received {
            Ok(WsMessage::Text(text)) => on_frame(&state, id, &user, text.as_str().as_bytes()).await,
            Ok(WsMessage::Binary(data)) => on_frame(&state, id, &user, &data).await,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(session = %id, error = %e, "Live connection read error");
                break;
            }
        }
    }

    state.registry.unregister(id).await;
    forwarder.abort();
    info!(session = %id, user = %user, "Live connection closed");
}

/// Run one inbound frame; failures are answered on this connection only.
async fn on_frame(state: &AppState, session: SessionId, user: &UserId, data: &[u8]) {
    match state.service.handle_frame(user, data).await {
        Ok(msg) => debug!(session = %session, message_id = ?msg.message_id, event = %msg.event, "Frame accepted"),
        Err(e) => {
            match &e {
                ChatError::Store(_) | ChatError::Bus(_) | ChatError::Internal(_) => {
                    error!(session = %session, user = %user, error = %e, "Frame failed")
                }
                _ => debug!(session = %session, user = %user, error = %e, "Frame rejected"),
            }
            state.registry.send_to(session, e.frame()).await;
        }
    }
}
