use axum::{
    extract::{Query, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use winechat_translation::{ConnectRequest, RoomId, ServerEvent, UserId, audio};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
    pub room_id: String,
    pub source_language: Option<String>,
    /// Comma-separated, e.g. `ko,en`.
    pub target_languages: Option<String>,
}

impl WsParams {
    fn into_request(self, user_id: UserId) -> ConnectRequest {
        let mut request = ConnectRequest::new(user_id, RoomId::new(self.room_id));
        request.source_language = self.source_language.filter(|s| !s.trim().is_empty());
        request.target_languages = self
            .target_languages
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        request
    }
}

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match state.auth.verify_access_token(&params.token) {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, "Rejected WebSocket token");
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    };

    if params.room_id.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "room_id is required").into_response();
    }

    let request = params.into_request(UserId::new(claims.sub));
    ws.on_upgrade(move |socket| handle_socket(socket, state, request))
}

async fn handle_socket(socket: WebSocket, state: AppState, request: ConnectRequest) {
    let user_id = request.user_id.clone();
    let room_id = request.room_id.clone();
    info!(%user_id, %room_id, "WebSocket connected");

    let (sink, mut receiver) = socket.split();
    let manager = state.manager.clone();
    let (outbound, outbound_rx) = manager.outbound_channel();
    let writer = tokio::spawn(super::writer::run(user_id.clone(), sink, outbound_rx));

    let mut connection = match manager.connect(request, outbound.clone()).await {
        Ok(c) => c,
        Err(e) => {
            warn!(%user_id, %room_id, error = %e, "Connection rejected");
            let _ = outbound.try_send(Arc::new(ServerEvent::error(e.to_string())));
            drop(outbound);
            // The writer flushes the error and closes once the queue is dropped.
            let _ = writer.await;
            return;
        }
    };
    drop(outbound);

    let idle_timeout = match state.settings.pipeline.idle_timeout_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };

    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver.next()).await {
                Ok(next) => next,
                Err(_) => {
                    info!(%user_id, idle_ms = limit.as_millis() as u64, "WebSocket idle, closing");
                    break;
                }
            },
            None => receiver.next().await,
        };
        let Some(msg) = next else {
            break;
        };
        match msg {
            Ok(Message::Text(text)) => {
                super::dispatcher::handle_client_message(&manager, &connection, text.as_str()).await;
            }
            Ok(Message::Binary(bytes)) => {
                if bytes.len() % 2 != 0 {
                    debug!(%user_id, len = bytes.len(), "Odd-length audio frame, trailing byte ignored");
                }
                manager.push_audio(&user_id, audio::decode_s16le(&bytes)).await;
            }
            Ok(Message::Close(_)) => {
                break;
            }
            Err(e) => {
                warn!(%user_id, %e, "WebSocket error");
                break;
            }
            // Pings are answered by the socket itself.
            _ => {}
        }
    }

    manager.disconnect(&mut connection);
    drop(connection);
    writer.abort();

    info!(%user_id, %room_id, "WebSocket disconnected");
}
