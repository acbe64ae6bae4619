//! WebSocket endpoint and HTTP surface.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::browser::EngineFactory;
use crate::config::Config;
use crate::connection::ConnectionContext;
use crate::llm::CompletionClient;
use crate::protocol::ServerEvent;

/// Outbound event buffer per connection. Status and result events block on
/// a full buffer; frames are dropped instead.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Shared handles every connection starts from.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub llm: Arc<dyn CompletionClient>,
    pub engines: Arc<dyn EngineFactory>,
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One task per connection. Inbound commands are handled one at a time in
/// arrival order; outbound events ride a writer task so the frame loop and
/// control loop can emit independently.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    info!(connection = %connection_id, "websocket connected");

    let (mut sender, mut receiver) = socket.split();
    let (events, mut outbound) = mpsc::channel::<ServerEvent>(EVENT_CHANNEL_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(error) => warn!(%error, "failed to serialize server event"),
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let mut context = ConnectionContext::new(
        connection_id.clone(),
        events,
        state.llm.clone(),
        state.engines.clone(),
        state.config.clone(),
    );

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => context.handle_text(&text).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Socket gone or closing: tear the browser session down, then let the
    // writer drain whatever is still queued.
    context.teardown().await;
    drop(context);
    let _ = writer.await;

    info!(connection = %connection_id, "websocket closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeEngine, FakeEngineFactory, ScriptedModel};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState {
            config: Config::default(),
            llm: Arc::new(ScriptedModel::new(["hi"])),
            engines: Arc::new(FakeEngineFactory::new(FakeEngine::new())),
        }
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let app = app_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_route_requires_an_upgrade() {
        let app = app_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        // A plain GET without the upgrade handshake is rejected.
        assert_ne!(response.status(), StatusCode::OK);
    }
}
