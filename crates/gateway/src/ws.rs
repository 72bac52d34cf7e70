//! Single WebSocket endpoint: fans out every bus event as `{type, event,
//! data, timestamp}` to connected clients, honoring an optional per-client
//! session subscription filter (§4.5, §6).

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use maestro_domain::events::EventEnvelope;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::state::AppState;

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Subscribe {
        #[serde(default)]
        session_ids: Option<Vec<String>>,
    },
}

pub async fn events_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = mpsc::channel::<EventEnvelope>(128);
    let _subscription = state.events.subscribe(tx);
    let mut filter: Option<Vec<String>> = None;

    loop {
        tokio::select! {
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                if !matches_filter(&filter, &envelope) {
                    continue;
                }
                let Ok(json) = serde_json::to_string(&envelope) else { continue };
                match tokio::time::timeout(WRITE_TIMEOUT, sink.send(Message::Text(json))).await {
                    Ok(Ok(())) => {}
                    _ => break,
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(ClientMessage::Subscribe { session_ids }) =
                            serde_json::from_str::<ClientMessage>(&text)
                        {
                            filter = session_ids.filter(|ids| !ids.is_empty());
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

/// `None` filter (never subscribed, or subscribed with an empty list) means
/// "all events". A non-empty filter only holds back events carrying a
/// `session_id` field that isn't in the subscribed set; events with no
/// session affinity (projects, team members) always pass through.
fn matches_filter(filter: &Option<Vec<String>>, envelope: &EventEnvelope) -> bool {
    let Some(ids) = filter else { return true };
    match envelope.data.get("session_id").and_then(|v| v.as_str()) {
        Some(session_id) => ids.iter().any(|id| id == session_id),
        None => true,
    }
}
