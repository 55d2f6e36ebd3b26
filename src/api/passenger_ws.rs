//! Egress endpoint: passenger clients subscribe to one main route's feed.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::broadcast::SubscriberRegistry;

/// RFC 6455 close code for a policy violation.
const CLOSE_POLICY_VIOLATION: u16 = 1008;

#[derive(Clone)]
pub struct PassengerWsState {
    pub registry: Arc<SubscriberRegistry>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
enum PassengerServerMessage {
    /// Initial connection acknowledgment
    Connection {
        message: String,
        timestamp: String,
    },
}

fn welcome_message(route_id: i64, now: DateTime<Utc>) -> PassengerServerMessage {
    PassengerServerMessage::Connection {
        message: format!("Connected to real-time feed for route {route_id}"),
        timestamp: now.to_rfc3339(),
    }
}

/// WebSocket endpoint for the per-route passenger feed. The path parameter
/// must be all digits; anything else closes the socket with code 1008.
pub async fn passenger_realtime_ws(
    ws: WebSocketUpgrade,
    Path(main_route_id): Path<String>,
    State(state): State<PassengerWsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, main_route_id, state))
}

async fn handle_socket(mut socket: WebSocket, raw_route_id: String, state: PassengerWsState) {
    let route_id = match parse_route_id(&raw_route_id) {
        Some(route_id) => route_id,
        None => {
            debug!(route = %raw_route_id, "rejecting passenger connection with non-numeric route");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_POLICY_VIOLATION,
                    reason: "main_route_id must be numeric".into(),
                })))
                .await;
            return;
        }
    };

    let (mut sender, mut receiver) = socket.split();

    let welcome = welcome_message(route_id, Utc::now());
    if let Ok(json) = serde_json::to_string(&welcome) {
        if sender.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    let mut subscription = state.registry.subscribe(route_id).await;

    loop {
        tokio::select! {
            queued = subscription.rx.recv() => match queued {
                Some(frame) => {
                    if sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                // the broadcaster evicted this connection
                None => break,
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(_)) => break,
                _ => {}
            },
        }
    }

    state
        .registry
        .unsubscribe(subscription.route_id, subscription.id)
        .await;
}

fn parse_route_id(raw: &str) -> Option<i64> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}
