//! Ingress endpoint for driver-operated mobile clients.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::tracking::{self, TrackingPipeline};

#[derive(Clone)]
pub struct DriverWsState {
    pub pipeline: Arc<TrackingPipeline>,
}

/// Server message sent to driver clients
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
enum DriverServerMessage {
    /// Initial connection acknowledgment
    Connected { message: String },
    /// A frame was rejected; the connection stays open
    Error { message: String },
}

/// WebSocket endpoint for driver telemetry. The upgrade is accepted
/// unconditionally; authentication sits in front of this service.
pub async fn driver_location_ws(
    ws: WebSocketUpgrade,
    State(state): State<DriverWsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: DriverWsState) {
    let (mut sender, mut receiver) = socket.split();

    let connected = DriverServerMessage::Connected {
        message: "Connected to driver location service".to_string(),
    };
    if let Ok(json) = serde_json::to_string(&connected) {
        let _ = sender.send(Message::Text(json.into())).await;
    }

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match tracking::parse_frame(&text) {
                Ok(frame) => state.pipeline.process_frame(frame).await,
                Err(e) => {
                    debug!(error = %e, "rejected driver frame");
                    let error = DriverServerMessage::Error {
                        message: e.to_string(),
                    };
                    if let Ok(json) = serde_json::to_string(&error) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
            },
            Ok(Message::Ping(_)) => {
                // Axum handles pong automatically
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }
}
