//! WebSocket event channel: security events, alerts, system status, and
//! per-organization dashboard pushes.

use crate::state::Shared;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use chrono::{DateTime, Utc};
use qshield_keystore::{RotationRecord, ThreatIntelligence};
use serde::{Deserialize, Serialize};

/// Everything the server pushes over the socket.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum WsEvent {
    SecurityEvent {
        message: String,
        severity: u8,
        timestamp: DateTime<Utc>,
    },
    SecurityAlert {
        threat: ThreatIntelligence,
    },
    SystemStatus {
        threat_level: f64,
        total_keys: usize,
        active_keys: usize,
        active_threats: usize,
        timestamp: DateTime<Utc>,
    },
    RotationCompleted {
        record: RotationRecord,
    },
    DashboardData {
        organization: String,
        keys: usize,
        keys_due: usize,
        threat_level: f64,
        timestamp: DateTime<Utc>,
    },
}

impl WsEvent {
    /// Organization scope, if the event has one. Unscoped events go to every
    /// connection.
    fn organization(&self) -> Option<&str> {
        match self {
            WsEvent::DashboardData { organization, .. } => Some(organization),
            WsEvent::RotationCompleted { record } => Some(&record.organization_id),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
pub struct WsParams {
    /// Subscribe to one organization's scoped events.
    pub organization: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Shared>,
) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state, params.organization))
}

async fn serve_socket(mut socket: WebSocket, state: Shared, organization: Option<String>) {
    let mut events = state.events.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    // Lagged: skip ahead; Closed: we're shutting down.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "websocket subscriber lagged");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };

                if let (Some(scope), Some(wanted)) = (event.organization(), organization.as_deref()) {
                    if scope != wanted {
                        continue;
                    }
                }

                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "could not serialize websocket event");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}
