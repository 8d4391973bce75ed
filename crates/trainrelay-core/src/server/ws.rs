//! Downstream WebSocket for relay subscribers.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tracing::{debug, info, warn};
use trainrelay_training::Topic;

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::relay::Subscription;

#[derive(Debug, Default, Deserialize)]
pub struct TopicsQuery {
    /// Comma separated topic names; absent or empty means every topic.
    #[serde(default)]
    pub topics: Option<String>,
}

pub(crate) fn parse_topics(raw: Option<&str>) -> ApiResult<Vec<Topic>> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| name.parse::<Topic>().map_err(|_| ApiError::BadRequest(format!("unknown topic: {name}"))))
        .collect()
}

/// Upgrades to a WebSocket streaming `{topic, event}` frames.
pub async fn relay_socket(
    State(state): State<AppState>,
    Query(query): Query<TopicsQuery>,
    upgrade: WebSocketUpgrade,
) -> ApiResult<Response> {
    let topics = parse_topics(query.topics.as_deref())?;
    let subscription = state.relay.subscribe(topics);
    Ok(upgrade.on_upgrade(move |socket| forward_events(socket, subscription)))
}

async fn forward_events(mut socket: WebSocket, mut subscription: Subscription) {
    info!("Relay subscriber connected");
    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode relay event");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => debug!("Ignoring message from relay subscriber"),
            },
        }
    }
    info!("Relay subscriber disconnected");
}
