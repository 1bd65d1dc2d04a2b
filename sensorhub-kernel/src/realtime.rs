/**
 * REALTIME FEED - WebSocket channel between the relay and each dashboard
 *
 * ROLE :
 * One task per browser connection: greets it, forwards every published
 * reading, answers `ping` and `request_sensor_data`.
 *
 * HOW IT WORKS :
 * - The connection is counted for as long as the task lives (ConnectionGuard)
 * - Readings come from the relay's broadcast channel; a lagging client skips
 *   what it missed and keeps going
 * - `request_sensor_data` triggers a coalesced relay refresh; the result is
 *   delivered through the broadcast like any other reading
 * - On disconnect the pending refresh (if any) is aborted
 */

use crate::http::AppState;
use crate::models::{ClientEvent, ServerEvent};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

async fn handle_socket(socket: WebSocket, app: AppState) {
    let _guard = app.connections.guard();
    let mut readings = app.relay.subscribe();
    let (mut sender, mut receiver) = socket.split();
    let mut refresh: Option<JoinHandle<()>> = None;

    let hello = ServerEvent::Connected { active_connections: app.connections.count() };
    if send_event(&mut sender, &hello).await.is_err() {
        return;
    }
    if let Some(latest) = app.relay.latest() {
        if send_event(&mut sender, &ServerEvent::SensorData(latest.to_wire())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => match parse_client_frame(text.as_str()) {
                    Some(ClientEvent::RequestSensorData) => {
                        // one pending refresh per connection is enough
                        if refresh.as_ref().map_or(true, |h| h.is_finished()) {
                            let relay = app.relay.clone();
                            refresh = Some(tokio::spawn(async move {
                                relay.refresh().await;
                            }));
                        }
                    }
                    Some(ClientEvent::Ping) => {
                        if send_event(&mut sender, &ServerEvent::Pong).await.is_err() {
                            break;
                        }
                    }
                    None => debug!("[ws] ignoring frame: {}", text.as_str()),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("[ws] receive error: {}", e);
                    break;
                }
            },
            published = readings.recv() => match published {
                Ok(reading) => {
                    if send_event(&mut sender, &ServerEvent::SensorData(reading.to_wire())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("[ws] client lagging, {} readings skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Some(handle) = refresh {
        handle.abort();
    }
}

/// Unknown or malformed frames yield `None`
fn parse_client_frame(text: &str) -> Option<ClientEvent> {
    serde_json::from_str(text).ok()
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &ServerEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    sender.send(Message::Text(json.into())).await
}
