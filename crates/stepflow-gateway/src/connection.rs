use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use stepflow_core::types::RunId;
use stepflow_engine::Engine;

use crate::protocol::{ErrorFrame, PongFrame};

/// Forward a run's event log to a WebSocket as JSON text frames.
///
/// Replays the log so far, follows live events, and closes after the
/// terminal event. An unknown run gets one error frame, then a close.
/// Client frames are read alongside: a `ping` text gets a `pong` frame,
/// and a close or read error ends the forwarding. The run is unaffected.
pub async fn stream_run_log(ws: WebSocket, engine: &Engine, run_id: &RunId) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let mut events = match engine.subscribe_run_log(run_id) {
        Ok(events) => events,
        Err(e) => {
            warn!(run_id = %run_id, error = %e, "Subscription rejected");
            if let Ok(json) = serde_json::to_string(&ErrorFrame::new(&e)) {
                let _ = ws_tx.send(Message::Text(json.into())).await;
            }
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else { break };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(run_id = %run_id, error = %e, "Failed to encode run event");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    debug!(run_id = %run_id, "Subscriber went away");
                    return;
                }
            }
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        debug!(run_id = %run_id, error = %e, "WebSocket read error");
                        return;
                    }
                    None => {
                        debug!(run_id = %run_id, "Subscriber went away");
                        return;
                    }
                };
                match msg {
                    Message::Text(text) if text.as_str().trim() == "ping" => {
                        if let Ok(json) = serde_json::to_string(&PongFrame::default()) {
                            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                return;
                            }
                        }
                    }
                    Message::Ping(data) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Message::Close(_) => {
                        debug!(run_id = %run_id, "Subscriber closed");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }

    let _ = ws_tx.send(Message::Close(None)).await;
}
