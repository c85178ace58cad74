use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::connection::Outbound;
use crate::error::RelayError;
use crate::server::RelayServer;

/// WebSocket close reasons are limited to 123 bytes.
const MAX_CLOSE_REASON_BYTES: usize = 123;

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(ws: WebSocketUpgrade, State(server): State<Arc<RelayServer>>) -> Response {
    let permit = match server.connection_slots().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!("Rejecting connection: limit reached");
            return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        handle_socket(socket, server).await;
        drop(permit);
    })
}

async fn handle_socket(socket: WebSocket, server: Arc<RelayServer>) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(server.config().outbound_buffer);

    let connection = server.accept(out_tx);
    let closed = connection.closed();

    // Server -> Client. Queued messages are flushed before the writer stops.
    let writer_closed = closed.clone();
    let writer = tokio::spawn(async move {
        loop {
            let out = tokio::select! {
                biased;
                out = out_rx.recv() => match out {
                    Some(out) => out,
                    None => break,
                },
                _ = writer_closed.cancelled() => break,
            };

            let (msg, last) = match out {
                Outbound::Msg(msg) => match serde_json::to_string(&msg) {
                    Ok(json) => (Message::Text(json.into()), false),
                    Err(e) => {
                        tracing::error!("Failed to encode message: {}", e);
                        continue;
                    }
                },
                Outbound::Close { reason } => (
                    Message::Close(Some(CloseFrame {
                        code: close_code::NORMAL,
                        reason: truncate_reason(&reason).into(),
                    })),
                    true,
                ),
            };

            if sink.send(msg).await.is_err() || last {
                break;
            }
        }
    });

    // Client -> Server
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => connection.on_message(text.to_string()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        let err = RelayError::Transport(e.to_string());
                        tracing::warn!(
                            connection_id = connection.id,
                            code = err.code(),
                            "{}",
                            err
                        );
                        break;
                    }
                    Some(Ok(_)) => {
                        tracing::debug!(connection_id = connection.id, "Ignoring non-text frame");
                    }
                }
            }
        }
    }

    server.remove(connection.id).await;
    let _ = writer.await;
}

/// Cut a close reason down to the protocol limit on a char boundary.
fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON_BYTES {
        return reason.to_string();
    }
    let mut end = MAX_CLOSE_REASON_BYTES;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}
