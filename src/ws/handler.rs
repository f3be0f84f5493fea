//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::PeerHandle;
use crate::http::AppError;
use crate::relay::ActorId;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Room to join; opened on first join
    pub room: String,
}

/// WebSocket upgrade handler. The room seat is taken before upgrading so a
/// full room or bad name is reported as a plain HTTP error.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    match state.rooms.join(&query.room) {
        Ok(handle) => {
            info!(room = %query.room, actor = %handle.actor, "WebSocket upgrade");
            let room = query.room;
            ws.on_upgrade(move |socket| handle_socket(socket, room, handle))
        }
        Err(e) => {
            warn!(room = %query.room, error = %e, "WebSocket join rejected");
            AppError::from(e).into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, room: String, handle: PeerHandle) {
    let actor = handle.actor;
    info!(room = %room, actor = %actor, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    run_session(actor, ws_sink, ws_stream, handle.input_tx, handle.view_rx).await;

    info!(room = %room, actor = %actor, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    actor: ActorId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    input_tx: mpsc::Sender<ClientMsg>,
    mut view_rx: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = PlayerRateLimiter::new();

    // Writer task: peer view -> WebSocket
    let mut writer_handle = tokio::spawn(async move {
        loop {
            match view_rx.recv().await {
                Ok(msg) => {
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(actor = %actor, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(actor = %actor, lagged_count = n, "Client lagged, skipping {} messages", n);
                    // Snapshots are periodic; the next one catches the client up
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(actor = %actor, "Peer stopped, closing socket");
                    let _ = ws_sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> peer
    loop {
        let result = tokio::select! {
            next = ws_stream.next() => match next {
                Some(result) => result,
                None => break,
            },
            _ = &mut writer_handle => break,
        };

        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(actor = %actor, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        let leaving = matches!(client_msg, ClientMsg::Leave);
                        if input_tx.send(client_msg).await.is_err() {
                            debug!(actor = %actor, "Input channel closed");
                            break;
                        }
                        if leaving {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(actor = %actor, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(actor = %actor, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(actor = %actor, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(actor = %actor, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(actor = %actor, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(actor = %actor, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Signal disconnect to the peer loop
    let _ = input_tx.send(ClientMsg::Leave).await;

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
