use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, broadcast, mpsc};
use tower_http::cors::CorsLayer;

use crate::config::GameConfig;
use crate::error::GameError;
use crate::registry::Registry;
use crate::room::{RoomCommand, RoomEvent};
use crate::types::{ClientMsg, Location, ServerMsg};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub game_config: GameConfig,
    pub catalog: Arc<Vec<Location>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(Mutex::new(sender));

    // The connection identity. Players are reconciled across reconnects by
    // display name inside the room, so a fresh id per socket is fine.
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!("WebSocket connected: {}", conn_id);

    // Room event receivers are handed to the forwarding task through this
    // channel. The subscription itself happens on the command path, before
    // the join command is sent, so no event of the new room can be missed.
    let (room_rx_tx, room_rx_rx) = mpsc::unbounded_channel::<broadcast::Receiver<RoomEvent>>();

    let event_task = tokio::spawn(forward_room_events(
        sender.clone(),
        conn_id.clone(),
        room_rx_rx,
    ));

    // Process incoming commands.
    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };

        let client_msg: ClientMsg = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid message: {}", e);
                continue;
            }
        };

        match client_msg {
            ClientMsg::CreateRoom { name } => {
                let new_room = state.registry.create_room(
                    conn_id.clone(),
                    name,
                    state.catalog.clone(),
                    &state.game_config,
                );

                let _ = room_rx_tx.send(new_room.handle.event_tx.subscribe());

                send_msg(&sender, &ServerMsg::RoomJoined {
                    room_code: new_room.handle.code.clone(),
                    roster: vec![new_room.host],
                    is_host: true,
                    settings: new_room.settings,
                    snapshot: None,
                })
                .await;
            }

            ClientMsg::JoinRoom { room_code, name } => {
                match state.registry.find_room(&room_code) {
                    Some(handle) => {
                        let _ = room_rx_tx.send(handle.event_tx.subscribe());
                        let _ = handle
                            .cmd_tx
                            .send(RoomCommand::Join {
                                conn_id: conn_id.clone(),
                                name,
                            })
                            .await;
                    }
                    None => send_error(&sender, GameError::RoomNotFound).await,
                }
            }

            ClientMsg::UpdateSettings {
                room_code,
                game_length_minutes,
                is_public,
            } => {
                forward(&state, &sender, &room_code, RoomCommand::UpdateSettings {
                    conn_id: conn_id.clone(),
                    game_length_minutes,
                    is_public,
                })
                .await;
            }

            ClientMsg::StartGame { room_code } => {
                forward(&state, &sender, &room_code, RoomCommand::StartGame {
                    conn_id: conn_id.clone(),
                })
                .await;
            }

            ClientMsg::Vote { room_code, suspect_id } => {
                forward(&state, &sender, &room_code, RoomCommand::Vote {
                    conn_id: conn_id.clone(),
                    suspect_id,
                })
                .await;
            }

            ClientMsg::SpyGuessLocation { room_code, location_name } => {
                forward(&state, &sender, &room_code, RoomCommand::GuessLocation {
                    conn_id: conn_id.clone(),
                    location_name,
                })
                .await;
            }

            ClientMsg::ResetGame { room_code } => {
                forward(&state, &sender, &room_code, RoomCommand::ResetGame {
                    conn_id: conn_id.clone(),
                })
                .await;
            }

            ClientMsg::GetPublicRooms => {
                send_msg(&sender, &ServerMsg::PublicRooms {
                    rooms: state.registry.list_public(),
                })
                .await;
            }
        }
    }

    // Socket disconnected.
    tracing::info!("WebSocket disconnected: {}", conn_id);
    event_task.abort();

    let room_code = state
        .registry
        .conn_rooms
        .get(&conn_id)
        .map(|entry| entry.value().clone());
    if let Some(code) = room_code {
        if let Some(handle) = state.registry.find_room(&code) {
            let _ = handle
                .cmd_tx
                .send(RoomCommand::Disconnect { conn_id: conn_id.clone() })
                .await;
        }
    }
}

/// Forwards room events to one socket. Each socket has its own forwarding
/// task, so one slow or dead client never blocks delivery to the rest.
/// Joining a new room swaps the subscription via `room_rx_rx`.
async fn forward_room_events(
    sender: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    conn_id: String,
    mut room_rx_rx: mpsc::UnboundedReceiver<broadcast::Receiver<RoomEvent>>,
) {
    let Some(mut event_rx) = room_rx_rx.recv().await else {
        return;
    };

    loop {
        tokio::select! {
            next = room_rx_rx.recv() => match next {
                Some(rx) => event_rx = rx,
                None => return,
            },
            event = event_rx.recv() => match event {
                Ok(event) => {
                    let msg = match &event {
                        RoomEvent::SendTo { conn_id: target, msg } => {
                            if *target != conn_id {
                                continue;
                            }
                            msg
                        }
                        RoomEvent::Broadcast { msg } => msg,
                    };

                    if let Ok(json) = serde_json::to_string(msg) {
                        let mut s = sender.lock().await;
                        if s.send(Message::Text(json.into())).await.is_err() {
                            return;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    // Room closed; wait in case this socket joins another.
                    let Some(rx) = room_rx_rx.recv().await else {
                        return;
                    };
                    event_rx = rx;
                }
            }
        }
    }
}

/// Routes a command to its room, or reports RoomNotFound to the sender.
async fn forward(
    state: &AppState,
    sender: &Arc<Mutex<SplitSink<WebSocket, Message>>>,
    room_code: &str,
    cmd: RoomCommand,
) {
    match state.registry.find_room(room_code) {
        Some(handle) => {
            let _ = handle.cmd_tx.send(cmd).await;
        }
        None => send_error(sender, GameError::RoomNotFound).await,
    }
}

async fn send_error(sender: &Arc<Mutex<SplitSink<WebSocket, Message>>>, err: GameError) {
    send_msg(sender, &ServerMsg::ErrorMessage {
        message: err.to_string(),
    })
    .await;
}

async fn send_msg(sender: &Arc<Mutex<SplitSink<WebSocket, Message>>>, msg: &ServerMsg) {
    if let Ok(json) = serde_json::to_string(msg) {
        let mut s = sender.lock().await;
        let _ = s.send(Message::Text(json.into())).await;
    }
}
