//! WebSocket gateway: client intents in, room notifications out.
//!
//! Each connection gets one unbounded channel; anything the core wants a
//! client to see goes through it. Room mutation happens in short critical
//! sections over the per-room mutex, never across an await point, and the
//! turn-advance and teardown timers re-fetch the room by code when they fire.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedSender};
use uuid::Uuid;

use crate::catalog::TaskCatalog;
use crate::config::{ROOM_EXPIRY, TURN_ADVANCE_DELAY};
use crate::protocol::{ClientIntent, ServerEvent, Verdict};
use crate::registry::{RoomRegistry, SharedRoom};
use crate::room::{GameError, Player, TurnAdvance};
use crate::session;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub catalog: Arc<TaskCatalog>,
}

/// (room code, player id) bound to one live socket. `None` until the
/// connection creates, joins, or reconnects into a room.
pub type ConnIdentity = Option<(String, Uuid)>;

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Forward queued notifications onto the wire. Ends once the socket
    // breaks or every clone of `tx` (ours plus the room's) is gone.
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else { continue };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut ident: ConnIdentity = None;
    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientIntent>(&text) {
                Ok(intent) => dispatch(&state, &tx, &mut ident, intent),
                Err(err) => {
                    let _ = tx.send(ServerEvent::Error { message: format!("Bad message: {err}") });
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    if let Some((code, player_id)) = ident {
        session::disconnect(&state, &code, player_id);
    }
}

/// Route one intent to its handler. Transport-free so tests can drive the
/// whole game through it with channel-backed fake connections.
pub fn dispatch(
    state: &AppState,
    tx: &UnboundedSender<ServerEvent>,
    ident: &mut ConnIdentity,
    intent: ClientIntent,
) {
    match intent {
        ClientIntent::CreateRoom { name } => handle_create(state, tx, ident, name),
        ClientIntent::JoinRoom { room_code, name } => {
            handle_join(state, tx, ident, room_code, name)
        }
        ClientIntent::ReconnectWithToken { token, room_code } => {
            if let Some(bound) = session::reconnect(state, &token, room_code.as_deref(), tx) {
                *ident = Some(bound);
            }
        }
        ClientIntent::StartGame { room_code } => handle_start(state, ident, &room_code),
        ClientIntent::PassTask { room_code } => handle_pass(state, ident, &room_code),
        ClientIntent::SubmitVote { room_code, vote } => {
            handle_vote(state, ident, &room_code, vote)
        }
    }
}

fn handle_create(
    state: &AppState,
    tx: &UnboundedSender<ServerEvent>,
    ident: &mut ConnIdentity,
    name: String,
) {
    let Some(name) = valid_name(tx, name) else { return };
    leave_current_room(state, ident);

    let player = Player::new(name, session::new_token(), Some(tx.clone()));
    let token = player.token.clone();
    let player_id = player.id;
    let (code, room) = state.registry.create(player);
    let players = room.lock().roster();
    let _ = tx.send(ServerEvent::SessionCreated {
        token,
        room_code: code.clone(),
        players,
    });
    tracing::info!(room = %code, "room created");
    *ident = Some((code, player_id));
}

fn handle_join(
    state: &AppState,
    tx: &UnboundedSender<ServerEvent>,
    ident: &mut ConnIdentity,
    room_code: String,
    name: String,
) {
    let Some(name) = valid_name(tx, name) else { return };
    let Some(room) = state.registry.get(&room_code) else {
        let _ = tx.send(ServerEvent::Error { message: GameError::RoomNotFound.to_string() });
        return;
    };
    leave_current_room(state, ident);

    let player = Player::new(name, session::new_token(), Some(tx.clone()));
    let token = player.token.clone();
    let player_id = player.id;
    let result = {
        let mut r = room.lock();
        r.add_player(player).map(|()| r.roster())
    };
    match result {
        Ok(players) => {
            let _ = tx.send(ServerEvent::SessionCreated {
                token,
                room_code: room_code.clone(),
                players: players.clone(),
            });
            broadcast(&room, &ServerEvent::UpdatePlayerList { players });
            tracing::info!(room = %room_code, player = %player_id, "player joined");
            *ident = Some((room_code, player_id));
        }
        Err(err) => {
            let _ = tx.send(ServerEvent::Error { message: err.to_string() });
        }
    }
}

fn handle_start(state: &AppState, ident: &ConnIdentity, room_code: &str) {
    let Some((_, player_id)) = ident else { return };
    let Some(room) = room_for(state, ident, room_code) else { return };
    // Non-host calls and under-filled lobbies are silent no-ops.
    let started = room.lock().start_game(*player_id);
    if started {
        tracing::info!(room = %room_code, "game started");
        advance_turn(state, room_code);
    }
}

fn handle_pass(state: &AppState, ident: &ConnIdentity, room_code: &str) {
    let Some((_, player_id)) = ident else { return };
    let Some(room) = room_for(state, ident, room_code) else { return };
    // Only the turn holder may pass; anyone else is ignored.
    let passed = room.lock().pass(*player_id);
    if let Ok(outcome) = passed {
        broadcast(
            &room,
            &ServerEvent::TurnResult { message: outcome.message, scores: outcome.scores },
        );
        schedule_turn_advance(state, room_code);
    }
}

fn handle_vote(state: &AppState, ident: &ConnIdentity, room_code: &str, vote: Verdict) {
    let Some((_, player_id)) = ident else { return };
    let Some(room) = room_for(state, ident, room_code) else { return };
    // Duplicate, holder, and out-of-window votes are dropped silently.
    let voted = room.lock().submit_vote(*player_id, vote);
    if let Ok(Some(outcome)) = voted {
        broadcast(
            &room,
            &ServerEvent::TurnResult { message: outcome.message, scores: outcome.scores },
        );
        schedule_turn_advance(state, room_code);
    }
}

/// Start the next turn, or finish the game if the budget is spent or too
/// few players remain. Safe to call from any timer: a vanished or already
/// finished room degrades to a no-op.
pub fn advance_turn(state: &AppState, code: &str) {
    let Some(room) = state.registry.get(code) else { return };
    let advance = room.lock().begin_turn(&state.catalog);
    match advance {
        TurnAdvance::Turn { player, task } => {
            broadcast(&room, &ServerEvent::NewTurn { player, task });
        }
        TurnAdvance::GameOver(report) => {
            broadcast(
                &room,
                &ServerEvent::GameEnd { scores: report.scores, last_player: report.last_player },
            );
            schedule_room_destruction(state, code);
        }
        TurnAdvance::Idle => {}
    }
}

/// Queue the next turn once clients have had time to show the result.
fn schedule_turn_advance(state: &AppState, code: &str) {
    let state = state.clone();
    let code = code.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(TURN_ADVANCE_DELAY).await;
        advance_turn(&state, &code);
    });
}

/// Tear a finished room down after the score screen has had its moment.
pub fn schedule_room_destruction(state: &AppState, code: &str) {
    let state = state.clone();
    let code = code.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(ROOM_EXPIRY).await;
        state.registry.remove(&code);
    });
}

/// Send one event to every connected member of the room.
pub fn broadcast(room: &SharedRoom, event: &ServerEvent) {
    let r = room.lock();
    for player in &r.players {
        if let Some(tx) = &player.tx {
            let _ = tx.send(event.clone());
        }
    }
}

/// Resolve the room an intent targets, requiring the sender to actually
/// be bound to it. Mismatches and unknown codes are ignored.
fn room_for(state: &AppState, ident: &ConnIdentity, room_code: &str) -> Option<SharedRoom> {
    match ident {
        Some((code, _)) if code == room_code => state.registry.get(room_code),
        _ => None,
    }
}

fn valid_name(tx: &UnboundedSender<ServerEvent>, name: String) -> Option<String> {
    let name = name.trim().to_string();
    if name.is_empty() {
        let _ = tx.send(ServerEvent::Error { message: "Name cannot be empty.".into() });
        return None;
    }
    Some(name)
}

/// A connection that creates or joins a new room while already seated
/// elsewhere gives up its old seat first.
fn leave_current_room(state: &AppState, ident: &mut ConnIdentity) {
    if let Some((old_code, old_id)) = ident.take() {
        session::disconnect(state, &old_code, old_id);
    }
}
