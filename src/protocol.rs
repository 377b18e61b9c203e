//! Wire protocol: client intents in, server notifications out.
//!
//! Both directions are JSON objects tagged with a `type` field, e.g.
//! `{"type":"submit_vote","room_code":"A1B2C3","vote":"done"}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::Task;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientIntent {
    CreateRoom { name: String },
    JoinRoom { room_code: String, name: String },
    ReconnectWithToken { token: String, room_code: Option<String> },
    StartGame { room_code: String },
    PassTask { room_code: String },
    SubmitVote { room_code: String, vote: Verdict },
}

/// A voter's call on whether the turn holder completed the task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Done,
    NotDone,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// To the joining/creating connection only: its reconnect credential.
    SessionCreated {
        token: String,
        room_code: String,
        players: Vec<PlayerPublic>,
    },
    /// To a reconnecting connection only: everything needed to resume.
    ReconnectSuccess { room: RoomSnapshot },
    /// Connected-only roster, to the whole room.
    UpdatePlayerList { players: Vec<PlayerPublic> },
    NewTurn { player: TurnPlayer, task: Task },
    TurnResult { message: String, scores: Vec<ScoreEntry> },
    GameEnd { scores: Vec<ScoreEntry>, last_player: LastPlayer },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerPublic {
    pub id: Uuid,
    pub name: String,
    pub score: i32,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnPlayer {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreEntry {
    pub name: String,
    pub score: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastPlayer {
    pub name: String,
    pub penalty: String,
}

/// Full room view sent on reconnect so the client resumes without history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomSnapshot {
    pub code: String,
    pub phase: PhaseWire,
    pub players: Vec<PlayerPublic>,
    pub host_id: Uuid,
    pub round: u32,
    pub current_task: Option<Task>,
    pub current_player: Option<TurnPlayer>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseWire {
    Lobby,
    InProgress,
    Finished,
}
