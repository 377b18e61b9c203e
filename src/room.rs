//! Room and player entities plus the turn state machine.
//!
//! Everything here is synchronous and transport-free: the gateway feeds
//! intents in, gets outcome values back, and decides what to broadcast and
//! what to schedule. Timers and sockets never reach into this module.

use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::catalog::{draw_penalty, Task, TaskCatalog};
use crate::config::ROUND_MULTIPLIER;
use crate::protocol::{
    LastPlayer, PhaseWire, PlayerPublic, RoomSnapshot, ScoreEntry, ServerEvent, TurnPlayer, Verdict,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Room not found.")]
    RoomNotFound,
    #[error("The game has already started.")]
    GameAlreadyStarted,
    #[error("A player named \"{0}\" is already in the room.")]
    NameTaken(String),
    /// Non-host calling a host action, or a non-holder passing. Never
    /// surfaced to clients.
    #[error("not authorized")]
    NotAuthorized,
    /// Duplicate or ineligible vote. Never surfaced to clients.
    #[error("vote rejected")]
    VoteRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    InProgress,
    Finished,
}

impl Phase {
    pub fn wire(self) -> PhaseWire {
        match self {
            Phase::Lobby => PhaseWire::Lobby,
            Phase::InProgress => PhaseWire::InProgress,
            Phase::Finished => PhaseWire::Finished,
        }
    }
}

#[derive(Debug)]
pub struct Player {
    pub id: Uuid,
    /// Durable reconnect credential; the only secret in the system.
    pub token: String,
    pub name: String,
    pub score: i32,
    pub connected: bool,
    pub disconnected_at: Option<OffsetDateTime>,
    /// Bound while a socket is attached, dropped on disconnect.
    pub tx: Option<UnboundedSender<ServerEvent>>,
}

impl Player {
    pub fn new(name: String, token: String, tx: Option<UnboundedSender<ServerEvent>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            token,
            name,
            score: 0,
            connected: true,
            disconnected_at: None,
            tx,
        }
    }

    fn public(&self) -> PlayerPublic {
        PlayerPublic {
            id: self.id,
            name: self.name.clone(),
            score: self.score,
            connected: self.connected,
        }
    }

    fn turn_player(&self) -> TurnPlayer {
        TurnPlayer { id: self.id, name: self.name.clone() }
    }
}

#[derive(Debug)]
struct Vote {
    voter: Uuid,
    verdict: Verdict,
}

/// What `begin_turn` decided.
#[derive(Debug)]
pub enum TurnAdvance {
    Turn { player: TurnPlayer, task: Task },
    GameOver(GameOverReport),
    /// Room not in a state where a turn can start (e.g. already finished
    /// by the time a scheduled advance fired).
    Idle,
}

/// Payload of a resolved turn (vote outcome or pass).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub message: String,
    pub scores: Vec<ScoreEntry>,
}

#[derive(Debug, Clone)]
pub struct GameOverReport {
    pub scores: Vec<ScoreEntry>,
    pub last_player: LastPlayer,
}

/// What removing a player implies for the room's lifecycle.
#[derive(Debug, Clone, Copy)]
pub struct Removal {
    pub room_empty: bool,
    pub below_minimum: bool,
}

#[derive(Debug)]
pub struct Room {
    pub code: String,
    pub created_at: OffsetDateTime,
    /// Join order; turn order derives from the connected subset of this.
    pub players: Vec<Player>,
    pub host_id: Uuid,
    pub phase: Phase,
    used_task_ids: Vec<u32>,
    round: u32,
    current_player: Option<Uuid>,
    current_task: Option<Task>,
    /// `Some` while a voting window is open for the current turn.
    votes: Option<Vec<Vote>>,
}

impl Room {
    pub fn new(code: String, host: Player) -> Self {
        let host_id = host.id;
        Self {
            code,
            created_at: OffsetDateTime::now_utc(),
            players: vec![host],
            host_id,
            phase: Phase::Lobby,
            used_task_ids: Vec::new(),
            round: 0,
            current_player: None,
            current_task: None,
            votes: None,
        }
    }

    pub fn player(&self, id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    fn player_mut(&mut self, id: Uuid) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn player_by_token(&self, token: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.token == token)
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn current_player_id(&self) -> Option<Uuid> {
        self.current_player
    }

    pub fn current_task(&self) -> Option<&Task> {
        self.current_task.as_ref()
    }

    fn connected(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.connected)
    }

    pub fn connected_count(&self) -> usize {
        self.connected().count()
    }

    /// Connected-only roster, in join order.
    pub fn roster(&self) -> Vec<PlayerPublic> {
        self.connected().map(Player::public).collect()
    }

    /// All players' scores, in join order.
    pub fn scoreboard(&self) -> Vec<ScoreEntry> {
        self.players
            .iter()
            .map(|p| ScoreEntry { name: p.name.clone(), score: p.score })
            .collect()
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            phase: self.phase.wire(),
            players: self.players.iter().map(Player::public).collect(),
            host_id: self.host_id,
            round: self.round,
            current_task: self.current_task.clone(),
            current_player: self
                .current_player
                .and_then(|id| self.player(id))
                .map(Player::turn_player),
        }
    }

    /// Append a player to the roster. Names are unique per room,
    /// case-insensitively, across connected and disconnected players alike.
    pub fn add_player(&mut self, player: Player) -> Result<(), GameError> {
        if self.phase != Phase::Lobby {
            return Err(GameError::GameAlreadyStarted);
        }
        if self
            .players
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(&player.name))
        {
            return Err(GameError::NameTaken(player.name));
        }
        self.players.push(player);
        Ok(())
    }

    /// Host-only lobby-to-game transition. Invalid calls are a silent no-op,
    /// matching the intentionally low-stakes authorization model.
    pub fn start_game(&mut self, caller: Uuid) -> bool {
        if self.phase != Phase::Lobby || caller != self.host_id || self.connected_count() < 2 {
            return false;
        }
        self.phase = Phase::InProgress;
        true
    }

    /// Advance to the next turn: pick the holder from the connected players,
    /// draw a task, open the voting window. Ends the game instead when the
    /// round budget is spent or too few players remain.
    pub fn begin_turn(&mut self, catalog: &TaskCatalog) -> TurnAdvance {
        if self.phase != Phase::InProgress {
            return TurnAdvance::Idle;
        }
        let active: Vec<Uuid> = self.connected().map(|p| p.id).collect();
        if active.len() < 2 {
            return TurnAdvance::GameOver(self.end_game("not enough players left"));
        }
        // Holder slot and round budget both track the *current* connected
        // count, so a departed player's slot is absorbed rather than skipped.
        let holder_idx = (self.round as usize) % active.len();
        let total_rounds = active.len() as u32 * ROUND_MULTIPLIER;
        if self.round >= total_rounds {
            return TurnAdvance::GameOver(self.end_game("all rounds completed"));
        }
        self.round += 1;

        if catalog.all_used(&self.used_task_ids) {
            // Catalog exhausted within this room; start a fresh cycle.
            self.used_task_ids.clear();
        }
        let Some(task) = catalog.draw(&self.used_task_ids).cloned() else {
            return TurnAdvance::Idle;
        };
        self.used_task_ids.push(task.id);
        self.current_task = Some(task.clone());
        self.current_player = Some(active[holder_idx]);
        self.votes = Some(Vec::new());

        let holder = match self.player(active[holder_idx]) {
            Some(p) => p.turn_player(),
            None => return TurnAdvance::Idle,
        };
        TurnAdvance::Turn { player: holder, task }
    }

    /// Turn holder skips their task. Counts as a plain miss: no score change,
    /// the turn closes and the next one is due after the display delay.
    pub fn pass(&mut self, caller: Uuid) -> Result<TurnOutcome, GameError> {
        if self.votes.is_none() || self.current_player != Some(caller) {
            return Err(GameError::NotAuthorized);
        }
        let name = self
            .player(caller)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        self.close_turn();
        Ok(TurnOutcome {
            message: format!("{name} passed this turn."),
            scores: self.scoreboard(),
        })
    }

    /// Record a verdict from a non-holder. Resolves the turn once every
    /// connected player except the holder has voted; later votes for the
    /// same turn hit the closed window and are rejected.
    pub fn submit_vote(
        &mut self,
        voter: Uuid,
        verdict: Verdict,
    ) -> Result<Option<TurnOutcome>, GameError> {
        let holder = self.current_player;
        let eligible = self.player(voter).is_some_and(|p| p.connected);
        let Some(votes) = self.votes.as_mut() else {
            return Err(GameError::VoteRejected);
        };
        if holder == Some(voter) || !eligible || votes.iter().any(|v| v.voter == voter) {
            return Err(GameError::VoteRejected);
        }
        votes.push(Vote { voter, verdict });

        let required = self.connected_count().saturating_sub(1);
        let cast = self.votes.as_ref().map(Vec::len).unwrap_or(0);
        if cast >= required {
            return Ok(Some(self.resolve_votes()));
        }
        Ok(None)
    }

    fn resolve_votes(&mut self) -> TurnOutcome {
        let votes = self.votes.take().unwrap_or_default();
        let done = votes.iter().filter(|v| v.verdict == Verdict::Done).count();
        let not_done = votes.len() - done;

        let holder_id = self.current_player;
        self.close_turn();

        let message = match holder_id.and_then(|id| self.player_mut(id)) {
            Some(holder) if done >= not_done => {
                holder.score += 2;
                format!("{} pulled the task off!", holder.name)
            }
            Some(holder) => {
                holder.score -= 1;
                format!("{} couldn't convince the room!", holder.name)
            }
            None => String::new(),
        };
        TurnOutcome { message, scores: self.scoreboard() }
    }

    fn close_turn(&mut self) {
        self.votes = None;
        self.current_task = None;
    }

    /// Terminal transition. Ranking is score-descending with ties left in
    /// join order; the penalty goes to the lowest-scoring connected player,
    /// earliest-joined on a tie.
    pub fn end_game(&mut self, reason: &str) -> GameOverReport {
        tracing::info!(room = %self.code, reason, "game over");
        self.phase = Phase::Finished;
        self.close_turn();
        self.current_player = None;

        let mut ranked: Vec<&Player> = self.players.iter().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        let scores = ranked
            .iter()
            .map(|p| ScoreEntry { name: p.name.clone(), score: p.score })
            .collect();

        let loser = self
            .connected()
            .min_by_key(|p| p.score)
            .or_else(|| self.players.first());
        let last_player = LastPlayer {
            name: loser.map(|p| p.name.clone()).unwrap_or_default(),
            penalty: draw_penalty().to_string(),
        };
        GameOverReport { scores, last_player }
    }

    /// Flip a player to disconnected and migrate the host role if needed.
    /// The player stays on the roster until the grace period expires.
    pub fn mark_disconnected(&mut self, id: Uuid, now: OffsetDateTime) -> bool {
        let Some(player) = self.player_mut(id) else { return false };
        player.connected = false;
        player.disconnected_at = Some(now);
        player.tx = None;
        if self.host_id == id {
            let next = self.connected().next().map(|p| p.id);
            if let Some(next) = next {
                tracing::info!(room = %self.code, host = %next, "host migrated");
                self.host_id = next;
            }
        }
        true
    }

    /// Rebind a returning player's connection. Token is the sole credential;
    /// score and roster position are untouched.
    pub fn rebind(&mut self, token: &str, tx: UnboundedSender<ServerEvent>) -> Option<Uuid> {
        let player = self.players.iter_mut().find(|p| p.token == token)?;
        player.connected = true;
        player.disconnected_at = None;
        player.tx = Some(tx);
        Some(player.id)
    }

    /// Permanently drop a player (grace period ran out). Reports what the
    /// caller must do next: destroy the room, or end a short-handed game.
    pub fn remove_player(&mut self, id: Uuid) -> Removal {
        self.players.retain(|p| p.id != id);
        if self.host_id == id {
            let next = self.connected().next().map(|p| p.id);
            if let Some(next) = next {
                self.host_id = next;
            }
        }
        Removal {
            room_empty: self.players.is_empty(),
            below_minimum: self.phase == Phase::InProgress && self.connected_count() < 2,
        }
    }
}
