//! Durable player identity: reconnect tokens, disconnects, grace expiry.
//!
//! A player's seat survives a dropped socket for [`GRACE_PERIOD`]. The
//! expiry timer carries only stable identifiers plus the disconnect stamp
//! and re-resolves everything at fire time, so a player who reconnected
//! (or reconnected and dropped again) is never reaped by a stale timer.

use rand::RngCore;
use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::config::{GRACE_PERIOD, TOKEN_BYTES};
use crate::gateway::{broadcast, schedule_room_destruction, AppState};
use crate::protocol::{PlayerPublic, ServerEvent};
use crate::room::GameOverReport;

/// Fresh reconnect credential: 16 random bytes, hex on the wire.
pub fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Rebind a returning player's socket. Works with or without a room hint;
/// any miss (unknown room, unknown token) is a silent no-op.
pub fn reconnect(
    state: &AppState,
    token: &str,
    room_hint: Option<&str>,
    tx: &UnboundedSender<ServerEvent>,
) -> Option<(String, Uuid)> {
    let (code, room) = match room_hint {
        Some(hint) => (hint.to_string(), state.registry.get(hint)?),
        None => state.registry.find_by_token(token)?,
    };
    let mut r = room.lock();
    let player_id = r.rebind(token, tx.clone())?;
    let snapshot = r.snapshot();
    let roster = r.roster();
    drop(r);

    let _ = tx.send(ServerEvent::ReconnectSuccess { room: snapshot });
    broadcast(&room, &ServerEvent::UpdatePlayerList { players: roster });
    tracing::info!(room = %code, player = %player_id, "player reconnected");
    Some((code, player_id))
}

/// Socket gone: flip the player to disconnected, tell the room, and arm
/// the grace-period timer.
pub fn disconnect(state: &AppState, code: &str, player_id: Uuid) {
    let Some(room) = state.registry.get(code) else { return };
    let stamp = OffsetDateTime::now_utc();
    let roster = {
        let mut r = room.lock();
        if !r.mark_disconnected(player_id, stamp) {
            return;
        }
        r.roster()
    };
    broadcast(&room, &ServerEvent::UpdatePlayerList { players: roster });
    tracing::info!(room = %code, player = %player_id, "player disconnected, grace period armed");

    let state = state.clone();
    let code = code.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(GRACE_PERIOD).await;
        expire_if_still_gone(&state, &code, player_id, stamp);
    });
}

enum ExpiryEffect {
    Roster(Vec<PlayerPublic>),
    Ended { roster: Vec<PlayerPublic>, report: GameOverReport },
    Destroy,
}

/// Grace timer fired. Acts only if the player is still the same disconnect
/// we armed against; otherwise the removal is abandoned.
pub fn expire_if_still_gone(
    state: &AppState,
    code: &str,
    player_id: Uuid,
    stamp: OffsetDateTime,
) {
    let Some(room) = state.registry.get(code) else { return };

    let effect = {
        let mut r = room.lock();
        match r.player(player_id) {
            Some(p) if !p.connected && p.disconnected_at == Some(stamp) => {}
            _ => return,
        }
        tracing::info!(room = %code, player = %player_id, "grace period expired, removing player");
        let removal = r.remove_player(player_id);
        if removal.room_empty {
            ExpiryEffect::Destroy
        } else if removal.below_minimum {
            let report = r.end_game("not enough players left");
            ExpiryEffect::Ended { roster: r.roster(), report }
        } else {
            ExpiryEffect::Roster(r.roster())
        }
    };

    match effect {
        ExpiryEffect::Destroy => state.registry.remove(code),
        ExpiryEffect::Roster(players) => {
            broadcast(&room, &ServerEvent::UpdatePlayerList { players });
        }
        ExpiryEffect::Ended { roster, report } => {
            broadcast(&room, &ServerEvent::UpdatePlayerList { players: roster });
            broadcast(
                &room,
                &ServerEvent::GameEnd { scores: report.scores, last_player: report.last_player },
            );
            schedule_room_destruction(state, code);
        }
    }
}
