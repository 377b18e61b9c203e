//! Registry of live rooms, keyed by their short join code.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::RngCore;

use crate::config::ROOM_CODE_BYTES;
use crate::room::{Player, Room};

pub type SharedRoom = Arc<Mutex<Room>>;

#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, SharedRoom>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self { rooms: DashMap::new() }
    }

    /// Create a room with `host` as its sole player, under a fresh code.
    /// Codes are short enough to type off someone's screen, so collisions
    /// are possible and retried.
    pub fn create(&self, host: Player) -> (String, SharedRoom) {
        let code = loop {
            let candidate = new_room_code();
            if !self.rooms.contains_key(&candidate) {
                break candidate;
            }
        };
        let room = Arc::new(Mutex::new(Room::new(code.clone(), host)));
        self.rooms.insert(code.clone(), room.clone());
        (code, room)
    }

    pub fn get(&self, code: &str) -> Option<SharedRoom> {
        self.rooms.get(code).map(|r| r.clone())
    }

    /// Idempotent: removing an unknown or already-removed code is a no-op.
    pub fn remove(&self, code: &str) {
        if self.rooms.remove(code).is_some() {
            tracing::info!(room = %code, "room destroyed");
        }
    }

    /// Scan every room for a player holding `token`. Supports the
    /// hint-less reconnect shape; rooms are few and scans are cheap.
    pub fn find_by_token(&self, token: &str) -> Option<(String, SharedRoom)> {
        self.rooms.iter().find_map(|entry| {
            let holds = entry.value().lock().player_by_token(token).is_some();
            holds.then(|| (entry.key().clone(), entry.value().clone()))
        })
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }
}

/// 3 random bytes as uppercase hex: a 6-character human-typeable code.
fn new_room_code() -> String {
    let mut bytes = [0u8; ROOM_CODE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}
