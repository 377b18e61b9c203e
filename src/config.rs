//! Configuration utilities (ports, file paths, design constants).

use std::{env, net::{Ipv4Addr, SocketAddr}};
use std::path::PathBuf;
use std::time::Duration;

/// Socket address to bind the server to.
///
/// Reads the `PORT` env var or defaults to 8080, binds to 0.0.0.0.
pub fn server_addr() -> SocketAddr {
    let port = env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

/// Path to the task catalog JSON, overridable with `TASKS_PATH`.
pub fn tasks_path() -> PathBuf {
    env::var("TASKS_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("tasks.json"))
}

/// Rounds played per game = connected players at game start x this.
pub const ROUND_MULTIPLIER: u32 = 5;

/// How long a disconnected player's seat is held before removal.
pub const GRACE_PERIOD: Duration = Duration::from_secs(60);

/// Pause between a turn result being shown and the next turn starting.
pub const TURN_ADVANCE_DELAY: Duration = Duration::from_secs(4);

/// How long a finished room stays around for late score viewing.
pub const ROOM_EXPIRY: Duration = Duration::from_secs(300);

/// Entropy of a reconnect token, in bytes (hex-encoded on the wire).
pub const TOKEN_BYTES: usize = 16;

/// Entropy of a room code, in bytes (uppercase hex, so 6 typeable chars).
pub const ROOM_CODE_BYTES: usize = 3;
