//! Task catalog: immutable list of task descriptors loaded once at boot.

use std::path::Path;

use anyhow::Context;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// One drawable task. Never mutated after load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Penalties handed to the lowest scorer when a game ends.
pub const PENALTIES: &[&str] = &[
    "Buys the next round of drinks.",
    "Posts the group's next story.",
    "Plays their favorite song and dances to it.",
];

#[derive(Debug)]
pub struct TaskCatalog {
    tasks: Vec<Task>,
}

impl TaskCatalog {
    /// Load the catalog from a JSON file. Any failure here is fatal for the
    /// process: the game cannot run without tasks.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading task catalog {}", path.display()))?;
        let tasks: Vec<Task> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing task catalog {}", path.display()))?;
        anyhow::ensure!(!tasks.is_empty(), "task catalog {} is empty", path.display());
        Ok(Self { tasks })
    }

    /// Build a catalog directly from tasks. Callers keep the non-empty
    /// invariant that `load` enforces.
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Uniform-random task not in `used`. When `used` covers the whole
    /// catalog the caller is expected to reset it first; a draw over a
    /// non-empty catalog otherwise always succeeds.
    pub fn draw(&self, used: &[u32]) -> Option<&Task> {
        let candidates: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| !used.contains(&t.id))
            .collect();
        candidates.choose(&mut rand::thread_rng()).copied()
    }

    pub fn all_used(&self, used: &[u32]) -> bool {
        self.tasks.iter().all(|t| used.contains(&t.id))
    }
}

/// Random penalty for the game's loser.
pub fn draw_penalty() -> &'static str {
    PENALTIES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(PENALTIES[0])
}
