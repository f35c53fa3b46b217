// Player registry records: divisions, status, and bag tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Row id of a player in the registry.
pub type PlayerId = i64;

/// A bag tag number. Lower is better; tag 1 is the top of the ladder.
pub type Tag = u32;

/// Ladder divisions. Every player belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Division {
    Mixed,
    Female,
    Junior,
    Senior,
}

impl Division {
    /// All divisions in display order.
    pub const ALL: [Division; 4] = [
        Division::Mixed,
        Division::Female,
        Division::Junior,
        Division::Senior,
    ];

    /// Parse a division name (case-insensitive).
    pub fn from_str_div(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mixed" => Some(Division::Mixed),
            "female" => Some(Division::Female),
            "junior" => Some(Division::Junior),
            "senior" => Some(Division::Senior),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Division::Mixed => "Mixed",
            Division::Female => "Female",
            Division::Junior => "Junior",
            Division::Senior => "Senior",
        }
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a player currently takes part in the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerStatus {
    Active,
    Inactive,
}

impl PlayerStatus {
    pub fn from_str_status(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(PlayerStatus::Active),
            "inactive" => Some(PlayerStatus::Inactive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerStatus::Active => "Active",
            PlayerStatus::Inactive => "Inactive",
        }
    }
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A player as stored in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub division: Division,
    pub status: PlayerStatus,
    /// Current bag tag, or `None` when the player is unranked.
    pub tag: Option<Tag>,
    /// Bumped on every tag write. Used to detect stale snapshots when a
    /// challenge result is persisted.
    pub tag_version: i64,
}

impl Player {
    pub fn is_active(&self) -> bool {
        self.status == PlayerStatus::Active
    }
}

/// Fields for creating or editing a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlayer {
    pub name: String,
    pub division: Division,
    pub status: PlayerStatus,
    pub tag: Option<Tag>,
}

/// Format a tag for display: `#7`, or `#-` when unranked.
pub fn format_tag(tag: Option<Tag>) -> String {
    match tag {
        Some(t) => format!("#{t}"),
        None => "#-".to_string(),
    }
}
