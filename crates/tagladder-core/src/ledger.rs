// Tag history ledger rows.
//
// The ledger is append-only: rows are written once, in the same transaction
// as the tag updates they describe, and never edited. Reads come back newest
// first, with ties on the timestamp broken by insertion order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::challenge::{ChallengeId, ChallengeType};
use crate::player::{Division, PlayerId, Tag};
use crate::reconcile::TagChange;

/// One recorded tag move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub player_id: PlayerId,
    pub old_tag: Tag,
    pub new_tag: Tag,
    pub changed_at: DateTime<Utc>,
    pub challenge_id: ChallengeId,
}

/// Build ledger rows for a challenge's tag changes. Unchanged participants
/// never reach this point, so every row describes a real move.
pub fn entries_for(
    changes: &[TagChange],
    challenge_id: ChallengeId,
    changed_at: DateTime<Utc>,
) -> Vec<HistoryEntry> {
    changes
        .iter()
        .filter(|c| c.old_tag != c.new_tag)
        .map(|c| HistoryEntry {
            player_id: c.player_id,
            old_tag: c.old_tag,
            new_tag: c.new_tag,
            changed_at,
            challenge_id,
        })
        .collect()
}

/// Direction of a tag move. Lower tags are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Improved(u32),
    Worsened(u32),
    Unchanged,
}

impl Movement {
    pub fn between(old_tag: Tag, new_tag: Tag) -> Self {
        if new_tag < old_tag {
            Movement::Improved(old_tag - new_tag)
        } else if new_tag > old_tag {
            Movement::Worsened(new_tag - old_tag)
        } else {
            Movement::Unchanged
        }
    }

    /// Short display form, e.g. `+3` for a climb of three places.
    pub fn label(&self) -> String {
        match self {
            Movement::Improved(n) => format!("+{n}"),
            Movement::Worsened(n) => format!("-{n}"),
            Movement::Unchanged => "=".to_string(),
        }
    }
}

/// A history row joined with player and challenge details for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryView {
    pub id: i64,
    pub player_id: PlayerId,
    pub player_name: String,
    pub division: Division,
    pub old_tag: Tag,
    pub new_tag: Tag,
    pub changed_at: DateTime<Utc>,
    pub challenge_id: ChallengeId,
    pub challenge_type: ChallengeType,
}

impl HistoryView {
    pub fn movement(&self) -> Movement {
        Movement::between(self.old_tag, self.new_tag)
    }
}
