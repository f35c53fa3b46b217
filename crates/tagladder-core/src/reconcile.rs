// Tag reconciliation: redistributes the bag tags held by a challenge's
// participants according to the finish order.
//
// One algorithm covers both challenge types; a direct challenge is the
// two-participant case of a group challenge.
//
// 1. Collect each participant's current tag (untagged players per policy).
// 2. Sort the collected tags ascending: this is the tag pool.
// 3. Sort participants by finish position, best first.
// 4. Hand out the pool in order, so the best finisher gets the lowest tag.
// 5. Report a change only where the tag actually moved.
//
// The result is a permutation of the pool over the participants: no tag is
// created or destroyed, and a better finish never yields a higher tag.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::challenge::FinishPosition;
use crate::player::{PlayerId, Tag};
use crate::validate::{check_dense_order, OrderingError};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// What to do with a participant who holds no tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UntaggedPolicy {
    /// Refuse the whole challenge.
    #[default]
    Reject,
    /// Leave the untagged participant unranked and reconcile the tagged
    /// participants among themselves.
    Exclude,
}

// ---------------------------------------------------------------------------
// Input / output
// ---------------------------------------------------------------------------

/// A participant's finish position and the tag they hold going in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing {
    pub player_id: PlayerId,
    pub finish_position: FinishPosition,
    pub tag: Option<Tag>,
}

/// A participant's tag before and after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantOutcome {
    pub player_id: PlayerId,
    pub finish_position: FinishPosition,
    pub tag_before: Option<Tag>,
    pub tag_after: Option<Tag>,
}

impl ParticipantOutcome {
    pub fn changed(&self) -> bool {
        self.tag_before != self.tag_after
    }
}

/// A single tag move to persist and record in the history ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagChange {
    pub player_id: PlayerId,
    pub old_tag: Tag,
    pub new_tag: Tag,
}

/// Result of reconciling one challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Every participant in finish order, changed or not.
    pub participants: Vec<ParticipantOutcome>,
    /// Only the participants whose tag moved, in finish order.
    pub changes: Vec<TagChange>,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn outcome_for(&self, player_id: PlayerId) -> Option<&ParticipantOutcome> {
        self.participants.iter().find(|p| p.player_id == player_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Ordering(#[from] OrderingError),

    #[error("player {player_id} is entered more than once")]
    DuplicatePlayer { player_id: PlayerId },

    #[error("player {player_id} holds no tag and cannot take part in a ranked challenge")]
    UntaggedParticipant { player_id: PlayerId },

    #[error("tag #{tag} is held by more than one participant")]
    DuplicateTag { tag: Tag },
}

// ---------------------------------------------------------------------------
// Core computation
// ---------------------------------------------------------------------------

/// Reassign the participants' tags by finish order.
///
/// Finish positions are re-checked here even though the validator already
/// did so; malformed input is refused rather than reconciled.
pub fn reconcile(
    standings: &[Standing],
    policy: UntaggedPolicy,
) -> Result<Reconciliation, ReconcileError> {
    let positions: Vec<FinishPosition> = standings.iter().map(|s| s.finish_position).collect();
    check_dense_order(&positions)?;

    let mut seen = HashSet::with_capacity(standings.len());
    for s in standings {
        if !seen.insert(s.player_id) {
            return Err(ReconcileError::DuplicatePlayer {
                player_id: s.player_id,
            });
        }
    }

    let mut ordered: Vec<&Standing> = standings.iter().collect();
    ordered.sort_by_key(|s| s.finish_position);

    if policy == UntaggedPolicy::Reject {
        if let Some(s) = ordered.iter().find(|s| s.tag.is_none()) {
            return Err(ReconcileError::UntaggedParticipant {
                player_id: s.player_id,
            });
        }
    }

    let mut pool: Vec<Tag> = ordered.iter().filter_map(|s| s.tag).collect();
    pool.sort_unstable();
    if let Some(pair) = pool.windows(2).find(|w| w[0] == w[1]) {
        return Err(ReconcileError::DuplicateTag { tag: pair[0] });
    }

    // The pool has exactly one entry per tagged participant, so every tagged
    // participant draws a tag and untagged ones draw nothing.
    let mut draw = pool.into_iter();
    let participants: Vec<ParticipantOutcome> = ordered
        .iter()
        .map(|s| ParticipantOutcome {
            player_id: s.player_id,
            finish_position: s.finish_position,
            tag_before: s.tag,
            tag_after: s.tag.and_then(|_| draw.next()),
        })
        .collect();

    let changes: Vec<TagChange> = participants
        .iter()
        .filter_map(|p| match (p.tag_before, p.tag_after) {
            (Some(old_tag), Some(new_tag)) if old_tag != new_tag => Some(TagChange {
                player_id: p.player_id,
                old_tag,
                new_tag,
            }),
            _ => None,
        })
        .collect();

    debug!(
        "Reconciled {} participants: {} tag changes",
        participants.len(),
        changes.len()
    );

    Ok(Reconciliation {
        participants,
        changes,
    })
}
