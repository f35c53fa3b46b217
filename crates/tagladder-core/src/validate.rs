// Challenge validation: shape checks on a submission, and checks against the
// player registry. Nothing here has side effects.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::warn;

use crate::challenge::{
    ChallengeSubmission, ChallengeType, FinishPosition, Placement, ValidatedChallenge,
};
use crate::player::{Division, Player, PlayerId};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A malformed submission: wrong participant count, duplicate players, a
/// missing or invalid winner, or participants the registry does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{challenge_type} challenge needs {expected} participants, got {actual}")]
    ParticipantCount {
        challenge_type: ChallengeType,
        expected: &'static str,
        actual: usize,
    },

    #[error("player {player_id} is entered more than once")]
    DuplicatePlayer { player_id: PlayerId },

    #[error("direct challenge has no winner")]
    MissingWinner,

    #[error("winner {winner_id} is not one of the two participants")]
    WinnerNotParticipant { winner_id: PlayerId },

    #[error("finish positions disagree with declared winner {winner_id}")]
    WinnerPositionMismatch { winner_id: PlayerId },

    #[error("player {player_id} is not in the registry")]
    UnknownPlayer { player_id: PlayerId },

    #[error("player {player_id} ({name}) is inactive")]
    InactivePlayer { player_id: PlayerId, name: String },

    #[error("player {player_id} ({name}) plays in {actual}, not {expected}")]
    DivisionMismatch {
        player_id: PlayerId,
        name: String,
        expected: Division,
        actual: Division,
    },
}

/// Finish positions that are not a dense permutation of 1..=N.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderingError {
    #[error("player {player_id} has no finish position")]
    MissingPosition { player_id: PlayerId },

    #[error("finish position {position} is used more than once")]
    DuplicatePosition { position: FinishPosition },

    #[error("finish position {position} is outside 1..={participants}")]
    NotContiguous {
        position: FinishPosition,
        participants: usize,
    },
}

/// Either kind of rejection produced by `validate_submission`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Ordering(#[from] OrderingError),
}

// ---------------------------------------------------------------------------
// Finish order
// ---------------------------------------------------------------------------

/// Check that `positions` is a permutation of 1..=N, where N is its length.
///
/// With N entries, no duplicates, and every value inside 1..=N, the set is
/// exactly 1..=N, so this also rules out gaps.
pub fn check_dense_order(positions: &[FinishPosition]) -> Result<(), OrderingError> {
    let n = positions.len();
    let mut seen = vec![false; n];
    for &position in positions {
        let idx = position as usize;
        if idx == 0 || idx > n {
            return Err(OrderingError::NotContiguous {
                position,
                participants: n,
            });
        }
        if seen[idx - 1] {
            return Err(OrderingError::DuplicatePosition { position });
        }
        seen[idx - 1] = true;
    }
    Ok(())
}

fn check_distinct(ids: &[PlayerId]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(ids.len());
    for &player_id in ids {
        if !seen.insert(player_id) {
            return Err(ValidationError::DuplicatePlayer { player_id });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Submission shape
// ---------------------------------------------------------------------------

/// Validate the shape of a submission and normalize it into a finish order.
///
/// Direct challenges derive their order from `winner_id` (winner first).
/// Group challenges must carry a finish position on every participant.
pub fn validate_submission(
    submission: &ChallengeSubmission,
) -> Result<ValidatedChallenge, SubmissionError> {
    let mut finish_order = match submission.challenge_type {
        ChallengeType::Direct => direct_order(submission)?,
        ChallengeType::Group => group_order(submission)?,
    };
    finish_order.sort_by_key(|p| p.finish_position);

    let notes = submission
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    Ok(ValidatedChallenge {
        challenge_type: submission.challenge_type,
        division: submission.division,
        date: submission.date,
        notes,
        finish_order,
    })
}

fn direct_order(submission: &ChallengeSubmission) -> Result<Vec<Placement>, SubmissionError> {
    let parts = &submission.participants;
    if parts.len() != 2 {
        return Err(ValidationError::ParticipantCount {
            challenge_type: ChallengeType::Direct,
            expected: "exactly 2",
            actual: parts.len(),
        }
        .into());
    }
    check_distinct(&submission.player_ids())?;

    let winner_id = submission.winner_id.ok_or(ValidationError::MissingWinner)?;
    let (winner, loser) = if parts[0].player_id == winner_id {
        (&parts[0], &parts[1])
    } else if parts[1].player_id == winner_id {
        (&parts[1], &parts[0])
    } else {
        return Err(ValidationError::WinnerNotParticipant { winner_id }.into());
    };

    // Positions are optional here, but if given they must agree with the winner.
    let any_position = parts.iter().any(|p| p.finish_position.is_some());
    if any_position && (winner.finish_position != Some(1) || loser.finish_position != Some(2)) {
        return Err(ValidationError::WinnerPositionMismatch { winner_id }.into());
    }

    Ok(vec![
        Placement {
            player_id: winner.player_id,
            finish_position: 1,
        },
        Placement {
            player_id: loser.player_id,
            finish_position: 2,
        },
    ])
}

fn group_order(submission: &ChallengeSubmission) -> Result<Vec<Placement>, SubmissionError> {
    let parts = &submission.participants;
    if parts.len() < 2 {
        return Err(ValidationError::ParticipantCount {
            challenge_type: ChallengeType::Group,
            expected: "at least 2",
            actual: parts.len(),
        }
        .into());
    }
    check_distinct(&submission.player_ids())?;

    if let Some(winner_id) = submission.winner_id {
        warn!("Ignoring winner_id {winner_id} on group challenge; finish order decides");
    }

    let placements = parts
        .iter()
        .map(|p| {
            p.finish_position
                .map(|finish_position| Placement {
                    player_id: p.player_id,
                    finish_position,
                })
                .ok_or(OrderingError::MissingPosition {
                    player_id: p.player_id,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let positions: Vec<FinishPosition> = placements.iter().map(|p| p.finish_position).collect();
    check_dense_order(&positions)?;

    Ok(placements)
}

// ---------------------------------------------------------------------------
// Registry checks
// ---------------------------------------------------------------------------

/// Check every participant against the registry rows resolved for them:
/// the player must exist, be active, and play in the challenge's division.
pub fn check_registry(
    challenge: &ValidatedChallenge,
    players: &HashMap<PlayerId, Player>,
) -> Result<(), ValidationError> {
    for placement in &challenge.finish_order {
        let player = players
            .get(&placement.player_id)
            .ok_or(ValidationError::UnknownPlayer {
                player_id: placement.player_id,
            })?;

        if !player.is_active() {
            return Err(ValidationError::InactivePlayer {
                player_id: player.id,
                name: player.name.clone(),
            });
        }

        if player.division != challenge.division {
            return Err(ValidationError::DivisionMismatch {
                player_id: player.id,
                name: player.name.clone(),
                expected: challenge.division,
                actual: player.division,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::SubmittedParticipant;
    use crate::player::PlayerStatus;
    use chrono::TimeZone;

    fn at(p: PlayerId, pos: Option<FinishPosition>) -> SubmittedParticipant {
        SubmittedParticipant {
            player_id: p,
            finish_position: pos,
        }
    }

    fn submission(
        challenge_type: ChallengeType,
        participants: Vec<SubmittedParticipant>,
        winner_id: Option<PlayerId>,
    ) -> ChallengeSubmission {
        ChallengeSubmission {
            challenge_type,
            division: Division::Mixed,
            date: chrono::Utc.with_ymd_and_hms(2026, 4, 2, 17, 0, 0).unwrap(),
            notes: None,
            participants,
            winner_id,
        }
    }

    fn player(id: PlayerId, division: Division, status: PlayerStatus) -> Player {
        Player {
            id,
            name: format!("Player {id}"),
            division,
            status,
            tag: Some(id as u32),
            tag_version: 0,
        }
    }

    // ------------------------------------------------------------------
    // check_dense_order
    // ------------------------------------------------------------------

    #[test]
    fn dense_order_accepts_any_permutation() {
        assert!(check_dense_order(&[1, 2]).is_ok());
        assert!(check_dense_order(&[3, 1, 2]).is_ok());
        assert!(check_dense_order(&[2, 4, 1, 3]).is_ok());
    }

    #[test]
    fn dense_order_rejects_ties() {
        assert_eq!(
            check_dense_order(&[1, 1, 2]),
            Err(OrderingError::DuplicatePosition { position: 1 })
        );
    }

    #[test]
    fn dense_order_rejects_gaps_and_zero() {
        assert_eq!(
            check_dense_order(&[1, 3]),
            Err(OrderingError::NotContiguous {
                position: 3,
                participants: 2
            })
        );
        assert!(matches!(
            check_dense_order(&[0, 1]),
            Err(OrderingError::NotContiguous { position: 0, .. })
        ));
    }

    // ------------------------------------------------------------------
    // Direct challenges
    // ------------------------------------------------------------------

    #[test]
    fn direct_winner_goes_first() {
        let sub = submission(
            ChallengeType::Direct,
            vec![at(10, None), at(20, None)],
            Some(20),
        );
        let v = validate_submission(&sub).unwrap();
        assert_eq!(v.player_ids(), vec![20, 10]);
        assert_eq!(v.winner(), Some(20));
        assert_eq!(v.finish_order[1].finish_position, 2);
    }

    #[test]
    fn direct_same_player_twice_is_rejected() {
        let sub = submission(ChallengeType::Direct, vec![at(5, None), at(5, None)], Some(5));
        assert_eq!(
            validate_submission(&sub),
            Err(SubmissionError::Validation(
                ValidationError::DuplicatePlayer { player_id: 5 }
            ))
        );
    }

    #[test]
    fn direct_requires_winner() {
        let sub = submission(ChallengeType::Direct, vec![at(1, None), at(2, None)], None);
        assert_eq!(
            validate_submission(&sub),
            Err(ValidationError::MissingWinner.into())
        );
    }

    #[test]
    fn direct_winner_must_be_a_participant() {
        let sub = submission(ChallengeType::Direct, vec![at(1, None), at(2, None)], Some(3));
        assert_eq!(
            validate_submission(&sub),
            Err(ValidationError::WinnerNotParticipant { winner_id: 3 }.into())
        );
    }

    #[test]
    fn direct_needs_exactly_two() {
        let sub = submission(
            ChallengeType::Direct,
            vec![at(1, None), at(2, None), at(3, None)],
            Some(1),
        );
        assert!(matches!(
            validate_submission(&sub),
            Err(SubmissionError::Validation(
                ValidationError::ParticipantCount { actual: 3, .. }
            ))
        ));
    }

    #[test]
    fn direct_positions_must_match_winner() {
        let ok = submission(
            ChallengeType::Direct,
            vec![at(1, Some(2)), at(2, Some(1))],
            Some(2),
        );
        assert!(validate_submission(&ok).is_ok());

        let bad = submission(
            ChallengeType::Direct,
            vec![at(1, Some(1)), at(2, Some(2))],
            Some(2),
        );
        assert_eq!(
            validate_submission(&bad),
            Err(ValidationError::WinnerPositionMismatch { winner_id: 2 }.into())
        );
    }

    // ------------------------------------------------------------------
    // Group challenges
    // ------------------------------------------------------------------

    #[test]
    fn group_sorted_by_finish_position() {
        let sub = submission(
            ChallengeType::Group,
            vec![at(7, Some(3)), at(8, Some(1)), at(9, Some(2))],
            None,
        );
        let v = validate_submission(&sub).unwrap();
        assert_eq!(v.player_ids(), vec![8, 9, 7]);
    }

    #[test]
    fn group_tied_positions_is_ordering_error() {
        let sub = submission(
            ChallengeType::Group,
            vec![at(1, Some(1)), at(2, Some(1)), at(3, Some(2))],
            None,
        );
        assert_eq!(
            validate_submission(&sub),
            Err(OrderingError::DuplicatePosition { position: 1 }.into())
        );
    }

    #[test]
    fn group_missing_position_is_ordering_error() {
        let sub = submission(ChallengeType::Group, vec![at(1, Some(1)), at(2, None)], None);
        assert_eq!(
            validate_submission(&sub),
            Err(OrderingError::MissingPosition { player_id: 2 }.into())
        );
    }

    #[test]
    fn group_needs_two_participants() {
        let sub = submission(ChallengeType::Group, vec![at(1, Some(1))], None);
        assert!(matches!(
            validate_submission(&sub),
            Err(SubmissionError::Validation(
                ValidationError::ParticipantCount { actual: 1, .. }
            ))
        ));
    }

    #[test]
    fn group_duplicate_player_is_validation_error() {
        let sub = submission(
            ChallengeType::Group,
            vec![at(1, Some(1)), at(2, Some(2)), at(1, Some(3))],
            None,
        );
        assert_eq!(
            validate_submission(&sub),
            Err(ValidationError::DuplicatePlayer { player_id: 1 }.into())
        );
    }

    #[test]
    fn group_ignores_winner_id() {
        let sub = submission(
            ChallengeType::Group,
            vec![at(1, Some(2)), at(2, Some(1))],
            Some(1),
        );
        let v = validate_submission(&sub).unwrap();
        assert_eq!(v.winner(), Some(2));
    }

    #[test]
    fn blank_notes_are_dropped() {
        let mut sub = submission(ChallengeType::Direct, vec![at(1, None), at(2, None)], Some(1));
        sub.notes = Some("   ".into());
        assert!(validate_submission(&sub).unwrap().notes.is_none());

        sub.notes = Some("  Hole 7 playoff ".into());
        assert_eq!(
            validate_submission(&sub).unwrap().notes.as_deref(),
            Some("Hole 7 playoff")
        );
    }

    // ------------------------------------------------------------------
    // Registry checks
    // ------------------------------------------------------------------

    fn registry(players: Vec<Player>) -> HashMap<PlayerId, Player> {
        players.into_iter().map(|p| (p.id, p)).collect()
    }

    fn direct_1_beats_2() -> ValidatedChallenge {
        let sub = submission(ChallengeType::Direct, vec![at(1, None), at(2, None)], Some(1));
        validate_submission(&sub).unwrap()
    }

    #[test]
    fn registry_accepts_active_same_division() {
        let reg = registry(vec![
            player(1, Division::Mixed, PlayerStatus::Active),
            player(2, Division::Mixed, PlayerStatus::Active),
        ]);
        assert!(check_registry(&direct_1_beats_2(), &reg).is_ok());
    }

    #[test]
    fn registry_rejects_unknown_player() {
        let reg = registry(vec![player(1, Division::Mixed, PlayerStatus::Active)]);
        assert_eq!(
            check_registry(&direct_1_beats_2(), &reg),
            Err(ValidationError::UnknownPlayer { player_id: 2 })
        );
    }

    #[test]
    fn registry_rejects_inactive_player() {
        let reg = registry(vec![
            player(1, Division::Mixed, PlayerStatus::Active),
            player(2, Division::Mixed, PlayerStatus::Inactive),
        ]);
        assert!(matches!(
            check_registry(&direct_1_beats_2(), &reg),
            Err(ValidationError::InactivePlayer { player_id: 2, .. })
        ));
    }

    #[test]
    fn registry_rejects_other_division() {
        let reg = registry(vec![
            player(1, Division::Senior, PlayerStatus::Active),
            player(2, Division::Mixed, PlayerStatus::Active),
        ]);
        assert!(matches!(
            check_registry(&direct_1_beats_2(), &reg),
            Err(ValidationError::DivisionMismatch {
                player_id: 1,
                actual: Division::Senior,
                ..
            })
        ));
    }
}
