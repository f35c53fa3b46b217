// Challenge submission: resolve the registry, validate, reconcile, persist.
//
// The reconciliation is pure, so a write conflict is handled by throwing the
// attempt away and recomputing from a fresh registry read. A partially
// applied write is never resumed; the gateway either commits everything or
// nothing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::challenge::{ChallengeId, ChallengeSubmission, ValidatedChallenge};
use crate::config::Config;
use crate::db::{Database, PersistenceError};
use crate::player::{Player, PlayerId};
use crate::reconcile::{reconcile, ReconcileError, Reconciliation, Standing, UntaggedPolicy};
use crate::validate::{
    check_registry, validate_submission, OrderingError, SubmissionError, ValidationError,
};

// ---------------------------------------------------------------------------
// Store seam
// ---------------------------------------------------------------------------

/// The reads and the atomic write a submission needs from storage.
pub trait LadderStore {
    /// Current registry rows for `ids`; unknown ids are absent.
    fn snapshot(&self, ids: &[PlayerId]) -> anyhow::Result<HashMap<PlayerId, Player>>;

    /// Persist a reconciled challenge atomically, failing with
    /// `PersistenceError::Conflict` if `snapshot` is stale.
    fn record(
        &self,
        challenge: &ValidatedChallenge,
        reconciliation: &Reconciliation,
        snapshot: &HashMap<PlayerId, Player>,
        recorded_at: DateTime<Utc>,
    ) -> Result<ChallengeId, PersistenceError>;
}

impl LadderStore for Database {
    fn snapshot(&self, ids: &[PlayerId]) -> anyhow::Result<HashMap<PlayerId, Player>> {
        self.players_by_ids(ids)
    }

    fn record(
        &self,
        challenge: &ValidatedChallenge,
        reconciliation: &Reconciliation,
        snapshot: &HashMap<PlayerId, Player>,
        recorded_at: DateTime<Utc>,
    ) -> Result<ChallengeId, PersistenceError> {
        self.record_challenge(challenge, reconciliation, snapshot, recorded_at)
    }
}

// ---------------------------------------------------------------------------
// Errors and results
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid challenge: {0}")]
    Validation(#[from] ValidationError),

    #[error("invalid finish order: {0}")]
    Ordering(#[from] OrderingError),

    #[error("cannot reconcile tags: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("failed to save challenge: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("failed to read player registry: {0:#}")]
    Registry(anyhow::Error),
}

impl From<SubmissionError> for SubmitError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::Validation(e) => SubmitError::Validation(e),
            SubmissionError::Ordering(e) => SubmitError::Ordering(e),
        }
    }
}

/// A computed but not yet persisted challenge result.
#[derive(Debug, Clone)]
pub struct Preview {
    pub challenge: ValidatedChallenge,
    pub reconciliation: Reconciliation,
    pub snapshot: HashMap<PlayerId, Player>,
}

/// A recorded challenge.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub challenge_id: ChallengeId,
    pub challenge: ValidatedChallenge,
    pub reconciliation: Reconciliation,
    /// 1 when the first attempt committed.
    pub attempts: u32,
}

// ---------------------------------------------------------------------------
// Submitter
// ---------------------------------------------------------------------------

pub struct Submitter<'a, S: LadderStore> {
    store: &'a S,
    policy: UntaggedPolicy,
    max_conflict_retries: u32,
}

impl<'a, S: LadderStore> Submitter<'a, S> {
    pub fn new(store: &'a S, policy: UntaggedPolicy, max_conflict_retries: u32) -> Self {
        Self {
            store,
            policy,
            max_conflict_retries,
        }
    }

    pub fn from_config(store: &'a S, config: &Config) -> Self {
        Self::new(
            store,
            config.reconcile.untagged_policy,
            config.submission.max_conflict_retries,
        )
    }

    /// Validate and reconcile without writing anything.
    pub fn preview(&self, submission: &ChallengeSubmission) -> Result<Preview, SubmitError> {
        let challenge = validate_submission(submission)?;
        self.compute(challenge)
    }

    fn compute(&self, challenge: ValidatedChallenge) -> Result<Preview, SubmitError> {
        let snapshot = self
            .store
            .snapshot(&challenge.player_ids())
            .map_err(SubmitError::Registry)?;
        check_registry(&challenge, &snapshot)?;

        let standings: Vec<Standing> = challenge
            .finish_order
            .iter()
            .map(|p| Standing {
                player_id: p.player_id,
                finish_position: p.finish_position,
                tag: snapshot.get(&p.player_id).and_then(|pl| pl.tag),
            })
            .collect();
        let reconciliation = reconcile(&standings, self.policy)?;

        Ok(Preview {
            challenge,
            reconciliation,
            snapshot,
        })
    }

    /// Validate, reconcile, and persist a challenge.
    ///
    /// On a write conflict the whole computation is redone from a fresh
    /// registry read, up to `max_conflict_retries` times. The final conflict
    /// is returned as-is if every attempt loses the race.
    pub fn submit(
        &self,
        submission: &ChallengeSubmission,
        recorded_at: DateTime<Utc>,
    ) -> Result<SubmitOutcome, SubmitError> {
        let validated = validate_submission(submission)?;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let preview = self.compute(validated.clone())?;

            match self.store.record(
                &preview.challenge,
                &preview.reconciliation,
                &preview.snapshot,
                recorded_at,
            ) {
                Ok(challenge_id) => {
                    info!(
                        "Recorded {} challenge {challenge_id} ({} participants, {} tag changes)",
                        preview.challenge.challenge_type,
                        preview.reconciliation.participants.len(),
                        preview.reconciliation.changes.len()
                    );
                    return Ok(SubmitOutcome {
                        challenge_id,
                        challenge: preview.challenge,
                        reconciliation: preview.reconciliation,
                        attempts,
                    });
                }
                Err(PersistenceError::Conflict { player_id }) if attempts <= self.max_conflict_retries => {
                    warn!(
                        "Player {player_id} changed during submission; recomputing (attempt {attempts})"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
