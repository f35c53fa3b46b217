// SQLite persistence layer: player registry, recorded challenges, and the
// tag history ledger.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use thiserror::Error;
use tracing::{debug, info};

use crate::challenge::{
    ChallengeFilter, ChallengeId, ChallengeRecord, ChallengeType, ParticipantRecord,
    ValidatedChallenge,
};
use crate::ledger::{self, HistoryView};
use crate::player::{Division, NewPlayer, Player, PlayerId, PlayerStatus, Tag};
use crate::reconcile::Reconciliation;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures while writing to the registry or recording a challenge.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A participant's row changed after it was read. Nothing was written;
    /// the caller should re-read, recompute, and resubmit.
    #[error("player {player_id} changed since it was read; recompute and resubmit")]
    Conflict { player_id: PlayerId },

    #[error("player {player_id} not found")]
    UnknownPlayer { player_id: PlayerId },

    #[error("tag #{tag} is already taken")]
    TagTaken { tag: Tag },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Map a unique-index violation on `bag_tag` to `TagTaken`.
fn tag_write_error(err: rusqlite::Error, tag: Option<Tag>) -> PersistenceError {
    match tag {
        Some(tag) if is_unique_violation(&err) => PersistenceError::TagTaken { tag },
        _ => PersistenceError::Sqlite(err),
    }
}

// ---------------------------------------------------------------------------
// Column helpers
// ---------------------------------------------------------------------------

/// Timestamps are stored as fixed-width UTC strings so that text ordering
/// matches chronological ordering.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("bad timestamp {text:?}: {e}")))
}

fn division_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Division> {
    let text: String = row.get(idx)?;
    Division::from_str_div(&text).ok_or_else(|| conversion_error(idx, format!("bad division {text:?}")))
}

fn status_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<PlayerStatus> {
    let text: String = row.get(idx)?;
    PlayerStatus::from_str_status(&text)
        .ok_or_else(|| conversion_error(idx, format!("bad status {text:?}")))
}

fn challenge_type_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<ChallengeType> {
    let text: String = row.get(idx)?;
    ChallengeType::from_str_type(&text)
        .ok_or_else(|| conversion_error(idx, format!("bad challenge type {text:?}")))
}

const PLAYER_COLUMNS: &str = "id, name, division, status, bag_tag, tag_version";

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<Player> {
    Ok(Player {
        id: row.get(0)?,
        name: row.get(1)?,
        division: division_column(row, 2)?,
        status: status_column(row, 3)?,
        tag: row.get(4)?,
        tag_version: row.get(5)?,
    })
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// SQLite-backed store for the player registry, challenges, and tag history.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS players (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                division    TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'Active',
                bag_tag     INTEGER CHECK (bag_tag IS NULL OR bag_tag > 0),
                tag_version INTEGER NOT NULL DEFAULT 0
            );

            -- Tags are unique among active players only.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_players_active_tag
                ON players(bag_tag)
                WHERE status = 'Active' AND bag_tag IS NOT NULL;

            CREATE TABLE IF NOT EXISTS challenges (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                challenge_type TEXT NOT NULL,
                division       TEXT NOT NULL,
                challenge_date TEXT NOT NULL,
                notes          TEXT,
                recorded_at    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS challenge_participants (
                challenge_id    INTEGER NOT NULL REFERENCES challenges(id),
                player_id       INTEGER NOT NULL REFERENCES players(id),
                finish_position INTEGER NOT NULL CHECK (finish_position > 0),
                tag_before      INTEGER,
                tag_after       INTEGER,
                PRIMARY KEY (challenge_id, player_id),
                UNIQUE (challenge_id, finish_position)
            );

            CREATE TABLE IF NOT EXISTS tag_history (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                player_id    INTEGER NOT NULL REFERENCES players(id),
                old_tag      INTEGER NOT NULL,
                new_tag      INTEGER NOT NULL,
                changed_at   TEXT NOT NULL,
                challenge_id INTEGER NOT NULL REFERENCES challenges(id),
                CHECK (old_tag <> new_tag)
            );

            CREATE INDEX IF NOT EXISTS idx_tag_history_changed_at
                ON tag_history(changed_at);

            CREATE TRIGGER IF NOT EXISTS tag_history_no_update
                BEFORE UPDATE ON tag_history
                BEGIN SELECT RAISE(ABORT, 'tag_history is append-only'); END;

            CREATE TRIGGER IF NOT EXISTS tag_history_no_delete
                BEFORE DELETE ON tag_history
                BEGIN SELECT RAISE(ABORT, 'tag_history is append-only'); END;
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Player registry
    // ------------------------------------------------------------------

    /// Insert a new player and return its id.
    pub fn add_player(&self, player: &NewPlayer) -> Result<PlayerId, PersistenceError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO players (name, division, status, bag_tag) VALUES (?1, ?2, ?3, ?4)",
            params![
                player.name.trim(),
                player.division.as_str(),
                player.status.as_str(),
                player.tag,
            ],
        )
        .map_err(|e| tag_write_error(e, player.tag))?;
        let id = conn.last_insert_rowid();
        info!("Added player {id} ({})", player.name.trim());
        Ok(id)
    }

    /// Overwrite a player's registry fields. A tag edit bumps the player's
    /// tag version so that in-flight challenge submissions see the change.
    pub fn update_player(&self, id: PlayerId, player: &NewPlayer) -> Result<(), PersistenceError> {
        let conn = self.conn();
        // SET expressions see the old row, so the version test compares the
        // stored tag with the incoming one.
        let updated = conn
            .execute(
                "UPDATE players SET
                    name        = ?1,
                    division    = ?2,
                    status      = ?3,
                    tag_version = tag_version + (bag_tag IS NOT ?4),
                    bag_tag     = ?4
                 WHERE id = ?5",
                params![
                    player.name.trim(),
                    player.division.as_str(),
                    player.status.as_str(),
                    player.tag,
                    id,
                ],
            )
            .map_err(|e| tag_write_error(e, player.tag))?;
        if updated == 0 {
            return Err(PersistenceError::UnknownPlayer { player_id: id });
        }
        Ok(())
    }

    /// Mark a player inactive. Their tag is kept but no longer counts toward
    /// the active-tag uniqueness constraint.
    pub fn deactivate_player(&self, id: PlayerId) -> Result<(), PersistenceError> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE players SET status = 'Inactive' WHERE id = ?1",
            params![id],
        )?;
        if updated == 0 {
            return Err(PersistenceError::UnknownPlayer { player_id: id });
        }
        Ok(())
    }

    /// Import players in a single transaction. Either every row lands or none.
    pub fn import_players(&self, players: &[NewPlayer]) -> Result<usize, PersistenceError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO players (name, division, status, bag_tag) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for player in players {
                stmt.execute(params![
                    player.name.trim(),
                    player.division.as_str(),
                    player.status.as_str(),
                    player.tag,
                ])
                .map_err(|e| tag_write_error(e, player.tag))?;
            }
        }
        tx.commit()?;
        info!("Imported {} players", players.len());
        Ok(players.len())
    }

    pub fn get_player(&self, id: PlayerId) -> Result<Option<Player>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!("SELECT {PLAYER_COLUMNS} FROM players WHERE id = ?1"))
            .context("failed to prepare get_player query")?;
        let mut rows = stmt
            .query_map(params![id], player_from_row)
            .context("failed to query player")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("failed to read player row")?)),
            None => Ok(None),
        }
    }

    /// Read the registry rows for `ids`. Ids with no row are simply absent
    /// from the returned map.
    pub fn players_by_ids(&self, ids: &[PlayerId]) -> Result<HashMap<PlayerId, Player>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!("SELECT {PLAYER_COLUMNS} FROM players WHERE id = ?1"))
            .context("failed to prepare players_by_ids query")?;
        let mut players = HashMap::with_capacity(ids.len());
        for &id in ids {
            let mut rows = stmt
                .query_map(params![id], player_from_row)
                .context("failed to query player")?;
            if let Some(row) = rows.next() {
                let player = row.context("failed to read player row")?;
                players.insert(player.id, player);
            }
        }
        Ok(players)
    }

    /// All players, ranked by tag with unranked players last.
    pub fn list_players(&self) -> Result<Vec<Player>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PLAYER_COLUMNS} FROM players
                 ORDER BY bag_tag IS NULL, bag_tag, name"
            ))
            .context("failed to prepare list_players query")?;
        let players = stmt
            .query_map([], player_from_row)
            .context("failed to query players")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map player rows")?;
        Ok(players)
    }

    /// Active players ranked by tag, optionally limited to one division.
    pub fn leaderboard(&self, division: Option<Division>) -> Result<Vec<Player>> {
        let players = self
            .list_players()?
            .into_iter()
            .filter(|p| p.is_active())
            .filter(|p| division.map_or(true, |d| p.division == d))
            .collect();
        Ok(players)
    }

    // ------------------------------------------------------------------
    // Challenge recording (the atomic gateway)
    // ------------------------------------------------------------------

    /// Record a reconciled challenge in one transaction: the challenge row,
    /// every participant row, the tag updates, and the history entries.
    ///
    /// `snapshot` must be the registry rows the reconciliation was computed
    /// from. Every participant's `tag_version`, tag, status, and division are
    /// compared against the stored row inside the write transaction, and the
    /// stored row must still be Active in the challenge's division. Any
    /// mismatch aborts with `PersistenceError::Conflict` and nothing is
    /// written.
    pub fn record_challenge(
        &self,
        challenge: &ValidatedChallenge,
        reconciliation: &Reconciliation,
        snapshot: &HashMap<PlayerId, Player>,
        recorded_at: DateTime<Utc>,
    ) -> Result<ChallengeId, PersistenceError> {
        let mut conn = self.conn();
        // IMMEDIATE takes the write lock up front so concurrent submissions
        // serialize here rather than failing at commit.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // 1. Registry check for every participant, changed or not: an
        //    unchanged participant's stale tag still shaped the pool, and a
        //    player deactivated or moved out of the division since the
        //    snapshot may no longer take part.
        for outcome in &reconciliation.participants {
            let player_id = outcome.player_id;
            let expected = snapshot
                .get(&player_id)
                .ok_or(PersistenceError::UnknownPlayer { player_id })?;
            let current = tx
                .query_row(
                    &format!("SELECT {PLAYER_COLUMNS} FROM players WHERE id = ?1"),
                    params![player_id],
                    player_from_row,
                )
                .optional()?
                .ok_or(PersistenceError::UnknownPlayer { player_id })?;
            let stale = current.tag_version != expected.tag_version
                || current.tag != outcome.tag_before
                || current.status != expected.status
                || current.division != expected.division
                || !current.is_active()
                || current.division != challenge.division;
            if stale {
                return Err(PersistenceError::Conflict { player_id });
            }
        }

        // 2. Tag writes in two phases. Clearing first keeps the active-tag
        //    unique index satisfied while tags are swapped.
        for change in &reconciliation.changes {
            let expected = snapshot
                .get(&change.player_id)
                .map(|p| p.tag_version)
                .ok_or(PersistenceError::UnknownPlayer {
                    player_id: change.player_id,
                })?;
            let cleared = tx.execute(
                "UPDATE players SET bag_tag = NULL WHERE id = ?1 AND tag_version = ?2",
                params![change.player_id, expected],
            )?;
            if cleared == 0 {
                return Err(PersistenceError::Conflict {
                    player_id: change.player_id,
                });
            }
        }
        for change in &reconciliation.changes {
            tx.execute(
                "UPDATE players SET bag_tag = ?1, tag_version = tag_version + 1 WHERE id = ?2",
                params![change.new_tag, change.player_id],
            )
            .map_err(|e| tag_write_error(e, Some(change.new_tag)))?;
        }

        // 3. Challenge and participant rows.
        tx.execute(
            "INSERT INTO challenges (challenge_type, division, challenge_date, notes, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                challenge.challenge_type.as_str(),
                challenge.division.as_str(),
                format_ts(&challenge.date),
                challenge.notes,
                format_ts(&recorded_at),
            ],
        )?;
        let challenge_id = tx.last_insert_rowid();

        for outcome in &reconciliation.participants {
            tx.execute(
                "INSERT INTO challenge_participants
                    (challenge_id, player_id, finish_position, tag_before, tag_after)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    challenge_id,
                    outcome.player_id,
                    outcome.finish_position,
                    outcome.tag_before,
                    outcome.tag_after,
                ],
            )?;
        }

        // 4. Ledger rows, one per changed tag.
        for entry in ledger::entries_for(&reconciliation.changes, challenge_id, recorded_at) {
            tx.execute(
                "INSERT INTO tag_history (player_id, old_tag, new_tag, changed_at, challenge_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.player_id,
                    entry.old_tag,
                    entry.new_tag,
                    format_ts(&entry.changed_at),
                    entry.challenge_id,
                ],
            )?;
        }

        tx.commit()?;
        debug!(
            "Committed challenge {challenge_id}: {} participants, {} tag changes",
            reconciliation.participants.len(),
            reconciliation.changes.len()
        );
        Ok(challenge_id)
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    /// Recorded challenges, newest first, with participants in finish order.
    pub fn challenges(&self, filter: ChallengeFilter) -> Result<Vec<ChallengeRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, challenge_type, division, challenge_date, notes
                 FROM challenges ORDER BY challenge_date DESC, id DESC",
            )
            .context("failed to prepare challenges query")?;
        let mut records = stmt
            .query_map([], |row| {
                Ok(ChallengeRecord {
                    id: row.get(0)?,
                    challenge_type: challenge_type_column(row, 1)?,
                    division: division_column(row, 2)?,
                    date: ts_column(row, 3)?,
                    notes: row.get(4)?,
                    participants: Vec::new(),
                })
            })
            .context("failed to query challenges")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map challenge rows")?;
        records.retain(|r| filter.matches(r));

        let mut parts_stmt = conn
            .prepare(
                "SELECT cp.player_id, p.name, cp.finish_position, cp.tag_before, cp.tag_after
                 FROM challenge_participants cp
                 JOIN players p ON p.id = cp.player_id
                 WHERE cp.challenge_id = ?1
                 ORDER BY cp.finish_position",
            )
            .context("failed to prepare participants query")?;
        for record in &mut records {
            record.participants = parts_stmt
                .query_map(params![record.id], |row| {
                    Ok(ParticipantRecord {
                        player_id: row.get(0)?,
                        player_name: row.get(1)?,
                        finish_position: row.get(2)?,
                        tag_before: row.get(3)?,
                        tag_after: row.get(4)?,
                    })
                })
                .context("failed to query participants")?
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed to map participant rows")?;
        }

        Ok(records)
    }

    /// The most recent tag changes, newest first. Rows sharing a timestamp
    /// come back in reverse insertion order.
    pub fn recent_history(&self, limit: usize) -> Result<Vec<HistoryView>> {
        self.query_history(None, limit)
    }

    /// Tag changes for one player, newest first.
    pub fn history_for_player(&self, player_id: PlayerId, limit: usize) -> Result<Vec<HistoryView>> {
        self.query_history(Some(player_id), limit)
    }

    fn query_history(&self, player_id: Option<PlayerId>, limit: usize) -> Result<Vec<HistoryView>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT h.id, h.player_id, p.name, p.division, h.old_tag, h.new_tag,
                        h.changed_at, h.challenge_id, c.challenge_type
                 FROM tag_history h
                 JOIN players p ON p.id = h.player_id
                 JOIN challenges c ON c.id = h.challenge_id
                 WHERE ?1 IS NULL OR h.player_id = ?1
                 ORDER BY h.changed_at DESC, h.id DESC
                 LIMIT ?2",
            )
            .context("failed to prepare history query")?;
        let rows = stmt
            .query_map(params![player_id, limit as i64], |row| {
                Ok(HistoryView {
                    id: row.get(0)?,
                    player_id: row.get(1)?,
                    player_name: row.get(2)?,
                    division: division_column(row, 3)?,
                    old_tag: row.get(4)?,
                    new_tag: row.get(5)?,
                    changed_at: ts_column(row, 6)?,
                    challenge_id: row.get(7)?,
                    challenge_type: challenge_type_column(row, 8)?,
                })
            })
            .context("failed to query tag history")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map tag history rows")?;
        Ok(rows)
    }
}
