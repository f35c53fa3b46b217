// Integration tests for the tag ladder.
//
// These tests drive the library's public API end to end: a roster is
// imported, challenge JSON is parsed and submitted through the submission
// service, and the registry, recorded challenges, and history ledger are
// read back from the database.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};

use tagladder_core::challenge::{ChallengeFilter, ChallengeSubmission, ChallengeType};
use tagladder_core::db::{Database, PersistenceError};
use tagladder_core::ledger::Movement;
use tagladder_core::player::{Division, PlayerId, Tag};
use tagladder_core::reconcile::{ReconcileError, UntaggedPolicy};
use tagladder_core::roster;
use tagladder_core::service::{SubmitError, Submitter};
use tagladder_core::validate::{OrderingError, ValidationError};

// ===========================================================================
// Test helpers
// ===========================================================================

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Fresh in-memory database loaded with the fixture roster.
fn club() -> (Database, HashMap<String, PlayerId>) {
    let db = Database::open(":memory:").expect("in-memory database should open");
    let players = roster::load_roster(&fixture("roster.csv")).unwrap();
    db.import_players(&players).unwrap();
    let ids = db
        .list_players()
        .unwrap()
        .into_iter()
        .map(|p| (p.name, p.id))
        .collect();
    (db, ids)
}

fn tag_of(db: &Database, id: PlayerId) -> Option<Tag> {
    db.get_player(id).unwrap().unwrap().tag
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 18, hour, 0, 0).unwrap()
}

fn direct_json(winner: PlayerId, loser: PlayerId) -> String {
    format!(
        r#"{{
            "challenge_type": "Direct",
            "division": "Mixed",
            "date": "2026-04-18T09:00:00Z",
            "participants": [{{"player_id": {loser}}}, {{"player_id": {winner}}}],
            "winner_id": {winner}
        }}"#
    )
}

fn group_json(order: &[(PlayerId, u32)]) -> String {
    let participants: Vec<String> = order
        .iter()
        .map(|(id, pos)| format!(r#"{{"player_id": {id}, "finish_position": {pos}}}"#))
        .collect();
    format!(
        r#"{{
            "challenge_type": "Group",
            "division": "Mixed",
            "date": "2026-04-18T09:00:00Z",
            "participants": [{}]
        }}"#,
        participants.join(", ")
    )
}

fn submit(db: &Database, json: &str, hour: u32) -> Result<i64, SubmitError> {
    let submission = ChallengeSubmission::from_json(json).expect("fixture JSON should parse");
    Submitter::new(db, UntaggedPolicy::Reject, 3)
        .submit(&submission, at(hour))
        .map(|o| o.challenge_id)
}

/// Active tags, sorted, as a conservation check across the whole club.
fn active_tags(db: &Database) -> Vec<Tag> {
    let mut tags: Vec<Tag> = db
        .leaderboard(None)
        .unwrap()
        .into_iter()
        .filter_map(|p| p.tag)
        .collect();
    tags.sort_unstable();
    tags
}

// ===========================================================================
// Direct challenges
// ===========================================================================

#[test]
fn direct_win_by_lower_tag_is_recorded_without_changes() {
    let (db, ids) = club();
    let (ada, bo) = (ids["Ada Park"], ids["Bo Lin"]);

    submit(&db, &direct_json(ada, bo), 10).unwrap();

    assert_eq!(tag_of(&db, ada), Some(2));
    assert_eq!(tag_of(&db, bo), Some(5));
    assert_eq!(db.challenges(ChallengeFilter::All).unwrap().len(), 1);
    assert!(db.recent_history(50).unwrap().is_empty());
}

#[test]
fn direct_upset_swaps_tags_and_logs_both_moves() {
    let (db, ids) = club();
    let (dee, eli) = (ids["Dee Ruiz"], ids["Eli Stone"]);
    let before = active_tags(&db);

    let challenge_id = submit(&db, &direct_json(eli, dee), 10).unwrap();

    assert_eq!(tag_of(&db, eli), Some(3));
    assert_eq!(tag_of(&db, dee), Some(7));
    assert_eq!(active_tags(&db), before);

    let history = db.recent_history(50).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|h| h.challenge_id == challenge_id));
    let eli_row = history.iter().find(|h| h.player_id == eli).unwrap();
    assert_eq!((eli_row.old_tag, eli_row.new_tag), (7, 3));
    assert_eq!(eli_row.movement(), Movement::Improved(4));
    assert_eq!(eli_row.changed_at, at(10));
}

#[test]
fn rematch_reverses_the_swap() {
    let (db, ids) = club();
    let (dee, eli) = (ids["Dee Ruiz"], ids["Eli Stone"]);

    submit(&db, &direct_json(eli, dee), 10).unwrap();
    submit(&db, &direct_json(dee, eli), 11).unwrap();

    assert_eq!(tag_of(&db, dee), Some(3));
    assert_eq!(tag_of(&db, eli), Some(7));

    let dee_history = db.history_for_player(dee, 10).unwrap();
    assert_eq!(dee_history.len(), 2);
    // Newest first.
    assert_eq!((dee_history[0].old_tag, dee_history[0].new_tag), (7, 3));
    assert_eq!((dee_history[1].old_tag, dee_history[1].new_tag), (3, 7));
}

#[test]
fn direct_against_self_is_rejected_before_anything_is_written() {
    let (db, ids) = club();
    let ada = ids["Ada Park"];

    let err = submit(&db, &direct_json(ada, ada), 10).unwrap_err();

    assert!(matches!(
        err,
        SubmitError::Validation(ValidationError::DuplicatePlayer { player_id }) if player_id == ada
    ));
    assert!(db.challenges(ChallengeFilter::All).unwrap().is_empty());
}

// ===========================================================================
// Group challenges
// ===========================================================================

#[test]
fn group_fixture_reshuffles_tags_by_finish() {
    let (db, ids) = club();
    let json = std::fs::read_to_string(fixture("group_challenge.json")).unwrap();
    let submission = ChallengeSubmission::from_json(&json).unwrap();
    let (ada, bo, cy) = (ids["Ada Park"], ids["Bo Lin"], ids["Cy Ortiz"]);
    // The fixture refers to the first three roster rows by id.
    assert_eq!((ada, bo, cy), (1, 2, 3));

    let outcome = Submitter::new(&db, UntaggedPolicy::Reject, 3)
        .submit(&submission, at(16))
        .unwrap();

    assert_eq!(tag_of(&db, bo), Some(2));
    assert_eq!(tag_of(&db, ada), Some(5));
    assert_eq!(tag_of(&db, cy), Some(10));
    assert_eq!(outcome.reconciliation.changes.len(), 2);

    let records = db.challenges(ChallengeFilter::Type(ChallengeType::Group)).unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.notes.as_deref(), Some("Saturday doubles round"));
    let order: Vec<PlayerId> = record.participants.iter().map(|p| p.player_id).collect();
    assert_eq!(order, vec![bo, ada, cy]);
    assert_eq!(record.winner().map(|w| w.player_id), Some(bo));
    assert_eq!(record.participants[2].tag_before, record.participants[2].tag_after);
}

#[test]
fn group_with_tied_positions_is_an_ordering_error() {
    let (db, ids) = club();
    let json = group_json(&[
        (ids["Ada Park"], 1),
        (ids["Bo Lin"], 1),
        (ids["Cy Ortiz"], 2),
    ]);

    let err = submit(&db, &json, 10).unwrap_err();

    assert!(matches!(
        err,
        SubmitError::Ordering(OrderingError::DuplicatePosition { position: 1 })
    ));
    assert_eq!(tag_of(&db, ids["Ada Park"]), Some(2));
    assert!(db.challenges(ChallengeFilter::All).unwrap().is_empty());
}

#[test]
fn five_player_group_conserves_the_pool() {
    let (db, ids) = club();
    let names = ["Ada Park", "Bo Lin", "Cy Ortiz", "Dee Ruiz", "Eli Stone"];
    let before = active_tags(&db);

    // Reverse of tag order: the #10 holder wins, the #2 holder is last.
    let json = group_json(&[
        (ids["Cy Ortiz"], 1),
        (ids["Eli Stone"], 2),
        (ids["Bo Lin"], 3),
        (ids["Dee Ruiz"], 4),
        (ids["Ada Park"], 5),
    ]);
    submit(&db, &json, 10).unwrap();

    let after: Vec<Option<Tag>> = names.iter().map(|n| tag_of(&db, ids[*n])).collect();
    // Pool [2, 3, 5, 7, 10] in finish order; Bo finishes third and keeps #5.
    assert_eq!(after, vec![Some(10), Some(5), Some(2), Some(7), Some(3)]);
    assert_eq!(active_tags(&db), before);
    assert_eq!(db.recent_history(50).unwrap().len(), 4);
}

// ===========================================================================
// Registry checks and policies
// ===========================================================================

#[test]
fn inactive_and_cross_division_players_are_refused() {
    let (db, ids) = club();

    let err = submit(&db, &direct_json(ids["Hal Weber"], ids["Ada Park"]), 10).unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Validation(ValidationError::InactivePlayer { .. })
    ));

    let err = submit(&db, &direct_json(ids["Gus Moore"], ids["Ada Park"]), 10).unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Validation(ValidationError::DivisionMismatch {
            expected: Division::Mixed,
            actual: Division::Junior,
            ..
        })
    ));

    let err = submit(&db, &direct_json(9_999, ids["Ada Park"]), 10).unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Validation(ValidationError::UnknownPlayer { player_id: 9_999 })
    ));
}

#[test]
fn untagged_player_is_rejected_or_excluded_per_policy() {
    let (db, ids) = club();
    let (fay, ada, bo) = (ids["Fay Quinn"], ids["Ada Park"], ids["Bo Lin"]);
    let json = group_json(&[(fay, 1), (bo, 2), (ada, 3)]);
    let submission = ChallengeSubmission::from_json(&json).unwrap();

    let err = Submitter::new(&db, UntaggedPolicy::Reject, 3)
        .submit(&submission, at(10))
        .unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Reconcile(ReconcileError::UntaggedParticipant { player_id }) if player_id == fay
    ));

    Submitter::new(&db, UntaggedPolicy::Exclude, 3)
        .submit(&submission, at(10))
        .unwrap();
    assert_eq!(tag_of(&db, fay), None);
    assert_eq!(tag_of(&db, bo), Some(2));
    assert_eq!(tag_of(&db, ada), Some(5));
}

#[test]
fn registry_tag_collision_reports_taken_tag() {
    let (db, ids) = club();
    let bo = db.get_player(ids["Bo Lin"]).unwrap().unwrap();

    let err = db
        .update_player(
            bo.id,
            &tagladder_core::player::NewPlayer {
                name: bo.name,
                division: bo.division,
                status: bo.status,
                tag: Some(2),
            },
        )
        .unwrap_err();

    assert!(matches!(err, PersistenceError::TagTaken { tag: 2 }));
    assert_eq!(err.to_string(), "tag #2 is already taken");
}

#[test]
fn leaderboard_orders_by_tag_with_unranked_last() {
    let (db, _) = club();
    let board = db.leaderboard(Some(Division::Mixed)).unwrap();
    let names: Vec<&str> = board.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Ada Park", "Dee Ruiz", "Bo Lin", "Eli Stone", "Cy Ortiz", "Fay Quinn"]
    );
}
