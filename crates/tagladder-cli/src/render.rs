// Plain-text rendering of ladder data for the terminal.

use std::collections::HashMap;

use tagladder_core::challenge::ChallengeRecord;
use tagladder_core::ledger::HistoryView;
use tagladder_core::player::{format_tag, Player, PlayerId};
use tagladder_core::reconcile::Reconciliation;

/// Leaderboard rows: tag, name, division. Untagged players come last.
pub fn leaderboard(players: &[Player]) -> String {
    if players.is_empty() {
        return "No active players.\n".to_string();
    }
    let width = players.iter().map(|p| p.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for p in players {
        out.push_str(&format!(
            "{:>5}  {:<width$}  {}\n",
            format_tag(p.tag),
            p.name,
            p.division
        ));
    }
    out
}

/// Participants in finish order with their before and after tags.
pub fn reconciliation(result: &Reconciliation, names: &HashMap<PlayerId, Player>) -> String {
    let mut out = String::new();
    for p in &result.participants {
        let name = names
            .get(&p.player_id)
            .map(|pl| pl.name.as_str())
            .unwrap_or("?");
        let marker = if p.changed() { "*" } else { " " };
        out.push_str(&format!(
            "{marker} {}. {name}  {} -> {}\n",
            p.finish_position,
            format_tag(p.tag_before),
            format_tag(p.tag_after)
        ));
    }
    if result.is_noop() {
        out.push_str("No tag changes.\n");
    } else {
        out.push_str(&format!("{} tag change(s).\n", result.changes.len()));
    }
    out
}

pub fn challenges(records: &[ChallengeRecord]) -> String {
    if records.is_empty() {
        return "No challenges recorded.\n".to_string();
    }
    let mut out = String::new();
    for r in records {
        out.push_str(&format!(
            "#{} {} {} {}",
            r.id,
            r.date.format("%Y-%m-%d %H:%M"),
            r.challenge_type,
            r.division
        ));
        if let Some(notes) = &r.notes {
            out.push_str(&format!(" ({notes})"));
        }
        out.push('\n');
        for p in &r.participants {
            out.push_str(&format!(
                "    {}. {}  {} -> {}\n",
                p.finish_position,
                p.player_name,
                format_tag(p.tag_before),
                format_tag(p.tag_after)
            ));
        }
    }
    out
}

pub fn history(entries: &[HistoryView]) -> String {
    if entries.is_empty() {
        return "No tag changes recorded.\n".to_string();
    }
    let mut out = String::new();
    for e in entries {
        out.push_str(&format!(
            "{}  {}  #{} -> #{} ({})  {} #{}\n",
            e.changed_at.format("%Y-%m-%d %H:%M"),
            e.player_name,
            e.old_tag,
            e.new_tag,
            e.movement().label(),
            e.challenge_type,
            e.challenge_id
        ));
    }
    out
}
