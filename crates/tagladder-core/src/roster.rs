// Roster CSV import.
//
// Expected header: `name,division,status,tag`. `status` defaults to Active
// and an empty `tag` means the player is unranked.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::player::{Division, NewPlayer, PlayerStatus, Tag};

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("failed to read roster: {0}")]
    Csv(#[from] csv::Error),

    #[error("roster line {line}: {message}")]
    BadRow { line: u64, message: String },
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    name: String,
    division: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    tag: Option<Tag>,
}

/// Parse a roster from any reader.
pub fn parse_roster<R: Read>(reader: R) -> Result<Vec<NewPlayer>, RosterError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut players = Vec::new();
    // Active tag -> line it first appeared on.
    let mut active_tags: HashMap<Tag, u64> = HashMap::new();

    let headers = rdr.headers()?.clone();

    for result in rdr.records() {
        let record = result?;
        // Line the record starts on; quoted fields may span several lines.
        let line = record.position().map_or(0, |pos| pos.line());
        let row: RosterRow = record.deserialize(Some(&headers))?;

        if row.name.is_empty() {
            return Err(RosterError::BadRow {
                line,
                message: "player name is required".into(),
            });
        }
        let division = Division::from_str_div(&row.division).ok_or_else(|| RosterError::BadRow {
            line,
            message: format!("unknown division {:?}", row.division),
        })?;
        let status = match row.status.as_deref().filter(|s| !s.is_empty()) {
            None => PlayerStatus::Active,
            Some(s) => PlayerStatus::from_str_status(s).ok_or_else(|| RosterError::BadRow {
                line,
                message: format!("unknown status {s:?}"),
            })?,
        };
        if row.tag == Some(0) {
            return Err(RosterError::BadRow {
                line,
                message: "tags start at 1".into(),
            });
        }
        if let (Some(tag), PlayerStatus::Active) = (row.tag, status) {
            if let Some(first) = active_tags.insert(tag, line) {
                return Err(RosterError::BadRow {
                    line,
                    message: format!("tag #{tag} already assigned on line {first}"),
                });
            }
        }

        players.push(NewPlayer {
            name: row.name,
            division,
            status,
            tag: row.tag,
        });
    }

    Ok(players)
}

/// Parse a roster CSV file from disk.
pub fn load_roster(path: &Path) -> Result<Vec<NewPlayer>, RosterError> {
    let file = std::fs::File::open(path).map_err(|e| RosterError::Csv(e.into()))?;
    let players = parse_roster(file)?;
    info!("Read {} roster rows from {}", players.len(), path.display());
    Ok(players)
}
