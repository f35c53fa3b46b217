// Challenge submissions and recorded challenge results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::player::{Division, PlayerId, Tag};

/// Row id of a recorded challenge.
pub type ChallengeId = i64;

/// A finish position within one challenge. 1 is the winner.
pub type FinishPosition = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeType {
    /// Head-to-head: two players and an explicit winner.
    Direct,
    /// Two or more players with a full finish order.
    Group,
}

impl ChallengeType {
    pub fn from_str_type(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Some(ChallengeType::Direct),
            "group" => Some(ChallengeType::Group),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeType::Direct => "Direct",
            ChallengeType::Group => "Group",
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Submission (input)
// ---------------------------------------------------------------------------

/// One participant entry in a submitted challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedParticipant {
    pub player_id: PlayerId,
    /// Required for Group challenges. Optional for Direct challenges, where
    /// the order is derived from `winner_id`.
    #[serde(default)]
    pub finish_position: Option<FinishPosition>,
}

/// A challenge outcome as submitted by a user, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeSubmission {
    pub challenge_type: ChallengeType,
    pub division: Division,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    pub participants: Vec<SubmittedParticipant>,
    /// Required and meaningful only for Direct challenges.
    #[serde(default)]
    pub winner_id: Option<PlayerId>,
}

impl ChallengeSubmission {
    /// Parse a submission from its JSON form.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Participant ids in submission order.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.participants.iter().map(|p| p.player_id).collect()
    }
}

// ---------------------------------------------------------------------------
// Validated challenge
// ---------------------------------------------------------------------------

/// A participant's place in a validated finish order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub player_id: PlayerId,
    pub finish_position: FinishPosition,
}

/// A submission that passed shape validation. `finish_order` is sorted by
/// finish position and forms a dense permutation of 1..=N.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedChallenge {
    pub challenge_type: ChallengeType,
    pub division: Division,
    pub date: DateTime<Utc>,
    pub notes: Option<String>,
    pub finish_order: Vec<Placement>,
}

impl ValidatedChallenge {
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.finish_order.iter().map(|p| p.player_id).collect()
    }

    /// The participant in first place.
    pub fn winner(&self) -> Option<PlayerId> {
        self.finish_order.first().map(|p| p.player_id)
    }
}

// ---------------------------------------------------------------------------
// Recorded challenges (read side)
// ---------------------------------------------------------------------------

/// A participant row of a recorded challenge, joined with the player name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub player_id: PlayerId,
    pub player_name: String,
    pub finish_position: FinishPosition,
    pub tag_before: Option<Tag>,
    pub tag_after: Option<Tag>,
}

/// A recorded challenge with its participants in finish order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub id: ChallengeId,
    pub challenge_type: ChallengeType,
    pub division: Division,
    pub date: DateTime<Utc>,
    pub notes: Option<String>,
    pub participants: Vec<ParticipantRecord>,
}

impl ChallengeRecord {
    pub fn winner(&self) -> Option<&ParticipantRecord> {
        self.participants.iter().find(|p| p.finish_position == 1)
    }
}

/// Filter for listing challenges: everything, one challenge type, or one
/// division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChallengeFilter {
    #[default]
    All,
    Type(ChallengeType),
    Division(Division),
}

impl ChallengeFilter {
    /// Parse `All`, a challenge type name, or a division name.
    pub fn parse(s: &str) -> Option<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Some(ChallengeFilter::All);
        }
        ChallengeType::from_str_type(s)
            .map(ChallengeFilter::Type)
            .or_else(|| Division::from_str_div(s).map(ChallengeFilter::Division))
    }

    pub fn matches(&self, record: &ChallengeRecord) -> bool {
        match self {
            ChallengeFilter::All => true,
            ChallengeFilter::Type(t) => record.challenge_type == *t,
            ChallengeFilter::Division(d) => record.division == *d,
        }
    }
}
