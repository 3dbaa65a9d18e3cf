//! Identifier and record types shared by the API client, store and crawler

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Opaque identifier for a player account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AccountId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Opaque identifier for a single match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub i64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MatchId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// The part of a match-list item the crawler cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MatchListEntry {
    #[serde(rename = "gameId")]
    pub match_id: MatchId,
}

/// One page of an account's match list
#[derive(Debug, Clone, Deserialize)]
pub struct MatchListPage {
    #[serde(default)]
    pub matches: Vec<MatchListEntry>,

    #[serde(rename = "startIndex", default)]
    pub start_index: u32,

    /// Exclusive end of this page; also the next page's begin index
    #[serde(rename = "endIndex")]
    pub end_index: u32,

    #[serde(rename = "totalGames")]
    pub total_games: u32,
}

impl MatchListPage {
    /// Returns true if another page must be requested after this one
    pub fn has_more(&self) -> bool {
        (self.end_index as i64) < self.total_games as i64 - 1
    }
}

/// Filters applied to every match-list request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchListQuery {
    pub queue: Option<u32>,
    pub season: Option<u32>,
}

/// A full match record
///
/// The body is kept verbatim; the crawler only needs the participant
/// projection.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub id: MatchId,
    pub body: serde_json::Value,
}

impl MatchRecord {
    pub fn new(id: MatchId, body: serde_json::Value) -> Self {
        Self { id, body }
    }

    /// Builds a record from a body carrying its own `gameId`
    pub fn from_body(body: serde_json::Value) -> Option<Self> {
        let id = body.get("gameId")?.as_i64()?;
        Some(Self::new(MatchId(id), body))
    }

    /// Account ids of the match participants, deduplicated, in record order
    pub fn participants(&self) -> Vec<AccountId> {
        let mut seen = HashSet::new();
        self.body
            .get("participantIdentities")
            .and_then(|v| v.as_array())
            .map(|identities| {
                identities
                    .iter()
                    .filter_map(|identity| identity.get("player")?.get("accountId")?.as_i64())
                    .map(AccountId)
                    .filter(|id| seen.insert(*id))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_participants_extracted() {
        let record = MatchRecord::new(
            MatchId(1),
            json!({
                "gameId": 1,
                "participantIdentities": [
                    {"participantId": 1, "player": {"accountId": 10, "summonerName": "a"}},
                    {"participantId": 2, "player": {"accountId": 20}},
                    {"participantId": 3, "player": {"accountId": 10}},
                    {"participantId": 4}
                ]
            }),
        );

        assert_eq!(record.participants(), vec![AccountId(10), AccountId(20)]);
    }

    #[test]
    fn test_participants_missing() {
        let record = MatchRecord::new(MatchId(1), json!({"gameId": 1}));
        assert!(record.participants().is_empty());
    }

    #[test]
    fn test_from_body() {
        let record = MatchRecord::from_body(json!({"gameId": 77})).unwrap();
        assert_eq!(record.id, MatchId(77));
        assert!(MatchRecord::from_body(json!({"other": 1})).is_none());
    }

    #[test]
    fn test_page_has_more() {
        let page: MatchListPage = serde_json::from_value(json!({
            "matches": [{"gameId": 5, "champion": 1}],
            "startIndex": 0,
            "endIndex": 100,
            "totalGames": 237
        }))
        .unwrap();
        assert_eq!(page.matches[0].match_id, MatchId(5));
        assert!(page.has_more());

        let last: MatchListPage = serde_json::from_value(json!({
            "matches": [],
            "startIndex": 200,
            "endIndex": 237,
            "totalGames": 237
        }))
        .unwrap();
        assert!(!last.has_more());

        let empty: MatchListPage = serde_json::from_value(json!({
            "matches": [],
            "endIndex": 0,
            "totalGames": 0
        }))
        .unwrap();
        assert!(!empty.has_more());
    }
}
