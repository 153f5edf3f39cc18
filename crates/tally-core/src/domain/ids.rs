//! Domain identifiers.
//!
//! Vote ids are ULIDs: sortable by creation time and generated without any
//! coordination, so the HTTP intake and N worker processes never have to agree
//! on a sequence.
//!
//! On the wire (HTTP body, queue message, `votes.id` column) a vote id is the
//! 26-character Crockford base32 form of the ULID.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Identifier of an accepted vote.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteId(Ulid);

impl VoteId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Creation time encoded in the id, in Unix milliseconds.
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl From<Ulid> for VoteId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for VoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed vote id `{0}`")]
pub struct VoteIdParseError(pub String);

impl FromStr for VoteId {
    type Err = VoteIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|_| VoteIdParseError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        let id = VoteId::from_ulid(Ulid::new());
        let text = id.to_string();
        assert_eq!(text.len(), 26);
        assert_eq!(text.parse::<VoteId>().unwrap(), id);
    }

    #[test]
    fn garbage_is_rejected() {
        let err = "not-a-ulid".parse::<VoteId>().unwrap_err();
        assert_eq!(err, VoteIdParseError("not-a-ulid".to_string()));
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = VoteId::from_ulid(Ulid::new());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn ids_sort_by_creation_time() {
        let id1 = VoteId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = VoteId::from_ulid(Ulid::new());
        assert!(id1 < id2);
        assert!(id1.timestamp_ms() <= id2.timestamp_ms());
    }
}
