use serde::{Deserialize, Serialize};

use crate::{dao::models::MatchRecordEntity, state::participant::MatchId};

pub const MATCH_PREFIX: &str = "match::";

/// Match record as stored in CouchDB. Documents are never updated, so no revision is sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchMatchDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing)]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub record: MatchRecordEntity,
}

impl From<MatchRecordEntity> for CouchMatchDocument {
    fn from(record: MatchRecordEntity) -> Self {
        Self {
            id: match_doc_id(&record.match_id),
            rev: None,
            record,
        }
    }
}

impl From<CouchMatchDocument> for MatchRecordEntity {
    fn from(doc: CouchMatchDocument) -> Self {
        doc.record
    }
}

pub fn match_doc_id(match_id: &MatchId) -> String {
    format!("{}{}", MATCH_PREFIX, match_id)
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::state::room::MatchPhase;

    #[test]
    fn documents_flatten_the_record_under_a_prefixed_id() {
        let record = MatchRecordEntity {
            match_id: MatchId::new("match_1"),
            phase: MatchPhase::Finished,
            winner_id: None,
            is_draw: true,
            reason: None,
            players: Vec::new(),
            duration_secs: 42,
            finished_at: SystemTime::UNIX_EPOCH,
        };
        let value = serde_json::to_value(CouchMatchDocument::from(record.clone())).unwrap();
        assert_eq!(value["_id"], "match::match_1");
        assert_eq!(value["duration_secs"], 42);
        assert!(value.get("_rev").is_none());

        let mut stored = value;
        stored["_rev"] = "1-abc".into();
        let doc: CouchMatchDocument = serde_json::from_value(stored).unwrap();
        assert_eq!(doc.rev.as_deref(), Some("1-abc"));
        assert_eq!(MatchRecordEntity::from(doc), record);
    }
}
