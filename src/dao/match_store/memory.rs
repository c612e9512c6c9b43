//! Process-local match store, used when no database is configured.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;

use crate::{
    dao::{models::MatchRecordEntity, storage::StorageResult},
    state::{participant::MatchId, result::MatchResult},
};

use super::{MatchStore, RecordOutcome};

/// Records kept in memory for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryMatchStore {
    records: Arc<DashMap<MatchId, MatchRecordEntity>>,
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl MatchStore for MemoryMatchStore {
    fn record_match(&self, result: MatchResult) -> BoxFuture<'static, StorageResult<RecordOutcome>> {
        let records = self.records.clone();
        Box::pin(async move {
            let outcome = match records.entry(result.match_id.clone()) {
                Entry::Occupied(_) => RecordOutcome::AlreadyRecorded,
                Entry::Vacant(entry) => {
                    entry.insert(MatchRecordEntity::from(&result));
                    RecordOutcome::Inserted
                }
            };
            Ok(outcome)
        })
    }

    fn find_match(
        &self,
        match_id: MatchId,
    ) -> BoxFuture<'static, StorageResult<Option<MatchRecordEntity>>> {
        let records = self.records.clone();
        Box::pin(async move { Ok(records.get(&match_id).map(|record| record.value().clone())) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::state::room::MatchPhase;

    fn result(id: &str, duration_secs: u32) -> MatchResult {
        MatchResult {
            match_id: MatchId::new(id),
            phase: MatchPhase::Finished,
            winner: None,
            is_draw: true,
            reason: None,
            players: Vec::new(),
            duration_secs,
            finished_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn recording_is_idempotent_by_match_id() {
        let store = MemoryMatchStore::new();
        assert_eq!(
            store.record_match(result("m-1", 60)).await.unwrap(),
            RecordOutcome::Inserted
        );
        assert_eq!(
            store.record_match(result("m-1", 12)).await.unwrap(),
            RecordOutcome::AlreadyRecorded
        );
        assert_eq!(store.len(), 1);

        let stored = store.find_match(MatchId::new("m-1")).await.unwrap().unwrap();
        assert_eq!(stored.duration_secs, 60);
        assert!(store.find_match(MatchId::new("m-2")).await.unwrap().is_none());
    }
}
