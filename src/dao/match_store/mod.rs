pub mod couchdb;
pub mod memory;

use crate::dao::models::MatchRecordEntity;
use crate::dao::storage::StorageResult;
use crate::state::{participant::MatchId, result::MatchResult};
use futures::future::BoxFuture;

/// What [`MatchStore::record_match`] did with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The record was written.
    Inserted,
    /// A record for the same match id already existed and was left untouched.
    AlreadyRecorded,
}

/// Abstraction over the persistence layer for concluded matches.
///
/// Recording is idempotent by match id.
pub trait MatchStore: Send + Sync {
    fn record_match(&self, result: MatchResult) -> BoxFuture<'static, StorageResult<RecordOutcome>>;
    fn find_match(
        &self,
        match_id: MatchId,
    ) -> BoxFuture<'static, StorageResult<Option<MatchRecordEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
