//! # redb-backed Record Store
//!
//! A disk-backed store using the redb embedded database, providing:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! redb serializes write transactions, so the revision check in
//! `commit_stages` and the batch it guards commit or fail as one unit.

use super::{RecordStore, Sequence, StageSet};
use crate::primitives::FIRST_ID;
use crate::{Deal, DealId, PipelineError, Stage, StageId};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

/// Table for stages: StageId(u64) -> postcard-encoded Stage
const STAGES: TableDefinition<u64, &[u8]> = TableDefinition::new("stages");

/// Table for deals: DealId(u64) -> postcard-encoded Deal
const DEALS: TableDefinition<u64, &[u8]> = TableDefinition::new("deals");

/// Secondary index: (stage_id, deal_id) -> ()
/// Keyed by stage first so a range scan yields one stage's deals.
const DEALS_BY_STAGE: TableDefinition<(u64, u64), ()> = TableDefinition::new("deals_by_stage");

/// Table for metadata: key string -> value u64 (id sequences, stage revision)
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const STAGE_REVISION: &str = "stage_revision";

/// A disk-backed [`RecordStore`].
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, PipelineError> {
    postcard::to_allocvec(value).map_err(PipelineError::store)
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, PipelineError> {
    postcard::from_bytes(bytes).map_err(PipelineError::store)
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let db = Database::create(path.as_ref()).map_err(PipelineError::store)?;

        // Initialize tables if they don't exist
        let write_txn = db.begin_write().map_err(PipelineError::store)?;
        {
            write_txn.open_table(STAGES).map_err(PipelineError::store)?;
            write_txn.open_table(DEALS).map_err(PipelineError::store)?;
            write_txn
                .open_table(DEALS_BY_STAGE)
                .map_err(PipelineError::store)?;
            write_txn.open_table(METADATA).map_err(PipelineError::store)?;
        }
        write_txn.commit().map_err(PipelineError::store)?;

        Ok(Self { db })
    }
}

impl RecordStore for RedbStore {
    fn next_id(&self, sequence: Sequence) -> Result<u64, PipelineError> {
        let write_txn = self.db.begin_write().map_err(PipelineError::store)?;
        let id = {
            let mut meta = write_txn.open_table(METADATA).map_err(PipelineError::store)?;
            let id = meta
                .get(sequence.key())
                .map_err(PipelineError::store)?
                .map(|v| v.value())
                .unwrap_or(FIRST_ID);
            meta.insert(sequence.key(), id.saturating_add(1))
                .map_err(PipelineError::store)?;
            id
        };
        write_txn.commit().map_err(PipelineError::store)?;
        Ok(id)
    }

    fn stage_set(&self) -> Result<StageSet, PipelineError> {
        let read_txn = self.db.begin_read().map_err(PipelineError::store)?;
        let meta = read_txn.open_table(METADATA).map_err(PipelineError::store)?;
        let table = read_txn.open_table(STAGES).map_err(PipelineError::store)?;

        let revision = meta
            .get(STAGE_REVISION)
            .map_err(PipelineError::store)?
            .map(|v| v.value())
            .unwrap_or(0);

        let mut stages = Vec::new();
        for entry in table.iter().map_err(PipelineError::store)? {
            let (_, value) = entry.map_err(PipelineError::store)?;
            stages.push(decode::<Stage>(value.value())?);
        }
        Ok(StageSet { revision, stages })
    }

    fn stage(&self, id: StageId) -> Result<Option<Stage>, PipelineError> {
        let read_txn = self.db.begin_read().map_err(PipelineError::store)?;
        let table = read_txn.open_table(STAGES).map_err(PipelineError::store)?;
        match table.get(id.0).map_err(PipelineError::store)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn commit_stages(&self, expected_revision: u64, stages: &[Stage]) -> Result<u64, PipelineError> {
        // Encode before opening the transaction so a bad record aborts early.
        let encoded = stages
            .iter()
            .map(|s| encode(s).map(|bytes| (s.id.0, bytes)))
            .collect::<Result<Vec<_>, _>>()?;

        let write_txn = self.db.begin_write().map_err(PipelineError::store)?;
        let revision = {
            let mut meta = write_txn.open_table(METADATA).map_err(PipelineError::store)?;
            let actual = meta
                .get(STAGE_REVISION)
                .map_err(PipelineError::store)?
                .map(|v| v.value())
                .unwrap_or(0);
            if actual != expected_revision {
                // Dropping the transaction without commit discards it.
                return Err(PipelineError::ConcurrentModification {
                    expected: expected_revision,
                    actual,
                });
            }

            let mut table = write_txn.open_table(STAGES).map_err(PipelineError::store)?;
            for (id, bytes) in &encoded {
                table
                    .insert(*id, bytes.as_slice())
                    .map_err(PipelineError::store)?;
            }

            let next = actual.saturating_add(1);
            meta.insert(STAGE_REVISION, next)
                .map_err(PipelineError::store)?;
            next
        };
        write_txn.commit().map_err(PipelineError::store)?;
        Ok(revision)
    }

    fn deal(&self, id: DealId) -> Result<Option<Deal>, PipelineError> {
        let read_txn = self.db.begin_read().map_err(PipelineError::store)?;
        let table = read_txn.open_table(DEALS).map_err(PipelineError::store)?;
        match table.get(id.0).map_err(PipelineError::store)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn put_deal(&self, deal: &Deal) -> Result<(), PipelineError> {
        let bytes = encode(deal)?;

        let write_txn = self.db.begin_write().map_err(PipelineError::store)?;
        {
            let mut deals = write_txn.open_table(DEALS).map_err(PipelineError::store)?;
            let mut index = write_txn
                .open_table(DEALS_BY_STAGE)
                .map_err(PipelineError::store)?;

            let previous_stage = match deals.get(deal.id.0).map_err(PipelineError::store)? {
                Some(value) => Some(decode::<Deal>(value.value())?.stage_id),
                None => None,
            };
            if let Some(previous) = previous_stage {
                index
                    .remove((previous.0, deal.id.0))
                    .map_err(PipelineError::store)?;
            }

            deals
                .insert(deal.id.0, bytes.as_slice())
                .map_err(PipelineError::store)?;
            index
                .insert((deal.stage_id.0, deal.id.0), ())
                .map_err(PipelineError::store)?;
        }
        write_txn.commit().map_err(PipelineError::store)
    }

    fn remove_deal(&self, id: DealId) -> Result<bool, PipelineError> {
        let write_txn = self.db.begin_write().map_err(PipelineError::store)?;
        let existed = {
            let mut deals = write_txn.open_table(DEALS).map_err(PipelineError::store)?;
            let mut index = write_txn
                .open_table(DEALS_BY_STAGE)
                .map_err(PipelineError::store)?;

            let removed = match deals.remove(id.0).map_err(PipelineError::store)? {
                Some(value) => Some(decode::<Deal>(value.value())?),
                None => None,
            };
            match removed {
                Some(deal) => {
                    index
                        .remove((deal.stage_id.0, id.0))
                        .map_err(PipelineError::store)?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit().map_err(PipelineError::store)?;
        Ok(existed)
    }

    fn deals(&self) -> Result<Vec<Deal>, PipelineError> {
        let read_txn = self.db.begin_read().map_err(PipelineError::store)?;
        let table = read_txn.open_table(DEALS).map_err(PipelineError::store)?;

        let mut deals = Vec::new();
        for entry in table.iter().map_err(PipelineError::store)? {
            let (_, value) = entry.map_err(PipelineError::store)?;
            deals.push(decode::<Deal>(value.value())?);
        }
        Ok(deals)
    }

    fn deals_in_stage(&self, stage: StageId) -> Result<Vec<Deal>, PipelineError> {
        let read_txn = self.db.begin_read().map_err(PipelineError::store)?;
        let index = read_txn
            .open_table(DEALS_BY_STAGE)
            .map_err(PipelineError::store)?;
        let table = read_txn.open_table(DEALS).map_err(PipelineError::store)?;

        let mut deals = Vec::new();
        for entry in index
            .range((stage.0, 0)..=(stage.0, u64::MAX))
            .map_err(PipelineError::store)?
        {
            let (key, _) = entry.map_err(PipelineError::store)?;
            let (_, deal_id) = key.value();
            if let Some(value) = table.get(deal_id).map_err(PipelineError::store)? {
                deals.push(decode::<Deal>(value.value())?);
            }
        }
        Ok(deals)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::contract;
    use tempfile::TempDir;

    fn open_temp() -> (RedbStore, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let store = RedbStore::open(dir.path().join("pipeline.redb")).expect("open");
        (store, dir)
    }

    #[test]
    fn sequences_are_independent() {
        let (store, _dir) = open_temp();
        contract::sequences_are_independent(&store);
    }

    #[test]
    fn commit_checks_revision() {
        let (store, _dir) = open_temp();
        contract::commit_checks_revision(&store);
    }

    #[test]
    fn deals_round_trip() {
        let (store, _dir) = open_temp();
        contract::deals_round_trip(&store);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("pipeline.redb");

        {
            let store = RedbStore::open(&path).expect("open");
            store
                .commit_stages(0, &[contract::stage(1, "New", 0)])
                .expect("commit");
            store.put_deal(&contract::deal(1, 1)).expect("put");
            assert_eq!(store.next_id(Sequence::Deal).expect("id"), 1);
        }

        let store = RedbStore::open(&path).expect("reopen");
        let set = store.stage_set().expect("read");
        assert_eq!(set.revision, 1);
        assert_eq!(set.stages.len(), 1);
        assert_eq!(store.deals_in_stage(StageId(1)).expect("list").len(), 1);
        // Sequences continue where they stopped.
        assert_eq!(store.next_id(Sequence::Deal).expect("id"), 2);
    }
}
