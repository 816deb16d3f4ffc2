//! # Record Store
//!
//! The abstract transactional store that holds stages and deals.
//!
//! Two backends are provided:
//! - `MemoryStore`: volatile, lock-protected maps (tests, embedded use)
//! - `RedbStore`: disk-backed ACID storage using redb
//!
//! ## Stage-Set Revision
//!
//! Every committed stage write bumps a single revision counter. Multi-stage
//! writes (inserts that shift neighbours, reorders) are committed with
//! [`RecordStore::commit_stages`], which applies the whole batch only if the
//! revision still matches the one the caller read. This serializes
//! concurrent reorders across processes without an in-process mutex.
//!
//! Deal writes are single-record writes and need no revision.

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::{Deal, DealId, PipelineError, Stage, StageId};

/// Independent id sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    Stage,
    Deal,
}

impl Sequence {
    pub(crate) fn key(self) -> &'static str {
        match self {
            Sequence::Stage => "next_stage_id",
            Sequence::Deal => "next_deal_id",
        }
    }
}

/// A consistent read of every stage together with the revision it was read at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSet {
    pub revision: u64,
    /// All stages, active and inactive, ordered by id.
    pub stages: Vec<Stage>,
}

impl StageSet {
    /// Find a stage by id.
    #[must_use]
    pub fn get(&self, id: StageId) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Active stages ascending by `(order_index, id)`.
    #[must_use]
    pub fn active(&self) -> Vec<Stage> {
        let mut active: Vec<Stage> = self.stages.iter().filter(|s| s.is_active).cloned().collect();
        active.sort_by_key(|s| (s.order_index, s.id));
        active
    }
}

/// Transactional storage for stages and deals.
///
/// Implementations must be safe to share across request handlers.
pub trait RecordStore: Send + Sync {
    /// Hand out the next id of a sequence. Ids are never reused.
    fn next_id(&self, sequence: Sequence) -> Result<u64, PipelineError>;

    /// Read every stage and the current stage-set revision in one snapshot.
    fn stage_set(&self) -> Result<StageSet, PipelineError>;

    /// Look up a single stage.
    fn stage(&self, id: StageId) -> Result<Option<Stage>, PipelineError>;

    /// Upsert a batch of stages atomically.
    ///
    /// Fails with `ConcurrentModification` (writing nothing) if the stage-set
    /// revision is no longer `expected_revision`. Returns the new revision.
    fn commit_stages(&self, expected_revision: u64, stages: &[Stage]) -> Result<u64, PipelineError>;

    /// Look up a single deal.
    fn deal(&self, id: DealId) -> Result<Option<Deal>, PipelineError>;

    /// Insert or replace a deal.
    fn put_deal(&self, deal: &Deal) -> Result<(), PipelineError>;

    /// Delete a deal. Returns `false` if it did not exist.
    fn remove_deal(&self, id: DealId) -> Result<bool, PipelineError>;

    /// Every deal, ordered by id.
    fn deals(&self) -> Result<Vec<Deal>, PipelineError>;

    /// Deals referencing `stage`, ordered by id.
    fn deals_in_stage(&self, stage: StageId) -> Result<Vec<Deal>, PipelineError> {
        Ok(self
            .deals()?
            .into_iter()
            .filter(|d| d.stage_id == stage)
            .collect())
    }
}

// =============================================================================
// SHARED BACKEND TESTS
// =============================================================================

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every backend must share.

    use super::*;
    use crate::UserId;
    use chrono::Utc;

    pub(crate) fn stage(id: u64, name: &str, order_index: i64) -> Stage {
        Stage {
            id: StageId(id),
            name: name.to_string(),
            order_index,
            is_active: true,
        }
    }

    pub(crate) fn deal(id: u64, stage_id: u64) -> Deal {
        let now = Utc::now();
        Deal {
            id: DealId(id),
            stage_id: StageId(stage_id),
            owner_user_id: UserId::new("alice"),
            title: None,
            value_cents: None,
            probability: None,
            expected_close_date: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn sequences_are_independent(store: &dyn RecordStore) {
        assert_eq!(store.next_id(Sequence::Stage).expect("id"), 1);
        assert_eq!(store.next_id(Sequence::Stage).expect("id"), 2);
        assert_eq!(store.next_id(Sequence::Deal).expect("id"), 1);
    }

    pub(crate) fn commit_checks_revision(store: &dyn RecordStore) {
        let initial = store.stage_set().expect("read");
        assert_eq!(initial.revision, 0);
        assert!(initial.stages.is_empty());

        let rev = store
            .commit_stages(0, &[stage(1, "New", 0), stage(2, "Won", 1)])
            .expect("commit");
        assert_eq!(rev, 1);

        let stale = store.commit_stages(0, &[stage(1, "Renamed", 0)]);
        assert_eq!(
            stale,
            Err(PipelineError::ConcurrentModification {
                expected: 0,
                actual: 1
            })
        );

        let set = store.stage_set().expect("read");
        assert_eq!(set.revision, 1);
        assert_eq!(set.stages.len(), 2);
        assert_eq!(set.get(StageId(1)).map(|s| s.name.as_str()), Some("New"));
        assert_eq!(
            store.stage(StageId(2)).expect("get").map(|s| s.order_index),
            Some(1)
        );
    }

    pub(crate) fn deals_round_trip(store: &dyn RecordStore) {
        store.put_deal(&deal(1, 10)).expect("put");
        store.put_deal(&deal(2, 11)).expect("put");
        store.put_deal(&deal(3, 10)).expect("put");

        let in_ten: Vec<DealId> = store
            .deals_in_stage(StageId(10))
            .expect("list")
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(in_ten, vec![DealId(1), DealId(3)]);

        // Moving a deal must update the stage index.
        let mut moved = deal(3, 11);
        moved.notes = Some("moved".to_string());
        store.put_deal(&moved).expect("put");
        assert_eq!(store.deals_in_stage(StageId(10)).expect("list").len(), 1);
        assert_eq!(store.deals_in_stage(StageId(11)).expect("list").len(), 2);

        assert!(store.remove_deal(DealId(1)).expect("remove"));
        assert!(!store.remove_deal(DealId(1)).expect("remove"));
        assert!(store.deal(DealId(1)).expect("get").is_none());
        assert!(store.deals_in_stage(StageId(10)).expect("list").is_empty());
        assert_eq!(store.deals().expect("all").len(), 2);
    }
}
