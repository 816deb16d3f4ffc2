//! In-memory record store.
//!
//! Volatile and process-local. All state sits behind one `RwLock`, so a
//! stage batch and its revision check happen under the same write guard.

use super::{RecordStore, Sequence, StageSet};
use crate::primitives::FIRST_ID;
use crate::{Deal, DealId, PipelineError, Stage, StageId};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    stages: BTreeMap<StageId, Stage>,
    deals: BTreeMap<DealId, Deal>,
    sequences: BTreeMap<&'static str, u64>,
    stage_revision: u64,
}

/// Lock-protected maps implementing [`RecordStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(context: &'static str) -> PipelineError {
    PipelineError::StoreFailure(format!("poisoned lock: {context}"))
}

impl RecordStore for MemoryStore {
    fn next_id(&self, sequence: Sequence) -> Result<u64, PipelineError> {
        let mut state = self.state.write().map_err(|_| poisoned("next_id"))?;
        let slot = state.sequences.entry(sequence.key()).or_insert(FIRST_ID);
        let id = *slot;
        *slot = slot.saturating_add(1);
        Ok(id)
    }

    fn stage_set(&self) -> Result<StageSet, PipelineError> {
        let state = self.state.read().map_err(|_| poisoned("stage_set"))?;
        Ok(StageSet {
            revision: state.stage_revision,
            stages: state.stages.values().cloned().collect(),
        })
    }

    fn stage(&self, id: StageId) -> Result<Option<Stage>, PipelineError> {
        let state = self.state.read().map_err(|_| poisoned("stage"))?;
        Ok(state.stages.get(&id).cloned())
    }

    fn commit_stages(&self, expected_revision: u64, stages: &[Stage]) -> Result<u64, PipelineError> {
        let mut state = self.state.write().map_err(|_| poisoned("commit_stages"))?;
        if state.stage_revision != expected_revision {
            return Err(PipelineError::ConcurrentModification {
                expected: expected_revision,
                actual: state.stage_revision,
            });
        }
        for stage in stages {
            state.stages.insert(stage.id, stage.clone());
        }
        state.stage_revision = state.stage_revision.saturating_add(1);
        Ok(state.stage_revision)
    }

    fn deal(&self, id: DealId) -> Result<Option<Deal>, PipelineError> {
        let state = self.state.read().map_err(|_| poisoned("deal"))?;
        Ok(state.deals.get(&id).cloned())
    }

    fn put_deal(&self, deal: &Deal) -> Result<(), PipelineError> {
        let mut state = self.state.write().map_err(|_| poisoned("put_deal"))?;
        state.deals.insert(deal.id, deal.clone());
        Ok(())
    }

    fn remove_deal(&self, id: DealId) -> Result<bool, PipelineError> {
        let mut state = self.state.write().map_err(|_| poisoned("remove_deal"))?;
        Ok(state.deals.remove(&id).is_some())
    }

    fn deals(&self) -> Result<Vec<Deal>, PipelineError> {
        let state = self.state.read().map_err(|_| poisoned("deals"))?;
        Ok(state.deals.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::contract;

    #[test]
    fn sequences_are_independent() {
        contract::sequences_are_independent(&MemoryStore::new());
    }

    #[test]
    fn commit_checks_revision() {
        contract::commit_checks_revision(&MemoryStore::new());
    }

    #[test]
    fn deals_round_trip() {
        contract::deals_round_trip(&MemoryStore::new());
    }
}
