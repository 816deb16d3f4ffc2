//! # Stage Registry
//!
//! Owns the ordered set of pipeline stages.
//!
//! ## Invariants
//!
//! - No two active stages share an `order_index` (indices need not be
//!   contiguous).
//! - Active stage names are unique, compared case-insensitively.
//! - Stages are never hard-deleted; deactivation is the only removal.
//!
//! ## Collision Policy
//!
//! Placing an active stage on an index already held by another active stage
//! shifts that stage and every active stage after it by +1. The shifted
//! stages and the placed stage are committed as one batch, guarded by the
//! stage-set revision read at the start of the operation.

use crate::access::{AccessGuard, Action, Resource};
use crate::storage::{RecordStore, Sequence, StageSet};
use crate::validation;
use crate::{Identity, NewStage, PipelineError, Stage, StageId, StagePatch};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The ordered stage set, backed by an injected [`RecordStore`].
#[derive(Clone)]
pub struct StageRegistry {
    store: Arc<dyn RecordStore>,
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry").finish_non_exhaustive()
    }
}

impl StageRegistry {
    /// Create a registry over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Active stages in pipeline order. Public read, no identity needed.
    pub fn list_active_stages(&self) -> Result<Vec<Stage>, PipelineError> {
        Ok(self.store.stage_set()?.active())
    }

    /// Every stage, including inactive ones, ordered by `(order_index, id)`.
    ///
    /// This is the admin view of the pipeline: it requires the same rights
    /// as editing a stage.
    pub fn list_all_stages(&self, identity: Option<&Identity>) -> Result<Vec<Stage>, PipelineError> {
        AccessGuard::authorize(identity, Action::Update, Resource::Stage)?;
        let mut stages = self.store.stage_set()?.stages;
        stages.sort_by_key(|s| (s.order_index, s.id));
        Ok(stages)
    }

    /// Look up one stage, active or not.
    pub fn get_stage(&self, id: StageId) -> Result<Stage, PipelineError> {
        self.store
            .stage(id)?
            .ok_or_else(|| PipelineError::stage_not_found(id))
    }

    /// Resolve a stage a deal may be placed in.
    ///
    /// Missing and inactive stages are both `InvalidStage`.
    pub fn active_stage(&self, id: StageId) -> Result<Stage, PipelineError> {
        match self.store.stage(id)? {
            Some(stage) if stage.is_active => Ok(stage),
            _ => Err(PipelineError::InvalidStage(id)),
        }
    }

    /// The lowest-ordered active stage: where new deals enter the pipeline.
    pub fn default_entry_stage(&self) -> Result<Stage, PipelineError> {
        self.list_active_stages()?
            .into_iter()
            .next()
            .ok_or(PipelineError::NoStagesConfigured)
    }

    /// Ids of every active stage.
    pub fn active_stage_ids(&self) -> Result<BTreeSet<StageId>, PipelineError> {
        Ok(self
            .store
            .stage_set()?
            .stages
            .iter()
            .filter(|s| s.is_active)
            .map(|s| s.id)
            .collect())
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Create a stage.
    ///
    /// Without an explicit index the stage is appended after the last active
    /// stage (index 0 for an empty pipeline). Inactive stages are stored as
    /// given and take no part in collision or name checks.
    pub fn create_stage(
        &self,
        identity: Option<&Identity>,
        new: NewStage,
    ) -> Result<Stage, PipelineError> {
        AccessGuard::authorize(identity, Action::Create, Resource::Stage)?;
        let name = validation::stage_name(&new.name)?;
        validation::order_index(new.order_index)?;

        let snapshot = self.store.stage_set()?;
        let order_index = match new.order_index {
            Some(at) => at,
            None => next_free_index(&snapshot)?,
        };

        let mut writes = Vec::new();
        if new.is_active {
            ensure_unique_name(&snapshot, &name, None)?;
            writes = make_room(&snapshot, order_index, None)?;
        }

        let stage = Stage {
            id: StageId(self.store.next_id(Sequence::Stage)?),
            name,
            order_index,
            is_active: new.is_active,
        };
        writes.push(stage.clone());

        self.store.commit_stages(snapshot.revision, &writes)?;
        Ok(stage)
    }

    /// Apply a partial update to a stage.
    ///
    /// When the resulting stage is active the duplicate-name and collision
    /// rules of [`StageRegistry::create_stage`] apply, which also covers
    /// reactivation of a previously deactivated stage.
    pub fn update_stage(
        &self,
        identity: Option<&Identity>,
        id: StageId,
        patch: StagePatch,
    ) -> Result<Stage, PipelineError> {
        AccessGuard::authorize(identity, Action::Update, Resource::Stage)?;
        let name = patch
            .name
            .as_deref()
            .map(validation::stage_name)
            .transpose()?;
        validation::order_index(patch.order_index)?;

        let snapshot = self.store.stage_set()?;
        let existing = snapshot
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::stage_not_found(id))?;

        let updated = Stage {
            id,
            name: name.unwrap_or_else(|| existing.name.clone()),
            order_index: patch.order_index.unwrap_or(existing.order_index),
            is_active: patch.is_active.unwrap_or(existing.is_active),
        };

        let mut writes = Vec::new();
        if updated.is_active {
            ensure_unique_name(&snapshot, &updated.name, Some(id))?;
            writes = make_room(&snapshot, updated.order_index, Some(id))?;
        }

        if writes.is_empty() && updated == existing {
            return Ok(existing);
        }
        writes.push(updated.clone());

        self.store.commit_stages(snapshot.revision, &writes)?;
        Ok(updated)
    }

    /// Deactivate a stage. Idempotent.
    ///
    /// Deals referencing the stage keep their reference and become orphaned.
    pub fn deactivate_stage(
        &self,
        identity: Option<&Identity>,
        id: StageId,
    ) -> Result<(), PipelineError> {
        AccessGuard::authorize(identity, Action::Delete, Resource::Stage)?;

        let snapshot = self.store.stage_set()?;
        let stage = snapshot
            .get(id)
            .ok_or_else(|| PipelineError::stage_not_found(id))?;
        if !stage.is_active {
            return Ok(());
        }

        let deactivated = Stage {
            is_active: false,
            ..stage.clone()
        };
        self.store.commit_stages(snapshot.revision, &[deactivated])?;
        Ok(())
    }

    /// Reassign every active stage's index to its position in `ordered`.
    ///
    /// `ordered` must contain each active stage id exactly once and nothing
    /// else. The renumbering is committed as one batch or not at all.
    pub fn reorder_stages(
        &self,
        identity: Option<&Identity>,
        ordered: &[StageId],
    ) -> Result<Vec<Stage>, PipelineError> {
        AccessGuard::authorize(identity, Action::Reorder, Resource::Stage)?;

        let snapshot = self.store.stage_set()?;
        let active = snapshot.active();
        check_permutation(&active, ordered)?;

        let reordered: Vec<Stage> = ordered
            .iter()
            .enumerate()
            .filter_map(|(position, id)| {
                active.iter().find(|s| s.id == *id).map(|s| Stage {
                    order_index: position as i64,
                    ..s.clone()
                })
            })
            .collect();

        if !reordered.is_empty() {
            self.store.commit_stages(snapshot.revision, &reordered)?;
        }
        Ok(reordered)
    }
}

// =============================================================================
// ORDERING HELPERS
// =============================================================================

/// `max(active order_index) + 1`, or 0 for an empty pipeline.
fn next_free_index(snapshot: &StageSet) -> Result<i64, PipelineError> {
    match snapshot
        .stages
        .iter()
        .filter(|s| s.is_active)
        .map(|s| s.order_index)
        .max()
    {
        Some(max) => step(max),
        None => Ok(0),
    }
}

/// One position past `index`. Never saturates: two stages landing on
/// `i64::MAX` would share an index.
fn step(index: i64) -> Result<i64, PipelineError> {
    index.checked_add(1).ok_or_else(|| PipelineError::InvalidField {
        field: "order_index",
        reason: "no position left after the last stage".to_string(),
    })
}

fn ensure_unique_name(
    snapshot: &StageSet,
    name: &str,
    exclude: Option<StageId>,
) -> Result<(), PipelineError> {
    let key = validation::name_key(name);
    let taken = snapshot
        .stages
        .iter()
        .filter(|s| s.is_active && Some(s.id) != exclude)
        .any(|s| validation::name_key(&s.name) == key);
    if taken {
        Err(PipelineError::DuplicateName(name.to_string()))
    } else {
        Ok(())
    }
}

/// Free `at` for a stage being placed there.
///
/// Returns the active stages (other than `exclude`) that must move: empty
/// when nothing occupies `at`, otherwise every stage at or after `at`
/// shifted by +1. Shifting a suffix by one keeps indices pairwise distinct.
fn make_room(
    snapshot: &StageSet,
    at: i64,
    exclude: Option<StageId>,
) -> Result<Vec<Stage>, PipelineError> {
    let others = || {
        snapshot
            .stages
            .iter()
            .filter(move |s| s.is_active && Some(s.id) != exclude)
    };

    if !others().any(|s| s.order_index == at) {
        return Ok(Vec::new());
    }
    others()
        .filter(|s| s.order_index >= at)
        .map(|s| {
            Ok(Stage {
                order_index: step(s.order_index)?,
                ..s.clone()
            })
        })
        .collect()
}

fn check_permutation(active: &[Stage], ordered: &[StageId]) -> Result<(), PipelineError> {
    use crate::primitives::MAX_REORDER_LENGTH;

    if ordered.len() > MAX_REORDER_LENGTH {
        return Err(PipelineError::InvalidPermutation(format!(
            "{} ids exceeds maximum {}",
            ordered.len(),
            MAX_REORDER_LENGTH
        )));
    }

    let expected: BTreeSet<StageId> = active.iter().map(|s| s.id).collect();
    let mut seen = BTreeSet::new();
    for id in ordered {
        if !expected.contains(id) {
            return Err(PipelineError::InvalidPermutation(format!(
                "stage {} is unknown or inactive",
                id
            )));
        }
        if !seen.insert(*id) {
            return Err(PipelineError::InvalidPermutation(format!(
                "stage {} appears more than once",
                id
            )));
        }
    }
    if let Some(missing) = expected.difference(&seen).next() {
        return Err(PipelineError::InvalidPermutation(format!(
            "active stage {} is missing",
            missing
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
