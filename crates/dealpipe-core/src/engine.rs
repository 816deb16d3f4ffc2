//! # Deal Assignment Engine
//!
//! Owns deal-to-stage assignment, moves and ownership metadata.
//!
//! Every deal write is a single-record write validated against the
//! registry's current stage set first. A stage deactivated between that
//! validation and the write leaves the deal orphaned; this window is
//! accepted and the next move surfaces it as `InvalidStage`.
//!
//! ## Stage Membership
//!
//! A deal is either in an active stage or orphaned (its stage was
//! deactivated). Only `move_deal`/`update_deal` move it between active
//! stages; only stage deactivation orphans it.

use crate::access::{AccessGuard, Action, Resource};
use crate::registry::StageRegistry;
use crate::storage::{RecordStore, Sequence};
use crate::validation;
use crate::{Deal, DealId, DealPatch, Identity, NewDeal, PipelineError, StageId};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Deal operations over an injected store and the stage registry.
#[derive(Clone)]
pub struct DealEngine {
    store: Arc<dyn RecordStore>,
    stages: StageRegistry,
}

impl std::fmt::Debug for DealEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DealEngine").finish_non_exhaustive()
    }
}

/// Next `updated_at` for a record last touched at `previous`.
///
/// Strictly increases even if the wall clock does not, so
/// most-recently-updated ordering always reflects write order.
fn touch(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

/// Most-recently-updated first; higher id first on ties.
fn sort_recent_first(deals: &mut [Deal]) {
    deals.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

impl DealEngine {
    /// Create an engine over `store`, validating stages through `stages`.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, stages: StageRegistry) -> Self {
        Self { store, stages }
    }

    /// The registry this engine validates against.
    #[must_use]
    pub fn stages(&self) -> &StageRegistry {
        &self.stages
    }

    fn load(&self, id: DealId) -> Result<Deal, PipelineError> {
        self.store
            .deal(id)?
            .ok_or_else(|| PipelineError::deal_not_found(id))
    }

    /// Load a deal and check the caller may apply `action` to it.
    ///
    /// Authentication is checked before the lookup; ownership after it.
    fn load_for(
        &self,
        identity: Option<&Identity>,
        id: DealId,
        action: Action,
    ) -> Result<Deal, PipelineError> {
        AccessGuard::authenticate(identity)?;
        let deal = self.load(id)?;
        AccessGuard::authorize(
            identity,
            action,
            Resource::Deal {
                owner: Some(&deal.owner_user_id),
            },
        )?;
        Ok(deal)
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Create a deal.
    ///
    /// Without a stage the deal enters the lowest-ordered active stage. The
    /// caller owns the deal unless an admin names another owner.
    pub fn create_deal(
        &self,
        identity: Option<&Identity>,
        new: NewDeal,
    ) -> Result<Deal, PipelineError> {
        let caller = AccessGuard::authorize(identity, Action::Create, Resource::Deal { owner: None })?;
        validation::new_deal(&new)?;

        let owner = match new.owner_user_id {
            Some(owner) if owner != caller.user_id && !caller.is_admin() => {
                return Err(PipelineError::Forbidden);
            }
            Some(owner) => {
                validation::owner_id(&owner)?;
                owner
            }
            None => caller.user_id.clone(),
        };

        let stage = match new.stage_id {
            Some(id) => self.stages.active_stage(id)?,
            None => self.stages.default_entry_stage()?,
        };

        let now = Utc::now();
        let deal = Deal {
            id: DealId(self.store.next_id(Sequence::Deal)?),
            stage_id: stage.id,
            owner_user_id: owner,
            title: new.title,
            value_cents: new.value_cents,
            probability: new.probability,
            expected_close_date: new.expected_close_date,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };
        self.store.put_deal(&deal)?;
        Ok(deal)
    }

    /// Move a deal to another stage.
    ///
    /// Ownership is checked against the existing deal. Only `stage_id` and
    /// `updated_at` change; moving to the current stage only refreshes
    /// `updated_at`.
    pub fn move_deal(
        &self,
        identity: Option<&Identity>,
        id: DealId,
        target: StageId,
    ) -> Result<Deal, PipelineError> {
        let deal = self.load_for(identity, id, Action::Update)?;
        let stage = self.stages.active_stage(target)?;

        let moved = Deal {
            stage_id: stage.id,
            updated_at: touch(deal.updated_at),
            ..deal
        };
        self.store.put_deal(&moved)?;
        Ok(moved)
    }

    /// Apply a partial update to a deal.
    ///
    /// A stage change follows the rules of [`DealEngine::move_deal`];
    /// reassigning the owner is reserved to admins. Everything is validated
    /// before the single write.
    ///
    /// Fields left `None` in the patch keep their stored value; an optional
    /// business field, once set, can be overwritten but not cleared.
    pub fn update_deal(
        &self,
        identity: Option<&Identity>,
        id: DealId,
        patch: DealPatch,
    ) -> Result<Deal, PipelineError> {
        let deal = self.load_for(identity, id, Action::Update)?;
        validation::deal_patch(&patch)?;

        if let Some(owner) = &patch.owner_user_id {
            let is_admin = identity.is_some_and(Identity::is_admin);
            if *owner != deal.owner_user_id && !is_admin {
                return Err(PipelineError::Forbidden);
            }
        }
        let stage_id = match patch.stage_id {
            Some(target) => self.stages.active_stage(target)?.id,
            None => deal.stage_id,
        };

        let updated = Deal {
            id: deal.id,
            stage_id,
            owner_user_id: patch.owner_user_id.unwrap_or(deal.owner_user_id),
            title: patch.title.or(deal.title),
            value_cents: patch.value_cents.or(deal.value_cents),
            probability: patch.probability.or(deal.probability),
            expected_close_date: patch.expected_close_date.or(deal.expected_close_date),
            notes: patch.notes.or(deal.notes),
            created_at: deal.created_at,
            updated_at: touch(deal.updated_at),
        };
        self.store.put_deal(&updated)?;
        Ok(updated)
    }

    /// Hard-delete a deal.
    pub fn delete_deal(&self, identity: Option<&Identity>, id: DealId) -> Result<(), PipelineError> {
        self.load_for(identity, id, Action::Delete)?;
        if self.store.remove_deal(id)? {
            Ok(())
        } else {
            // Deleted by someone else between the lookup and the write.
            Err(PipelineError::deal_not_found(id))
        }
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Fetch one deal.
    pub fn get_deal(&self, identity: Option<&Identity>, id: DealId) -> Result<Deal, PipelineError> {
        self.load_for(identity, id, Action::Read)
    }

    /// Deals in one stage, most recently updated first.
    ///
    /// Works for inactive stages too, which lists that stage's orphans.
    pub fn list_deals_by_stage(
        &self,
        identity: Option<&Identity>,
        stage: StageId,
    ) -> Result<Vec<Deal>, PipelineError> {
        AccessGuard::authorize(identity, Action::Read, Resource::Deal { owner: None })?;
        self.stages.get_stage(stage)?;

        let mut deals = self.store.deals_in_stage(stage)?;
        sort_recent_first(&mut deals);
        Ok(deals)
    }

    /// Every deal, most recently updated first.
    pub fn list_deals(&self, identity: Option<&Identity>) -> Result<Vec<Deal>, PipelineError> {
        AccessGuard::authorize(identity, Action::Read, Resource::Deal { owner: None })?;
        let mut deals = self.store.deals()?;
        sort_recent_first(&mut deals);
        Ok(deals)
    }

    /// Deals whose stage is no longer active, most recently updated first.
    pub fn list_orphaned_deals(
        &self,
        identity: Option<&Identity>,
    ) -> Result<Vec<Deal>, PipelineError> {
        let active = self.stages.active_stage_ids()?;
        let mut deals = self.list_deals(identity)?;
        deals.retain(|d| !active.contains(&d.stage_id));
        Ok(deals)
    }
}

// =============================================================================
// TESTS
// =============================================================================
