//! # Core Type Definitions
//!
//! This module contains all core types for the pipeline record service:
//! - Identifiers (`StageId`, `DealId`, `UserId`)
//! - The caller identity (`Identity`, `Role`)
//! - Records (`Stage`, `Deal`) and their create/patch payloads
//! - Error types (`PipelineError`)
//!
//! ## Ordering Guarantees
//!
//! All identifiers implement `Ord` so that records can live in
//! `BTreeMap`/`BTreeSet` and every listing has a deterministic order.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Opaque identifier of a pipeline stage. Stable for the stage's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(pub u64);

/// Opaque identifier of a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealId(pub u64);

/// Identifier of an authenticated user, as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Create a new user id from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the user id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Role carried by an identity. Never mutated by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

/// An already-validated `(userId, role)` pair supplied per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

impl Identity {
    #[must_use]
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role,
        }
    }

    /// Shorthand for an admin identity.
    #[must_use]
    pub fn admin(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Admin)
    }

    /// Shorthand for a member identity.
    #[must_use]
    pub fn member(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Member)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// =============================================================================
// STAGE
// =============================================================================

/// A named, ordered step in the sales pipeline.
///
/// No two *active* stages share an `order_index`. Inactive stages keep
/// whatever index they had and may collide with active ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
    pub order_index: i64,
    pub is_active: bool,
}

/// Payload for creating a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStage {
    pub name: String,
    /// `None` appends after the last active stage.
    pub order_index: Option<i64>,
    pub is_active: bool,
}

impl NewStage {
    /// An active stage appended at the end of the pipeline.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order_index: None,
            is_active: true,
        }
    }

    /// Request a specific position.
    #[must_use]
    pub fn at(mut self, order_index: i64) -> Self {
        self.order_index = Some(order_index);
        self
    }
}

/// Partial update of a stage. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagePatch {
    pub name: Option<String>,
    pub order_index: Option<i64>,
    pub is_active: Option<bool>,
}

// =============================================================================
// DEAL
// =============================================================================

/// A tracked sales opportunity.
///
/// `stage_id` always names a stage that exists; when that stage is
/// deactivated the deal keeps the reference and counts as orphaned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub stage_id: StageId,
    pub owner_user_id: UserId,
    pub title: Option<String>,
    pub value_cents: Option<i64>,
    /// Close probability in whole percent (0..=100).
    pub probability: Option<u8>,
    pub expected_close_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a deal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewDeal {
    /// `None` places the deal in the lowest-ordered active stage.
    pub stage_id: Option<StageId>,
    /// Only an admin may create a deal on behalf of someone else.
    pub owner_user_id: Option<UserId>,
    pub title: Option<String>,
    pub value_cents: Option<i64>,
    pub probability: Option<u8>,
    pub expected_close_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Partial update of a deal. `None` fields are left untouched.
///
/// There is no way to clear an optional field through a patch; a value can
/// only be replaced by another value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DealPatch {
    pub stage_id: Option<StageId>,
    pub owner_user_id: Option<UserId>,
    pub title: Option<String>,
    pub value_cents: Option<i64>,
    pub probability: Option<u8>,
    pub expected_close_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl DealPatch {
    /// True when the patch changes nothing but the stage.
    #[must_use]
    pub fn is_stage_only(&self) -> bool {
        self.stage_id.is_some()
            && self.owner_user_id.is_none()
            && self.title.is_none()
            && self.value_cents.is_none()
            && self.probability.is_none()
            && self.expected_close_date.is_none()
            && self.notes.is_none()
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// The kind of record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Stage,
    Deal,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Stage => f.write_str("Stage"),
            RecordKind::Deal => f.write_str("Deal"),
        }
    }
}

/// Errors produced by the pipeline core.
///
/// Validation and authorization errors are returned verbatim to the caller.
/// `StoreFailure` wraps any backend error; its detail is for logs only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// No identity was supplied.
    #[error("Authentication required")]
    Unauthenticated,

    /// The identity lacks the role or ownership for this action.
    #[error("Forbidden")]
    Forbidden,

    /// The addressed record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: u64 },

    /// The referenced stage is missing or inactive.
    #[error("Stage {0} is missing or inactive")]
    InvalidStage(StageId),

    /// A deal needs an entry stage but none is active.
    #[error("No active pipeline stages are configured")]
    NoStagesConfigured,

    /// Another active stage already uses this name (case-insensitive).
    #[error("An active stage named '{0}' already exists")]
    DuplicateName(String),

    /// A reorder request is not a permutation of the active stage ids.
    #[error("Invalid stage permutation: {0}")]
    InvalidPermutation(String),

    /// A field failed its limits.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// The stage set changed between read and commit.
    #[error("Stage set was modified concurrently (expected revision {expected}, found {actual})")]
    ConcurrentModification { expected: u64, actual: u64 },

    /// The record store failed.
    #[error("Store failure: {0}")]
    StoreFailure(String),
}

impl PipelineError {
    /// Stable machine-readable name of the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Unauthenticated => "Unauthenticated",
            PipelineError::Forbidden => "Forbidden",
            PipelineError::NotFound { .. } => "NotFound",
            PipelineError::InvalidStage(_) => "InvalidStage",
            PipelineError::NoStagesConfigured => "NoStagesConfigured",
            PipelineError::DuplicateName(_) => "DuplicateName",
            PipelineError::InvalidPermutation(_) => "InvalidPermutation",
            PipelineError::InvalidField { .. } => "InvalidField",
            PipelineError::ConcurrentModification { .. } => "ConcurrentModification",
            PipelineError::StoreFailure(_) => "StoreFailure",
        }
    }

    pub(crate) fn stage_not_found(id: StageId) -> Self {
        PipelineError::NotFound {
            kind: RecordKind::Stage,
            id: id.0,
        }
    }

    pub(crate) fn deal_not_found(id: DealId) -> Self {
        PipelineError::NotFound {
            kind: RecordKind::Deal,
            id: id.0,
        }
    }

    /// Wrap any backend error as a store failure.
    pub(crate) fn store(e: impl fmt::Display) -> Self {
        PipelineError::StoreFailure(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_role_helpers() {
        assert!(Identity::admin("root").is_admin());
        assert!(!Identity::member("alice").is_admin());
        assert_eq!(Identity::member("alice").user_id.as_str(), "alice");
    }

    // Records are stored postcard-encoded; timestamps must survive that.
    #[test]
    fn deal_survives_postcard_encoding() {
        let now = Utc::now();
        let deal = Deal {
            id: DealId(7),
            stage_id: StageId(2),
            owner_user_id: UserId::new("alice"),
            title: Some("12 Elm St".to_string()),
            value_cents: Some(45_000_000),
            probability: Some(40),
            expected_close_date: NaiveDate::from_ymd_opt(2026, 11, 30),
            notes: None,
            created_at: now,
            updated_at: now,
        };

        let bytes = postcard::to_allocvec(&deal).expect("encode");
        let decoded: Deal = postcard::from_bytes(&bytes).expect("decode");
        assert_eq!(decoded, deal);
    }

    #[test]
    fn stage_only_patch_detection() {
        let mv = DealPatch {
            stage_id: Some(StageId(3)),
            ..DealPatch::default()
        };
        assert!(mv.is_stage_only());

        let edit = DealPatch {
            stage_id: Some(StageId(3)),
            notes: Some("call back".to_string()),
            ..DealPatch::default()
        };
        assert!(!edit.is_stage_only());
        assert!(!DealPatch::default().is_stage_only());
    }

    #[test]
    fn error_kinds_are_stable() {
        assert_eq!(PipelineError::Forbidden.kind(), "Forbidden");
        assert_eq!(
            PipelineError::stage_not_found(StageId(4)).to_string(),
            "Stage not found: 4"
        );
        assert_eq!(PipelineError::store("disk full").kind(), "StoreFailure");
    }
}
