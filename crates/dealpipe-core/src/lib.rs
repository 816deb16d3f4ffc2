//! # dealpipe-core
//!
//! The Pipeline & Access-Controlled Record Service - THE LOGIC.
//!
//! This crate maintains an ordered, mutable set of pipeline stages, assigns
//! and repositions deals against those stages, and gates every mutation
//! through a single role-based authorization check.
//!
//! ## Components
//!
//! - `access` → [`AccessGuard`]: the authorization predicate
//! - `registry` → [`StageRegistry`]: ordering, uniqueness, active state
//! - `engine` → [`DealEngine`]: deal placement, moves, ownership
//! - `storage` → [`RecordStore`] and its backends
//!
//! ## Architectural Constraints
//!
//! - Has NO async, NO network dependencies (pure Rust)
//! - Never parses credentials; it consumes an already-validated [`Identity`]
//! - Holds no shared mutable state of its own; the store is injected

// =============================================================================
// MODULES
// =============================================================================

pub mod access;
pub mod engine;
pub mod primitives;
pub mod registry;
pub mod storage;
pub mod types;
pub mod validation;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Deal, DealId, DealPatch, Identity, NewDeal, NewStage, PipelineError, RecordKind, Role, Stage,
    StageId, StagePatch, UserId,
};

// =============================================================================
// RE-EXPORTS: Services
// =============================================================================

pub use access::{AccessGuard, Action, Resource};
pub use engine::DealEngine;
pub use registry::StageRegistry;
pub use storage::{MemoryStore, RecordStore, RedbStore, Sequence, StageSet};
