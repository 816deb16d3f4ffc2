//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API. Request types
//! convert into the core's payload types; limits are enforced by the core.

use chrono::NaiveDate;
use dealpipe_core::{Deal, DealPatch, NewDeal, NewStage, StageId, StagePatch, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// ERROR / MESSAGE RESPONSES
// =============================================================================

/// Body of every non-2xx response produced by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error kind, e.g. `"Forbidden"`.
    pub error: String,
    pub message: String,
}

/// Plain acknowledgement for operations with nothing to return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// =============================================================================
// STAGE REQUESTS
// =============================================================================

fn default_true() -> bool {
    true
}

/// `POST /pipeline-stages`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStageRequest {
    pub name: String,
    /// Omit to append after the last active stage.
    #[serde(default)]
    pub order_index: Option<i64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl From<CreateStageRequest> for NewStage {
    fn from(request: CreateStageRequest) -> Self {
        NewStage {
            name: request.name,
            order_index: request.order_index,
            is_active: request.is_active,
        }
    }
}

/// `PUT /pipeline-stages/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateStageRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub order_index: Option<i64>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl From<UpdateStageRequest> for StagePatch {
    fn from(request: UpdateStageRequest) -> Self {
        StagePatch {
            name: request.name,
            order_index: request.order_index,
            is_active: request.is_active,
        }
    }
}

/// `PUT /pipeline-stages/order`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderStagesRequest {
    /// Every active stage id, in the desired order.
    pub stage_ids: Vec<u64>,
}

impl ReorderStagesRequest {
    #[must_use]
    pub fn ordered_ids(&self) -> Vec<StageId> {
        self.stage_ids.iter().copied().map(StageId).collect()
    }
}

// =============================================================================
// DEAL REQUESTS
// =============================================================================

/// `POST /deals`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateDealRequest {
    /// Omit to enter the pipeline at the first active stage.
    #[serde(default)]
    pub stage_id: Option<u64>,
    #[serde(default)]
    pub owner_user_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub value_cents: Option<i64>,
    #[serde(default)]
    pub probability: Option<u8>,
    #[serde(default)]
    pub expected_close_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl From<CreateDealRequest> for NewDeal {
    fn from(request: CreateDealRequest) -> Self {
        NewDeal {
            stage_id: request.stage_id.map(StageId),
            owner_user_id: request.owner_user_id.map(UserId),
            title: request.title,
            value_cents: request.value_cents,
            probability: request.probability,
            expected_close_date: request.expected_close_date,
            notes: request.notes,
        }
    }
}

/// `PUT /deals/{id}`
///
/// A body carrying only `stage_id` is a move; anything else is an update.
/// Omitted and `null` fields both leave the stored value as it is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDealRequest {
    #[serde(default)]
    pub stage_id: Option<u64>,
    #[serde(default)]
    pub owner_user_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub value_cents: Option<i64>,
    #[serde(default)]
    pub probability: Option<u8>,
    #[serde(default)]
    pub expected_close_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl From<UpdateDealRequest> for DealPatch {
    fn from(request: UpdateDealRequest) -> Self {
        DealPatch {
            stage_id: request.stage_id.map(StageId),
            owner_user_id: request.owner_user_id.map(UserId),
            title: request.title,
            value_cents: request.value_cents,
            probability: request.probability,
            expected_close_date: request.expected_close_date,
            notes: request.notes,
        }
    }
}

/// Query string of `GET /deals`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DealListQuery {
    #[serde(default)]
    pub stage_id: Option<u64>,
    /// Only deals whose stage is inactive.
    #[serde(default)]
    pub orphaned: bool,
}

// =============================================================================
// DEAL RESPONSE
// =============================================================================

/// A deal as returned on the wire, with its orphan status resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealJson {
    #[serde(flatten)]
    pub deal: Deal,
    /// True when the deal's stage has been deactivated.
    pub orphaned: bool,
}

impl DealJson {
    #[must_use]
    pub fn new(deal: Deal, active: &BTreeSet<StageId>) -> Self {
        let orphaned = !active.contains(&deal.stage_id);
        Self { deal, orphaned }
    }
}
