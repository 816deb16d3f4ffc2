//! # API Endpoint Handlers
//!
//! Thin adapters: extract the caller and payload, call the core, wrap the
//! result. No pipeline rule is decided here.

use super::{
    AppState,
    auth::Caller,
    error::ApiError,
    types::{
        CreateDealRequest, CreateStageRequest, DealJson, DealListQuery, HealthResponse,
        MessageResponse, ReorderStagesRequest, UpdateDealRequest, UpdateStageRequest,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use dealpipe_core::{Deal, DealId, DealPatch, Stage, StageId};

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STAGE HANDLERS
// =============================================================================

/// `GET /pipeline-stages` - active stages in pipeline order.
pub async fn list_stages_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<Stage>>, ApiError> {
    Ok(Json(state.stages.list_active_stages()?))
}

/// `GET /pipeline-stages/all` - every stage, inactive ones included.
pub async fn list_all_stages_handler(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<Stage>>, ApiError> {
    Ok(Json(state.stages.list_all_stages(caller.identity())?))
}

/// `POST /pipeline-stages`
pub async fn create_stage_handler(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<CreateStageRequest>,
) -> Result<(StatusCode, Json<Stage>), ApiError> {
    let stage = state
        .stages
        .create_stage(caller.identity(), request.into())?;
    tracing::info!(stage_id = %stage.id, name = %stage.name, "Stage created");
    Ok((StatusCode::CREATED, Json(stage)))
}

/// `PUT /pipeline-stages/{id}`
pub async fn update_stage_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<u64>,
    Json(request): Json<UpdateStageRequest>,
) -> Result<Json<Stage>, ApiError> {
    let stage = state
        .stages
        .update_stage(caller.identity(), StageId(id), request.into())?;
    Ok(Json(stage))
}

/// `DELETE /pipeline-stages/{id}` - soft deactivation.
pub async fn deactivate_stage_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<u64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.stages.deactivate_stage(caller.identity(), StageId(id))?;
    tracing::info!(stage_id = id, "Stage deactivated");
    Ok(Json(MessageResponse::new(format!(
        "Stage {} deactivated",
        id
    ))))
}

/// `PUT /pipeline-stages/order`
pub async fn reorder_stages_handler(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<ReorderStagesRequest>,
) -> Result<Json<Vec<Stage>>, ApiError> {
    let stages = state
        .stages
        .reorder_stages(caller.identity(), &request.ordered_ids())?;
    Ok(Json(stages))
}

// =============================================================================
// DEAL HANDLERS
// =============================================================================

/// Attach orphan status to a deal.
fn deal_json(state: &AppState, deal: Deal) -> Result<DealJson, ApiError> {
    let active = state.stages.active_stage_ids()?;
    Ok(DealJson::new(deal, &active))
}

/// `POST /deals`
pub async fn create_deal_handler(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<CreateDealRequest>,
) -> Result<(StatusCode, Json<DealJson>), ApiError> {
    let deal = state.deals.create_deal(caller.identity(), request.into())?;
    tracing::info!(deal_id = %deal.id, stage_id = %deal.stage_id, "Deal created");
    Ok((StatusCode::CREATED, Json(deal_json(&state, deal)?)))
}

/// `GET /deals/{id}`
pub async fn get_deal_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<u64>,
) -> Result<Json<DealJson>, ApiError> {
    let deal = state.deals.get_deal(caller.identity(), DealId(id))?;
    Ok(Json(deal_json(&state, deal)?))
}

/// `PUT /deals/{id}` - a stage-only body moves the deal, anything else
/// updates it.
pub async fn update_deal_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<u64>,
    Json(request): Json<UpdateDealRequest>,
) -> Result<Json<DealJson>, ApiError> {
    let patch: DealPatch = request.into();
    let deal = match patch.stage_id {
        Some(target) if patch.is_stage_only() => {
            state.deals.move_deal(caller.identity(), DealId(id), target)?
        }
        _ => state.deals.update_deal(caller.identity(), DealId(id), patch)?,
    };
    Ok(Json(deal_json(&state, deal)?))
}

/// `DELETE /deals/{id}`
pub async fn delete_deal_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<u64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.deals.delete_deal(caller.identity(), DealId(id))?;
    tracing::info!(deal_id = id, "Deal deleted");
    Ok(Json(MessageResponse::new(format!("Deal {} deleted", id))))
}

/// `GET /deals[?stage_id=N][&orphaned=true]` - most recently updated first.
pub async fn list_deals_handler(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<DealListQuery>,
) -> Result<Json<Vec<DealJson>>, ApiError> {
    let identity = caller.identity();
    let deals = match query.stage_id {
        Some(stage) => state.deals.list_deals_by_stage(identity, StageId(stage))?,
        None if query.orphaned => state.deals.list_orphaned_deals(identity)?,
        None => state.deals.list_deals(identity)?,
    };

    let active = state.stages.active_stage_ids()?;
    let listed = deals
        .into_iter()
        .map(|deal| DealJson::new(deal, &active))
        .filter(|deal| !query.orphaned || deal.orphaned)
        .collect();
    Ok(Json(listed))
}
