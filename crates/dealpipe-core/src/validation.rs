//! # Field Validation
//!
//! Pure checks applied to every payload before a write is attempted.
//! A payload either passes completely or nothing is persisted.

use crate::primitives::{
    MAX_NOTES_LENGTH, MAX_ORDER_INDEX, MAX_PROBABILITY, MAX_STAGE_NAME_LENGTH, MAX_TITLE_LENGTH,
    MIN_ORDER_INDEX,
};
use crate::{DealPatch, NewDeal, PipelineError, UserId};

/// Validate and normalize a stage name.
///
/// Returns the trimmed name. Empty or oversized names are rejected.
pub fn stage_name(raw: &str) -> Result<String, PipelineError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(PipelineError::InvalidField {
            field: "name",
            reason: "must not be empty".to_string(),
        });
    }
    if name.len() > MAX_STAGE_NAME_LENGTH {
        return Err(PipelineError::InvalidField {
            field: "name",
            reason: format!(
                "length {} exceeds maximum {} bytes",
                name.len(),
                MAX_STAGE_NAME_LENGTH
            ),
        });
    }
    Ok(name.to_string())
}

/// Case-insensitive comparison key for stage names.
#[must_use]
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// An explicitly requested stage position must lie in
/// `MIN_ORDER_INDEX..=MAX_ORDER_INDEX`.
pub fn order_index(value: Option<i64>) -> Result<(), PipelineError> {
    match value {
        Some(i) if !(MIN_ORDER_INDEX..=MAX_ORDER_INDEX).contains(&i) => {
            Err(PipelineError::InvalidField {
                field: "order_index",
                reason: format!(
                    "{} is outside {}..={}",
                    i, MIN_ORDER_INDEX, MAX_ORDER_INDEX
                ),
            })
        }
        _ => Ok(()),
    }
}

fn bounded(field: &'static str, value: Option<&str>, max: usize) -> Result<(), PipelineError> {
    match value {
        Some(v) if v.len() > max => Err(PipelineError::InvalidField {
            field,
            reason: format!("length {} exceeds maximum {} bytes", v.len(), max),
        }),
        _ => Ok(()),
    }
}

fn probability(value: Option<u8>) -> Result<(), PipelineError> {
    match value {
        Some(p) if p > MAX_PROBABILITY => Err(PipelineError::InvalidField {
            field: "probability",
            reason: format!("{} is outside 0..={}", p, MAX_PROBABILITY),
        }),
        _ => Ok(()),
    }
}

/// Validate the business fields of a new deal.
pub fn new_deal(deal: &NewDeal) -> Result<(), PipelineError> {
    bounded("title", deal.title.as_deref(), MAX_TITLE_LENGTH)?;
    bounded("notes", deal.notes.as_deref(), MAX_NOTES_LENGTH)?;
    probability(deal.probability)
}

/// Validate the business fields of a deal patch.
pub fn deal_patch(patch: &DealPatch) -> Result<(), PipelineError> {
    bounded("title", patch.title.as_deref(), MAX_TITLE_LENGTH)?;
    bounded("notes", patch.notes.as_deref(), MAX_NOTES_LENGTH)?;
    if let Some(owner) = &patch.owner_user_id {
        owner_id(owner)?;
    }
    probability(patch.probability)
}

/// An explicitly supplied owner must name someone.
pub fn owner_id(owner: &UserId) -> Result<(), PipelineError> {
    if owner.as_str().trim().is_empty() {
        return Err(PipelineError::InvalidField {
            field: "owner_user_id",
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}
