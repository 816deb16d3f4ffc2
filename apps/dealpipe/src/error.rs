//! # Application Errors
//!
//! Failures outside a single request: configuration, startup, CLI commands.
//! Per-request failures are rendered by `api::ApiError` instead.

use dealpipe_core::PipelineError;
use thiserror::Error;

/// Errors surfaced by the binary's commands and server startup.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
