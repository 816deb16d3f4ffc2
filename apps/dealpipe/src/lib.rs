//! # dealpipe
//!
//! The network-facing half of the deal pipeline service: the axum HTTP API,
//! identity resolution and runtime configuration. All pipeline rules live in
//! `dealpipe-core`; this crate only translates between HTTP and the core.

pub mod api;
pub mod config;
pub mod error;

pub use error::AppError;
