//! Common utilities shared across the workspace.
//!
//! This crate provides:
//! - Unified error handling for the persistence layer and its callers
//! - Configuration structures
//! - Pagination parameters

pub mod config;
pub mod error;
pub mod pagination;

pub use config::*;
pub use error::{AppError, AppResult, OptionExt};
pub use pagination::PaginationParams;
