//! Unified error handling for the data-access layer.
//!
//! Provides a single error type surfaced by repositories and the unit of
//! work. Absence of an entity is not an error at this layer (reads return
//! `Ok(None)`); `NotFound` exists for callers that want to convert.

use domain::DomainError;
use thiserror::Error;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    // Resource errors
    #[error("Resource not found")]
    NotFound,

    // Validation
    #[error("{0}")]
    Validation(String),

    /// The row was modified by another request since it was loaded
    #[error("{entity} {id} was modified by another request")]
    ConcurrencyConflict { entity: &'static str, id: i32 },

    // Store errors
    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// The unit of work owning this context was already disposed
    #[error("Persistence context has been disposed")]
    ContextDisposed,

    // Internal
    #[error("Internal error")]
    Internal(String),
}

impl AppError {
    /// Get stable error code for callers and logs
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            #[cfg(feature = "database")]
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::ContextDisposed => "CONTEXT_DISPOSED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying the whole request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrencyConflict { .. })
    }

    /// Get user-facing message (hides internal details)
    pub fn user_message(&self) -> String {
        match self {
            // Show full message for client errors
            AppError::Validation(msg) => msg.clone(),
            AppError::ConcurrencyConflict { .. } => self.to_string(),

            // Hide details for internal errors
            #[cfg(feature = "database")]
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "A database error occurred".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }

            // Use default message for others
            _ => self.to_string(),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::Validation(msg),
            DomainError::NotFound(_) => AppError::NotFound,
            DomainError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;

/// Extension trait for Option -> AppError conversion
pub trait OptionExt<T> {
    fn ok_or_not_found(self) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self) -> AppResult<T> {
        self.ok_or(AppError::NotFound)
    }
}

/// Convenience constructors
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    pub fn concurrency_conflict(entity: &'static str, id: i32) -> Self {
        AppError::ConcurrencyConflict { entity, id }
    }
}
