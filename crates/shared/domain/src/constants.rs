//! Domain-level constants.
//!
//! These constants define business rules and validation requirements.

// =============================================================================
// Caller identity
// =============================================================================

/// Identity used for audit stamping when no authenticated caller exists
pub const SYSTEM_CALLER: &str = "system";

/// Maximum length of a caller identity (matches the audit column width)
pub const MAX_CALLER_LENGTH: usize = 128;

// =============================================================================
// Validation
// =============================================================================

/// Maximum length of a display name (categories, products)
pub const MAX_NAME_LENGTH: u64 = 100;

/// Maximum length of a product SKU
pub const MAX_SKU_LENGTH: u64 = 32;

/// Maximum length of a free-text description
pub const MAX_DESCRIPTION_LENGTH: u64 = 500;

// =============================================================================
// Timestamps
// =============================================================================

/// Fractional-second digits kept on audit timestamps.
///
/// Postgres `timestamptz` stores microseconds; stamps are truncated so the
/// in-memory value round-trips exactly and can serve as a concurrency token.
pub const AUDIT_TIMESTAMP_PRECISION: u16 = 6;
