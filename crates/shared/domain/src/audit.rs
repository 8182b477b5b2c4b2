//! Audit metadata and the soft-delete contract.
//!
//! Every persisted entity carries the same audit block:
//! created-by/at, updated-by/at, deleted-by/at and a `deleted` flag.
//! An entity is either active (`deleted = false`, deleted-by/at unset) or
//! soft-deleted (`deleted = true`, deleted-by/at set). Nothing is ever
//! physically removed.

use chrono::{DateTime, SubsecRound, Utc};

use crate::caller::Caller;
use crate::constants::AUDIT_TIMESTAMP_PRECISION;

/// Who performed a write and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditStamp {
    pub by: String,
    pub at: DateTime<Utc>,
}

impl AuditStamp {
    /// Stamp for `caller` at the current time
    pub fn now(caller: &Caller) -> Self {
        Self::at(caller, Utc::now())
    }

    /// Stamp for `caller` at a fixed time (truncated to storage precision)
    pub fn at(caller: &Caller, at: DateTime<Utc>) -> Self {
        Self {
            by: caller.name().to_string(),
            at: at.trunc_subsecs(AUDIT_TIMESTAMP_PRECISION),
        }
    }
}

/// Capability contract for entities managed by the generic repository.
///
/// Implementors expose a numeric identifier, the soft-delete flag and
/// mutators for the audit block.
pub trait Auditable {
    /// Store-assigned identifier (zero until first saved)
    fn id(&self) -> i32;

    fn is_deleted(&self) -> bool;

    /// Whether deleted-by or deleted-at is set
    fn has_deletion_stamp(&self) -> bool;

    /// Stamp created-by/at and updated-by/at, and reset the entity to active.
    fn stamp_created(&mut self, stamp: &AuditStamp);

    /// Stamp updated-by/at only; created-by/at stay untouched.
    fn stamp_updated(&mut self, stamp: &AuditStamp);

    /// Stamp deleted-by/at and set the deleted flag.
    fn stamp_deleted(&mut self, stamp: &AuditStamp);
}
