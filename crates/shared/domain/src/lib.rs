//! Domain layer - Storage-independent contracts for audited entities.
//!
//! This crate contains pure domain logic with no infrastructure dependencies.
//! The persistence layer builds its generic repository on top of the
//! `Auditable` contract defined here.

pub mod audit;
pub mod caller;
pub mod constants;
pub mod error;

pub use audit::{AuditStamp, Auditable};
pub use caller::Caller;
pub use constants::*;
pub use error::{DomainError, DomainResult};
