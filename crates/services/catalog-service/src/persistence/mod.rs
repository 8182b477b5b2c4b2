//! Generic data-access layer: repositories over a shared, change-tracking
//! context, committed through a unit of work.

mod context;
mod kind;
mod projection;
mod query;
mod repository;
mod unit_of_work;

pub use context::{DbContext, Entry, EntryState};
pub use kind::{AuditedEntity, EntityKind};
pub use projection::{Identity, Projection};
pub use query::{Query, Tracking};
pub use repository::{DtoOf, Repository, SearchDtoOf};
pub use unit_of_work::{SaveSummary, UnitOfWork};
