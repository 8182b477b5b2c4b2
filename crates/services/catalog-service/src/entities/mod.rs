//! SeaORM entities.
//!
//! Every table carries the same audit block (created/updated/deleted stamps
//! and the soft-delete flag). Navigation fields are `#[sea_orm(ignore)]` and
//! only populated through repository includes.

pub mod category;
pub mod product;
