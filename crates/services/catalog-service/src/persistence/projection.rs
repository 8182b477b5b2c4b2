//! DTO projections.
//!
//! A projection rewrites an entity query into a reduced-shape select that is
//! executed by the store (`SELECT` list and joins), never mapped after
//! materialization. Navigation fields are not loaded by a projection; any
//! related data it needs is joined into the same statement.

use sea_orm::{EntityTrait, FromQueryResult, Select, SelectModel, Selector};

/// Entity-to-DTO mapping for entity `E`.
pub trait Projection<E: EntityTrait>: Send + Sync + 'static {
    type Output: FromQueryResult + Send + Sync;

    fn project(query: Select<E>) -> Selector<SelectModel<Self::Output>>;
}

/// Projection that keeps the entity shape.
///
/// Owned columns are returned verbatim; navigation fields keep their
/// default (unset) value.
pub struct Identity;

impl<E> Projection<E> for Identity
where
    E: EntityTrait,
    E::Model: Send + Sync,
{
    type Output = E::Model;

    fn project(query: Select<E>) -> Selector<SelectModel<Self::Output>> {
        query.into_model::<E::Model>()
    }
}
