//! Entity-kind contract for the generic repository.
//!
//! A kind binds a SeaORM entity to its search criteria, its DTO projections
//! and its override points (defaults, filtering, validation, includes).
//! Concrete kinds customise behavior by overriding the provided methods
//! instead of subclassing a base repository.

use async_trait::async_trait;
use domain::Auditable;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, DatabaseConnection, EntityTrait, FromQueryResult,
    IntoActiveModel, ModelTrait, Select,
};
use validator::Validate;

use super::projection::Projection;
use common::{AppError, AppResult};

/// Column accessors every audited entity provides.
///
/// The repository uses these to apply the soft-delete filter, to look up by
/// identifier and to guard updates with the concurrency token.
pub trait AuditedEntity: EntityTrait {
    fn id_column() -> Self::Column;

    fn deleted_column() -> Self::Column;

    /// Column compared against the concurrency token on update
    fn updated_at_column() -> Self::Column;
}

/// One kind of entity managed through a `Repository`.
#[async_trait]
pub trait EntityKind: Send + Sync + Sized + 'static {
    type Entity: AuditedEntity + EntityTrait<Model = Self::Model>;
    type Model: ModelTrait<Entity = Self::Entity>
        + FromQueryResult
        + IntoActiveModel<Self::ActiveModel>
        + Auditable
        + Default
        + Clone
        + Send
        + Sync
        + 'static;
    type ActiveModel: ActiveModelTrait<Entity = Self::Entity> + ActiveModelBehavior + Send + 'static;

    /// Filter structure accepted by `search` and `search_dto`
    type Criteria: Validate + Send + Sync;

    /// Projection used by `read_dto`
    type Dto: Projection<Self::Entity>;

    /// Projection used by `search_dto`
    type SearchDto: Projection<Self::Entity>;

    /// Name used in logs and error messages
    const NAME: &'static str;

    /// Related-field paths accepted by `include`
    const INCLUDES: &'static [&'static str] = &[];

    /// New untracked entity populated with kind-specific defaults.
    async fn create(_db: &DatabaseConnection) -> AppResult<Self::Model> {
        Ok(Self::Model::default())
    }

    /// Narrow `query` by `criteria`. Default applies no filtering.
    fn filter(query: Select<Self::Entity>, _criteria: &Self::Criteria) -> Select<Self::Entity> {
        query
    }

    /// Structural checks run before an entity is registered for writing.
    fn validate(_model: &Self::Model) -> AppResult<()> {
        Ok(())
    }

    /// Eager-load the related field named by `path` into `models`.
    ///
    /// Only called with paths listed in `INCLUDES`.
    async fn include(
        _models: &mut [Self::Model],
        path: &str,
        _db: &DatabaseConnection,
    ) -> AppResult<()> {
        Err(AppError::validation(format!(
            "{} has no related field '{}'",
            Self::NAME,
            path
        )))
    }
}

/// Check requested include paths against the kind's declared list.
pub(crate) fn check_includes<K: EntityKind>(include: &[&str]) -> AppResult<Vec<String>> {
    include
        .iter()
        .map(|path| {
            if K::INCLUDES.contains(path) {
                Ok((*path).to_string())
            } else {
                Err(AppError::validation(format!(
                    "{} has no related field '{}'",
                    K::NAME,
                    path
                )))
            }
        })
        .collect()
}

/// Implement `AuditedEntity` and `Auditable` for an entity module whose
/// `Model` carries the standard audit columns.
///
/// Invoke inside the module that defines `Entity`, `Model` and `Column`.
#[macro_export]
macro_rules! audited_entity {
    () => {
        impl $crate::persistence::AuditedEntity for Entity {
            fn id_column() -> Column {
                Column::Id
            }

            fn deleted_column() -> Column {
                Column::Deleted
            }

            fn updated_at_column() -> Column {
                Column::UpdatedAt
            }
        }

        impl ::domain::Auditable for Model {
            fn id(&self) -> i32 {
                self.id
            }

            fn is_deleted(&self) -> bool {
                self.deleted
            }

            fn has_deletion_stamp(&self) -> bool {
                self.deleted_by.is_some() || self.deleted_at.is_some()
            }

            fn stamp_created(&mut self, stamp: &::domain::AuditStamp) {
                self.created_by = stamp.by.clone();
                self.created_at = stamp.at;
                self.updated_by = stamp.by.clone();
                self.updated_at = stamp.at;
                self.deleted = false;
                self.deleted_by = None;
                self.deleted_at = None;
            }

            fn stamp_updated(&mut self, stamp: &::domain::AuditStamp) {
                self.updated_by = stamp.by.clone();
                self.updated_at = stamp.at;
            }

            fn stamp_deleted(&mut self, stamp: &::domain::AuditStamp) {
                self.deleted = true;
                self.deleted_by = Some(stamp.by.clone());
                self.deleted_at = Some(stamp.at);
            }
        }
    };
}
