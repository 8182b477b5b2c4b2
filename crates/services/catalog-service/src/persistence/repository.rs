//! Generic repository over an entity kind.
//!
//! Reads always exclude soft-deleted rows. Writes stamp the audit block and
//! register the entity with the shared context; nothing is committed until
//! the owning unit of work saves.

use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use domain::{AuditStamp, Auditable, Caller};
use sea_orm::{ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Select};
use validator::Validate;

use super::context::{DbContext, Entry, EntryState};
use super::kind::{check_includes, AuditedEntity, EntityKind};
use super::projection::Projection;
use super::query::{Query, Tracking};
use common::{AppError, AppResult};

/// DTO produced by a kind's `read_dto` projection
pub type DtoOf<K> = <<K as EntityKind>::Dto as Projection<<K as EntityKind>::Entity>>::Output;

/// DTO produced by a kind's `search_dto` projection
pub type SearchDtoOf<K> =
    <<K as EntityKind>::SearchDto as Projection<<K as EntityKind>::Entity>>::Output;

/// Create/search/read/update/delete for one entity kind.
///
/// Holds only a weak reference to the unit of work's context.
pub struct Repository<K: EntityKind> {
    context: Weak<DbContext>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: EntityKind> Repository<K> {
    pub(crate) fn new(context: Weak<DbContext>) -> Self {
        Self {
            context,
            _kind: PhantomData,
        }
    }

    fn context(&self) -> AppResult<Arc<DbContext>> {
        let context = self.context.upgrade().ok_or(AppError::ContextDisposed)?;
        if context.is_released() {
            return Err(AppError::ContextDisposed);
        }
        Ok(context)
    }

    /// Active rows of this kind, in identifier order
    fn active() -> Select<K::Entity> {
        K::Entity::find()
            .filter(K::Entity::deleted_column().eq(false))
            .order_by_asc(K::Entity::id_column())
    }

    fn filtered(criteria: Option<&K::Criteria>) -> AppResult<Select<K::Entity>> {
        match criteria {
            Some(criteria) => {
                criteria.validate()?;
                Ok(K::filter(Self::active(), criteria))
            }
            None => Ok(Self::active()),
        }
    }

    /// New untracked entity with kind-specific defaults.
    pub async fn create(&self) -> AppResult<K::Model> {
        let connection = self.context()?.connection()?;
        K::create(&connection).await
    }

    /// Lazily-evaluated query over active entities matching `criteria`.
    ///
    /// Criteria and include paths are validated here, before any store
    /// interaction.
    pub fn search(
        &self,
        criteria: Option<&K::Criteria>,
        tracking: Tracking,
        include: &[&str],
    ) -> AppResult<Query<K>> {
        let context = self.context()?;
        let include = check_includes::<K>(include)?;
        let select = Self::filtered(criteria)?;

        Ok(Query::new(context, select, tracking, include))
    }

    /// Search projected through the kind's search DTO.
    ///
    /// Executes immediately. No match yields an empty vector.
    pub async fn search_dto(
        &self,
        criteria: Option<&K::Criteria>,
    ) -> AppResult<Vec<SearchDtoOf<K>>> {
        let connection = self.context()?.connection()?;
        let select = Self::filtered(criteria)?;

        K::SearchDto::project(select)
            .all(&connection)
            .await
            .map_err(Into::into)
    }

    /// Active entity with `id`, or `None`.
    pub async fn read(
        &self,
        id: i32,
        tracking: Tracking,
        include: &[&str],
    ) -> AppResult<Option<K::Model>> {
        self.search(None, tracking, include)?
            .filter(K::Entity::id_column().eq(id))
            .one()
            .await
    }

    /// DTO of the active entity with `id`, or `None`.
    pub async fn read_dto(&self, id: i32) -> AppResult<Option<DtoOf<K>>> {
        let connection = self.context()?.connection()?;
        let select = Self::active().filter(K::Entity::id_column().eq(id));

        K::Dto::project(select)
            .one(&connection)
            .await
            .map_err(Into::into)
    }

    /// Direct lookup that ignores the soft-delete flag.
    ///
    /// Intended for maintenance tooling; never tracked.
    pub async fn find_including_deleted(&self, id: i32) -> AppResult<Option<K::Model>> {
        let connection = self.context()?.connection()?;
        K::Entity::find()
            .filter(K::Entity::id_column().eq(id))
            .one(&connection)
            .await
            .map_err(Into::into)
    }

    /// Stamp created/updated fields and register `model` for insert.
    pub fn insert(&self, mut model: K::Model, caller: &Caller) -> AppResult<Entry<K>> {
        let context = self.context()?;
        K::validate(&model)?;

        model.stamp_created(&AuditStamp::now(caller));
        context.track_added::<K>(model)
    }

    /// Stamp updated fields and register `model` for update.
    ///
    /// A detached entity is attached as modified; an already tracked one
    /// just takes the new values.
    pub fn update(&self, mut model: K::Model, caller: &Caller) -> AppResult<Entry<K>> {
        let context = self.context()?;
        Self::require_active(&model)?;
        K::validate(&model)?;

        let token = model.get(K::Entity::updated_at_column());
        model.stamp_updated(&AuditStamp::now(caller));
        context.track_modified::<K>(model, token, EntryState::Modified)
    }

    /// Soft delete: stamp deleted fields and set the deleted flag.
    ///
    /// There is no physical delete.
    pub fn delete(&self, mut model: K::Model, caller: &Caller) -> AppResult<Entry<K>> {
        let context = self.context()?;
        Self::require_active(&model)?;

        let token = model.get(K::Entity::updated_at_column());
        model.stamp_deleted(&AuditStamp::now(caller));
        context.track_modified::<K>(model, token, EntryState::Deleted)
    }

    /// Current tracked values behind `entry`
    pub fn current(&self, entry: &Entry<K>) -> AppResult<Option<K::Model>> {
        self.context()?.current(entry)
    }

    /// Update and delete only apply to saved, active entities.
    fn require_active(model: &K::Model) -> AppResult<()> {
        if model.id() <= 0 {
            return Err(AppError::validation(format!(
                "{} has not been saved yet",
                K::NAME
            )));
        }
        if model.is_deleted() {
            return Err(AppError::validation(format!(
                "{} {} is deleted",
                K::NAME,
                model.id()
            )));
        }
        if model.has_deletion_stamp() {
            return Err(AppError::validation(format!(
                "{} {} carries deletion stamps but is not deleted",
                K::NAME,
                model.id()
            )));
        }
        Ok(())
    }
}

impl<K: EntityKind> std::fmt::Debug for Repository<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").field("kind", &K::NAME).finish()
    }
}
