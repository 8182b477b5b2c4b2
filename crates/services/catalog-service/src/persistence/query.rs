//! Lazily-evaluated entity queries returned by `Repository::search`.

use std::sync::Arc;

use sea_orm::sea_query::IntoCondition;
use domain::Auditable;
use sea_orm::{DatabaseConnection, PaginatorTrait, QueryFilter, Select};

use super::context::DbContext;
use super::kind::EntityKind;
use common::{AppError, AppResult, PaginationParams};

/// Whether loaded entities are registered with the change tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tracking {
    /// Track results so later updates write only changed columns
    #[default]
    Tracked,
    /// Read-only results; nothing is registered with the context
    NoTracking,
}

/// A composable query over active entities of kind `K`.
///
/// Nothing touches the store until `all`, `one`, `count` or `paginate`.
pub struct Query<K: EntityKind> {
    context: Arc<DbContext>,
    select: Select<K::Entity>,
    tracking: Tracking,
    include: Vec<String>,
}

impl<K: EntityKind> Query<K> {
    pub(crate) fn new(
        context: Arc<DbContext>,
        select: Select<K::Entity>,
        tracking: Tracking,
        include: Vec<String>,
    ) -> Self {
        Self {
            context,
            select,
            tracking,
            include,
        }
    }

    /// Add a further condition
    pub fn filter<F: IntoCondition>(mut self, condition: F) -> Self {
        self.select = self.select.filter(condition);
        self
    }

    /// Apply an arbitrary transformation (ordering, limits, joins)
    pub fn compose<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Select<K::Entity>) -> Select<K::Entity>,
    {
        self.select = f(self.select);
        self
    }

    /// Execute and return every matching entity
    pub async fn all(self) -> AppResult<Vec<K::Model>> {
        let connection = self.context.connection()?;
        let models = self
            .select
            .all(&connection)
            .await
            .map_err(AppError::from)?;

        finish::<K>(&self.context, &connection, models, self.tracking, &self.include).await
    }

    /// Execute and return the first matching entity, if any
    pub async fn one(self) -> AppResult<Option<K::Model>> {
        let connection = self.context.connection()?;
        let model = self
            .select
            .one(&connection)
            .await
            .map_err(AppError::from)?;

        let models = finish::<K>(
            &self.context,
            &connection,
            model.into_iter().collect(),
            self.tracking,
            &self.include,
        )
        .await?;

        Ok(models.into_iter().next())
    }

    /// Count matching entities
    pub async fn count(self) -> AppResult<u64> {
        let connection = self.context.connection()?;
        self.select
            .paginate(&connection, 1)
            .num_items()
            .await
            .map_err(Into::into)
    }

    /// Fetch one page of matching entities together with the total count
    pub async fn paginate(self, params: &PaginationParams) -> AppResult<(Vec<K::Model>, u64)> {
        let connection = self.context.connection()?;
        let paginator = self.select.paginate(&connection, params.limit());
        let total = paginator.num_items().await?;
        let models = paginator.fetch_page(params.page_index()).await?;

        let models =
            finish::<K>(&self.context, &connection, models, self.tracking, &self.include).await?;
        Ok((models, total))
    }
}

/// Resolve against the tracker, then eager-load requested related fields.
///
/// A tracked entity with a pending delete is dropped from the results even
/// though its row is still active in the store.
async fn finish<K: EntityKind>(
    context: &DbContext,
    connection: &DatabaseConnection,
    models: Vec<K::Model>,
    tracking: Tracking,
    include: &[String],
) -> AppResult<Vec<K::Model>> {
    let mut models = match tracking {
        Tracking::Tracked => context
            .resolve::<K>(models)?
            .into_iter()
            .filter(|model| !model.is_deleted())
            .collect(),
        Tracking::NoTracking => models,
    };

    if !models.is_empty() {
        for path in include {
            K::include(&mut models, path, connection).await?;
        }
    }

    Ok(models)
}
