//! Unit of Work pattern implementation.
//!
//! The Unit of Work:
//! - Owns one persistence context for the lifetime of a request
//! - Hands out one repository per entity kind, created on first access
//! - Commits every pending change in a single transaction on `save`
//! - Releases the context exactly once on `dispose` (or drop)

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::Serialize;
use uuid::Uuid;

use super::context::{DbContext, EntryState};
use super::kind::EntityKind;
use super::repository::Repository;
use crate::catalog::{Categories, Products};
use common::{AppError, AppResult};

/// Counts of rows written by one `save`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl SaveSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }

    fn record(&mut self, state: EntryState) {
        match state {
            EntryState::Added => self.inserted += 1,
            EntryState::Modified => self.updated += 1,
            EntryState::Deleted => self.deleted += 1,
            EntryState::Unchanged => {}
        }
    }
}

/// One transactional scope over a shared persistence context.
///
/// Created at request start and disposed at request end. All repositories
/// obtained from it observe the same tracked entities.
pub struct UnitOfWork {
    context: Arc<DbContext>,
    repositories: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl UnitOfWork {
    /// Open a unit of work over `connection`. Nothing is loaded yet.
    pub fn begin(connection: DatabaseConnection) -> Self {
        let context = Arc::new(DbContext::open(connection));
        tracing::debug!(uow = %context.id(), "Unit of work opened");

        Self {
            context,
            repositories: Mutex::new(HashMap::new()),
        }
    }

    /// Identifier used to correlate log events
    pub fn id(&self) -> Uuid {
        self.context.id()
    }

    /// The shared persistence context
    pub fn context(&self) -> &DbContext {
        &self.context
    }

    /// Repository for kind `K`, constructed on first access and cached for
    /// the remaining lifetime of this unit of work.
    pub fn repository<K: EntityKind>(&self) -> Arc<Repository<K>> {
        let mut repositories = self
            .repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(cached) = repositories.get(&TypeId::of::<K>()) {
            if let Ok(repository) = cached.clone().downcast::<Repository<K>>() {
                return repository;
            }
        }

        tracing::debug!(uow = %self.id(), kind = K::NAME, "Repository created");
        let repository = Arc::new(Repository::<K>::new(Arc::downgrade(&self.context)));
        repositories.insert(TypeId::of::<K>(), repository.clone());
        repository
    }

    /// Category repository
    pub fn categories(&self) -> Arc<Repository<Categories>> {
        self.repository::<Categories>()
    }

    /// Product repository
    pub fn products(&self) -> Arc<Repository<Products>> {
        self.repository::<Products>()
    }

    /// Whether any insert, update or delete is waiting for `save`
    pub fn has_changes(&self) -> bool {
        self.context.pending_count() > 0
    }

    /// Commit every pending change atomically.
    ///
    /// On failure the transaction is rolled back and all changes stay
    /// pending, so the caller may retry or discard them. Calling this with
    /// nothing pending is a no-op.
    pub async fn save(&self) -> AppResult<SaveSummary> {
        let writes = self.context.pending_writes()?;
        if writes.is_empty() {
            tracing::debug!(uow = %self.id(), "Nothing to save");
            return Ok(SaveSummary::default());
        }

        let connection = self.context.connection()?;
        let txn = connection.begin().await.map_err(AppError::from)?;

        let mut summary = SaveSummary::default();
        let mut saved = Vec::with_capacity(writes.len());

        for (index, write) in writes {
            let state = write.state();
            let entity = write.entity();

            match write.execute(&txn).await {
                Ok(row) => {
                    summary.record(state);
                    saved.push((index, row));
                }
                Err(err) => {
                    tracing::error!(
                        uow = %self.id(),
                        entity,
                        code = err.code(),
                        "Save failed: {}",
                        err
                    );
                    // Rollback on error; pending changes are left untouched
                    if let Err(rollback_err) = txn.rollback().await {
                        tracing::error!("Transaction rollback failed: {}", rollback_err);
                    }
                    return Err(err);
                }
            }
        }

        txn.commit().await.map_err(AppError::from)?;
        self.accept_committed(saved)?;

        tracing::info!(
            uow = %self.id(),
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            "Changes saved"
        );

        Ok(summary)
    }

    /// Fold committed rows back into the tracker.
    ///
    /// The batch is already durable, so a context released while the
    /// transaction was in flight is logged rather than reported as a failure.
    fn accept_committed(&self, saved: Vec<(usize, Box<dyn Any + Send>)>) -> AppResult<()> {
        match self.context.accept(saved) {
            Err(AppError::ContextDisposed) => {
                tracing::warn!(
                    uow = %self.id(),
                    "Context released during save; committed rows not applied to tracker"
                );
                Ok(())
            }
            result => result,
        }
    }

    /// Release the context and its store handle.
    ///
    /// Idempotent: returns `true` only on the call that released it.
    pub fn dispose(&self) -> bool {
        let released = self.context.release();
        if released {
            self.repositories
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
            tracing::debug!(uow = %self.id(), "Unit of work disposed");
        }
        released
    }

    pub fn is_disposed(&self) -> bool {
        self.context.is_released()
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("context", &self.context)
            .finish()
    }
}
