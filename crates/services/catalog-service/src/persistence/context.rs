//! Persistence context: one store handle plus a change tracker.
//!
//! SeaORM executes statements immediately and keeps no identity map, so the
//! context records pending writes itself:
//! - Entities loaded by tracking queries are kept with a snapshot and only
//!   their changed columns are written back.
//! - Entities arriving detached are written back in full.
//! - Every update is guarded by the `updated_at` value the entity carried
//!   when it was attached or loaded (optimistic concurrency).
//!
//! Nothing reaches the store until the owning unit of work saves.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use domain::Auditable;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    IntoActiveModel, Iterable, ModelTrait, QueryFilter, Value,
};
use uuid::Uuid;

use super::kind::{AuditedEntity, EntityKind};
use common::{AppError, AppResult};

/// Lifecycle state of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Matches the store as of the last load or save
    Unchanged,
    /// Pending insert
    Added,
    /// Pending update
    Modified,
    /// Pending soft delete (written as an update)
    Deleted,
}

impl EntryState {
    /// State after another write is registered against an existing entry.
    fn then(self, next: EntryState) -> EntryState {
        match (self, next) {
            (EntryState::Added, _) => EntryState::Added,
            (EntryState::Deleted, _) | (_, EntryState::Deleted) => EntryState::Deleted,
            _ => EntryState::Modified,
        }
    }
}

/// Handle to an entity registered with a context.
///
/// Returned by insert/update/delete. After a save it resolves to the stored
/// values, including the identifier assigned on insert.
pub struct Entry<K> {
    index: usize,
    context: Uuid,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for Entry<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Entry<K> {}

impl<K> std::fmt::Debug for Entry<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("index", &self.index)
            .field("context", &self.context)
            .finish()
    }
}

type TrackingKey = (TypeId, i32);

/// Type-erased tracked entity.
trait TrackedEntry: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn state(&self) -> EntryState;

    fn pending_write(&self) -> Option<Box<dyn PendingWrite>>;

    /// Apply the stored row returned by a committed write.
    fn accept(&mut self, saved: Box<dyn Any + Send>) -> Option<TrackingKey>;
}

struct Slot<K: EntityKind> {
    state: EntryState,
    current: K::Model,
    /// Values as last seen in the store; `None` for detached or added entities
    original: Option<K::Model>,
    /// `updated_at` the store is expected to hold; `None` for inserts
    token: Option<Value>,
}

impl<K: EntityKind> Slot<K> {
    fn key(&self) -> TrackingKey {
        (TypeId::of::<K>(), self.current.id())
    }
}

impl<K: EntityKind> TrackedEntry for Slot<K> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn state(&self) -> EntryState {
        self.state
    }

    fn pending_write(&self) -> Option<Box<dyn PendingWrite>> {
        if self.state == EntryState::Unchanged {
            return None;
        }

        Some(Box::new(Write::<K> {
            state: self.state,
            current: self.current.clone(),
            original: self.original.clone(),
            token: self.token.clone(),
        }))
    }

    fn accept(&mut self, saved: Box<dyn Any + Send>) -> Option<TrackingKey> {
        let saved = *saved.downcast::<K::Model>().ok()?;

        self.token = Some(saved.get(K::Entity::updated_at_column()));
        self.original = Some(saved.clone());
        self.current = saved;
        self.state = EntryState::Unchanged;

        Some(self.key())
    }
}

/// A write captured from a tracked entry, executed inside the save transaction.
#[async_trait]
pub(crate) trait PendingWrite: Send {
    fn state(&self) -> EntryState;

    fn entity(&self) -> &'static str;

    /// Execute against `txn` and return the stored row.
    async fn execute(self: Box<Self>, txn: &DatabaseTransaction) -> AppResult<Box<dyn Any + Send>>;
}

struct Write<K: EntityKind> {
    state: EntryState,
    current: K::Model,
    original: Option<K::Model>,
    token: Option<Value>,
}

#[async_trait]
impl<K: EntityKind> PendingWrite for Write<K> {
    fn state(&self) -> EntryState {
        self.state
    }

    fn entity(&self) -> &'static str {
        K::NAME
    }

    async fn execute(self: Box<Self>, txn: &DatabaseTransaction) -> AppResult<Box<dyn Any + Send>> {
        let saved: K::Model = match self.state {
            EntryState::Added => {
                let (mut active, _) = assign_columns::<K>(&self.current, None);
                active.not_set(K::Entity::id_column());
                active.insert(txn).await?
            }
            EntryState::Modified | EntryState::Deleted => {
                let id = self.current.id();
                let (active, changed) = assign_columns::<K>(&self.current, self.original.as_ref());
                if changed == 0 {
                    return Ok(Box::new(self.current));
                }

                let mut update = <K::Entity as EntityTrait>::update(active);
                if let Some(token) = self.token {
                    update = update.filter(K::Entity::updated_at_column().eq(token));
                }

                match update.exec(txn).await {
                    Ok(model) => model,
                    Err(DbErr::RecordNotUpdated) => {
                        return Err(AppError::concurrency_conflict(K::NAME, id));
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            EntryState::Unchanged => self.current,
        };

        Ok(Box::new(saved))
    }
}

/// Build the active model to write for `current`.
///
/// With a snapshot only differing columns are set; without one every column
/// is set. Returns the number of columns set.
fn assign_columns<K: EntityKind>(
    current: &K::Model,
    original: Option<&K::Model>,
) -> (K::ActiveModel, usize) {
    let mut changed = 0;

    let active = match original {
        Some(original) => {
            let mut active = original.clone().into_active_model();
            for column in <K::Entity as EntityTrait>::Column::iter() {
                let value = current.get(column);
                if value != original.get(column) {
                    active.set(column, value);
                    changed += 1;
                }
            }
            active
        }
        None => {
            let mut active = <K::ActiveModel as ActiveModelTrait>::default();
            for column in <K::Entity as EntityTrait>::Column::iter() {
                active.set(column, current.get(column));
                changed += 1;
            }
            active
        }
    };

    (active, changed)
}

#[derive(Default)]
struct ChangeTracker {
    entries: Vec<Box<dyn TrackedEntry>>,
    index: HashMap<TrackingKey, usize>,
}

impl ChangeTracker {
    fn push<K: EntityKind>(&mut self, slot: Slot<K>, indexed: bool) -> usize {
        let position = self.entries.len();
        if indexed {
            self.index.insert(slot.key(), position);
        }
        self.entries.push(Box::new(slot));
        position
    }

    fn position<K: EntityKind>(&self, id: i32) -> Option<usize> {
        self.index.get(&(TypeId::of::<K>(), id)).copied()
    }

    fn slot<K: EntityKind>(&self, position: usize) -> Option<&Slot<K>> {
        self.entries.get(position)?.as_any().downcast_ref::<Slot<K>>()
    }

    fn slot_mut<K: EntityKind>(&mut self, position: usize) -> Option<&mut Slot<K>> {
        self.entries
            .get_mut(position)?
            .as_any_mut()
            .downcast_mut::<Slot<K>>()
    }

    fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.state() != EntryState::Unchanged)
            .count()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

/// One store handle and the entities tracked against it.
///
/// Owned by a single unit of work; repositories hold only weak references.
pub struct DbContext {
    id: Uuid,
    released: AtomicBool,
    connection: Mutex<Option<DatabaseConnection>>,
    tracker: Mutex<ChangeTracker>,
}

impl DbContext {
    pub(crate) fn open(connection: DatabaseConnection) -> Self {
        Self {
            id: Uuid::new_v4(),
            released: AtomicBool::new(false),
            connection: Mutex::new(Some(connection)),
            tracker: Mutex::new(ChangeTracker::default()),
        }
    }

    /// Identifier used to correlate log events
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Store handle for query execution
    pub(crate) fn connection(&self) -> AppResult<DatabaseConnection> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(AppError::ContextDisposed)
    }

    fn tracker(&self) -> AppResult<MutexGuard<'_, ChangeTracker>> {
        if self.is_released() {
            return Err(AppError::ContextDisposed);
        }
        Ok(self.tracker.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn entry<K>(&self, index: usize) -> Entry<K> {
        Entry {
            index,
            context: self.id,
            _kind: PhantomData,
        }
    }

    /// Release the store handle and drop all tracked state.
    ///
    /// Returns `false` if the context was already released.
    pub(crate) fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }

        let connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
        let discarded = tracker.pending_count();
        if discarded > 0 {
            tracing::warn!(uow = %self.id, discarded, "Discarding unsaved changes");
        }
        tracker.clear();

        drop(connection);
        true
    }

    /// Register `model` as pending insert.
    pub(crate) fn track_added<K: EntityKind>(&self, model: K::Model) -> AppResult<Entry<K>> {
        let mut tracker = self.tracker()?;
        let index = tracker.push(
            Slot::<K> {
                state: EntryState::Added,
                current: model,
                original: None,
                token: None,
            },
            false,
        );
        Ok(self.entry(index))
    }

    /// Register `model` as pending update (or soft delete).
    ///
    /// If an entity with the same identifier is already tracked its values
    /// are replaced; otherwise the detached entity is attached with `token`
    /// as its concurrency token.
    pub(crate) fn track_modified<K: EntityKind>(
        &self,
        model: K::Model,
        token: Value,
        state: EntryState,
    ) -> AppResult<Entry<K>> {
        let mut tracker = self.tracker()?;

        if let Some(index) = tracker.position::<K>(model.id()) {
            if let Some(slot) = tracker.slot_mut::<K>(index) {
                slot.state = slot.state.then(state);
                slot.current = model;
                return Ok(self.entry(index));
            }
        }

        let index = tracker.push(
            Slot::<K> {
                state,
                current: model,
                original: None,
                token: Some(token),
            },
            true,
        );
        Ok(self.entry(index))
    }

    /// Start tracking freshly loaded rows.
    ///
    /// Rows already tracked resolve to the tracked values.
    pub(crate) fn resolve<K: EntityKind>(&self, loaded: Vec<K::Model>) -> AppResult<Vec<K::Model>> {
        let mut tracker = self.tracker()?;

        let resolved = loaded
            .into_iter()
            .map(|model| {
                let tracked = tracker
                    .position::<K>(model.id())
                    .and_then(|index| tracker.slot::<K>(index))
                    .map(|slot| slot.current.clone());

                match tracked {
                    Some(current) => current,
                    None => {
                        let token = model.get(K::Entity::updated_at_column());
                        tracker.push(
                            Slot::<K> {
                                state: EntryState::Unchanged,
                                current: model.clone(),
                                original: Some(model.clone()),
                                token: Some(token),
                            },
                            true,
                        );
                        model
                    }
                }
            })
            .collect();

        Ok(resolved)
    }

    /// Current values behind `entry`.
    pub(crate) fn current<K: EntityKind>(&self, entry: &Entry<K>) -> AppResult<Option<K::Model>> {
        self.check_owner(entry)?;
        let tracker = self.tracker()?;
        Ok(tracker.slot::<K>(entry.index).map(|slot| slot.current.clone()))
    }

    /// State of the entity behind `entry`.
    pub fn state<K: EntityKind>(&self, entry: &Entry<K>) -> AppResult<Option<EntryState>> {
        self.check_owner(entry)?;
        let tracker = self.tracker()?;
        Ok(tracker.slot::<K>(entry.index).map(|slot| slot.state))
    }

    /// Whether an entity of kind `K` with `id` is tracked.
    pub fn is_tracked<K: EntityKind>(&self, id: i32) -> bool {
        self.tracker()
            .map(|tracker| tracker.position::<K>(id).is_some())
            .unwrap_or(false)
    }

    pub fn pending_count(&self) -> usize {
        self.tracker()
            .map(|tracker| tracker.pending_count())
            .unwrap_or(0)
    }

    fn check_owner<K>(&self, entry: &Entry<K>) -> AppResult<()> {
        if entry.context != self.id {
            return Err(AppError::validation(
                "Entry belongs to a different unit of work",
            ));
        }
        Ok(())
    }

    /// Snapshot every pending write in registration order.
    pub(crate) fn pending_writes(&self) -> AppResult<Vec<(usize, Box<dyn PendingWrite>)>> {
        let tracker = self.tracker()?;
        Ok(tracker
            .entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.pending_write().map(|write| (index, write)))
            .collect())
    }

    /// Apply committed rows; their entries become unchanged.
    pub(crate) fn accept(&self, saved: Vec<(usize, Box<dyn Any + Send>)>) -> AppResult<()> {
        let mut tracker = self.tracker()?;

        for (index, row) in saved {
            let key = match tracker.entries.get_mut(index) {
                Some(entry) => entry.accept(row),
                None => None,
            };
            if let Some(key) = key {
                tracker.index.insert(key, index);
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for DbContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbContext")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Products;
    use crate::entities::product;
    use domain::{AuditStamp, Caller};

    fn context() -> DbContext {
        DbContext::open(DatabaseConnection::Disconnected)
    }

    fn stored_product(id: i32) -> product::Model {
        let mut model = product::Model {
            id,
            sku: format!("SKU-{}", id),
            name: "Widget".to_string(),
            price_cents: 1_000,
            ..Default::default()
        };
        model.stamp_created(&AuditStamp::now(&Caller::system()));
        model
    }

    fn token(model: &product::Model) -> Value {
        model.get(product::Column::UpdatedAt)
    }

    #[test]
    fn test_state_transitions() {
        assert_eq!(EntryState::Added.then(EntryState::Deleted), EntryState::Added);
        assert_eq!(EntryState::Unchanged.then(EntryState::Modified), EntryState::Modified);
        assert_eq!(EntryState::Modified.then(EntryState::Deleted), EntryState::Deleted);
        assert_eq!(EntryState::Deleted.then(EntryState::Modified), EntryState::Deleted);
    }

    #[test]
    fn test_detached_update_is_attached_once() {
        let ctx = context();
        let model = stored_product(5);

        let first = ctx
            .track_modified::<Products>(model.clone(), token(&model), EntryState::Modified)
            .unwrap();
        let second = ctx
            .track_modified::<Products>(model.clone(), token(&model), EntryState::Modified)
            .unwrap();

        assert_eq!(first.index, second.index);
        assert_eq!(ctx.pending_count(), 1);
        assert!(ctx.is_tracked::<Products>(5));
    }

    #[test]
    fn test_resolve_returns_tracked_values() {
        let ctx = context();
        let loaded = stored_product(9);
        ctx.resolve::<Products>(vec![loaded.clone()]).unwrap();

        let mut renamed = loaded.clone();
        renamed.name = "Renamed".to_string();
        ctx.track_modified::<Products>(renamed, token(&loaded), EntryState::Modified)
            .unwrap();

        let resolved = ctx.resolve::<Products>(vec![loaded]).unwrap();
        assert_eq!(resolved[0].name, "Renamed");
    }

    #[test]
    fn test_tracked_write_sets_only_changed_columns() {
        let original = stored_product(3);
        let mut current = original.clone();
        current.name = "Gadget".to_string();

        let (_, changed) = assign_columns::<Products>(&current, Some(&original));
        assert_eq!(changed, 1);

        let (_, all) = assign_columns::<Products>(&current, None);
        assert_eq!(all, product::Column::iter().count());
    }

    #[test]
    fn test_release_is_idempotent() {
        let ctx = context();
        ctx.track_added::<Products>(stored_product(0)).unwrap();

        assert!(ctx.release());
        assert!(!ctx.release());
        assert!(ctx.is_released());
        assert!(matches!(ctx.connection(), Err(AppError::ContextDisposed)));
        assert!(matches!(
            ctx.track_added::<Products>(stored_product(0)),
            Err(AppError::ContextDisposed)
        ));
    }

    #[test]
    fn test_entry_from_other_context_is_rejected() {
        let first = context();
        let second = context();
        let entry = first.track_added::<Products>(stored_product(0)).unwrap();

        assert!(matches!(second.current(&entry), Err(AppError::Validation(_))));
    }
}
