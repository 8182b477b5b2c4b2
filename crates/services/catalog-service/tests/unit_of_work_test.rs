//! Unit of work integration tests (SQLite in-memory).

mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use catalog_service_lib::catalog::{Categories, CategoryCriteria, Products};
use catalog_service_lib::identity::IdentityProvider;
use catalog_service_lib::persistence::{EntryState, Repository, SaveSummary, Tracking};
use catalog_service_lib::with_unit_of_work;
use common::AppError;
use domain::Caller;
use mockall::mock;

use support::{caller, new_product, seed_category, seed_product, setup};

mock! {
    pub Identity {}

    impl IdentityProvider for Identity {
        fn current_caller(&self) -> Caller;
    }
}

#[tokio::test]
async fn test_insert_then_read_returns_stamped_entity() {
    let db = setup().await;
    let alice = caller("alice");

    let uow = db.unit_of_work();
    let products = uow.products();
    let entry = products
        .insert(new_product("SKU-1", "Widget", 1_250), &alice)
        .unwrap();
    assert_eq!(uow.context().state(&entry).unwrap(), Some(EntryState::Added));

    let summary = uow.save().await.unwrap();
    assert_eq!(summary.inserted, 1);

    let saved = products.current(&entry).unwrap().unwrap();
    assert!(saved.id > 0);
    assert_eq!(uow.context().state(&entry).unwrap(), Some(EntryState::Unchanged));
    uow.dispose();

    let reader = db.unit_of_work();
    let loaded = reader
        .products()
        .read(saved.id, Tracking::NoTracking, &[])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(loaded, saved);
    assert!(!loaded.deleted);
    assert_eq!(loaded.created_by, "alice");
    assert_eq!(loaded.updated_by, "alice");
    assert_eq!(loaded.created_at, saved.created_at);
    assert!(loaded.deleted_by.is_none());
}

#[tokio::test]
async fn test_soft_deleted_entity_is_hidden_but_persisted() {
    let db = setup().await;
    let saved = seed_product(&db, new_product("SKU-2", "Gadget", 900)).await;

    let uow = db.unit_of_work();
    let products = uow.products();
    let product = products
        .read(saved.id, Tracking::Tracked, &[])
        .await
        .unwrap()
        .unwrap();
    products.delete(product, &caller("remover")).unwrap();
    let summary = uow.save().await.unwrap();
    assert_eq!(summary.deleted, 1);
    uow.dispose();

    let reader = db.unit_of_work();
    let products = reader.products();
    assert!(products
        .read(saved.id, Tracking::NoTracking, &[])
        .await
        .unwrap()
        .is_none());
    assert!(products
        .search(None, Tracking::NoTracking, &[])
        .unwrap()
        .all()
        .await
        .unwrap()
        .is_empty());

    let raw = products
        .find_including_deleted(saved.id)
        .await
        .unwrap()
        .unwrap();
    assert!(raw.deleted);
    assert_eq!(raw.deleted_by.as_deref(), Some("remover"));
    assert!(raw.deleted_at.is_some());
    assert_eq!(raw.name, "Gadget");
}

#[tokio::test]
async fn test_detached_update_persists_supplied_changes() {
    let db = setup().await;
    let saved = seed_product(&db, new_product("SKU-3", "Bolt", 50)).await;

    tokio::time::sleep(Duration::from_millis(2)).await;

    // Arrives from outside the process: never loaded by this unit of work
    let mut detached = saved.clone();
    detached.name = "Hex Bolt".to_string();
    detached.price_cents = 75;

    let uow = db.unit_of_work();
    let products = uow.products();
    assert!(!uow.context().is_tracked::<Products>(saved.id));

    let entry = products.update(detached, &caller("editor")).unwrap();
    assert_eq!(uow.context().state(&entry).unwrap(), Some(EntryState::Modified));
    assert_eq!(uow.save().await.unwrap().updated, 1);
    uow.dispose();

    let reader = db.unit_of_work();
    let loaded = reader
        .products()
        .read(saved.id, Tracking::NoTracking, &[])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(loaded.name, "Hex Bolt");
    assert_eq!(loaded.price_cents, 75);
    assert_eq!(loaded.sku, "SKU-3");
    assert_eq!(loaded.updated_by, "editor");
    assert!(loaded.updated_at > saved.updated_at);
    assert_eq!(loaded.created_by, saved.created_by);
    assert_eq!(loaded.created_at, saved.created_at);
}

#[tokio::test]
async fn test_save_without_changes_is_noop() {
    let db = setup().await;
    seed_product(&db, new_product("SKU-4", "Nut", 10)).await;

    let uow = db.unit_of_work();
    uow.products()
        .search(None, Tracking::Tracked, &[])
        .unwrap()
        .all()
        .await
        .unwrap();

    assert!(!uow.has_changes());
    assert_eq!(uow.save().await.unwrap(), SaveSummary::default());
    assert_eq!(uow.save().await.unwrap(), SaveSummary::default());
}

#[tokio::test]
async fn test_dispose_twice_and_use_after_dispose() {
    let db = setup().await;
    let uow = db.unit_of_work();
    let products = uow.products();
    products
        .insert(new_product("SKU-5", "Washer", 5), &caller("alice"))
        .unwrap();

    assert!(uow.dispose());
    assert!(!uow.dispose());
    assert!(matches!(
        products.search(None, Tracking::Tracked, &[]),
        Err(AppError::ContextDisposed)
    ));
    assert!(matches!(uow.save().await, Err(AppError::ContextDisposed)));
}

#[tokio::test]
async fn test_end_to_end_insert_delete_search() {
    let db = setup().await;
    let alice = caller("alice");

    let uow = db.unit_of_work();
    let categories = uow.categories();

    let mut foo = categories.create().await.unwrap();
    foo.name = "Foo".to_string();
    let entry = categories.insert(foo, &alice).unwrap();
    uow.save().await.unwrap();
    let id = categories.current(&entry).unwrap().unwrap().id;

    let read = categories
        .read(id, Tracking::Tracked, &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read.created_by, "alice");
    assert!(!read.deleted);

    categories.delete(read, &alice).unwrap();
    uow.save().await.unwrap();

    assert!(categories
        .read(id, Tracking::Tracked, &[])
        .await
        .unwrap()
        .is_none());
    let listed = categories.search_dto(None).await.unwrap();
    assert!(listed.iter().all(|category| category.id != id));
}

#[tokio::test]
async fn test_concurrent_modification_is_rejected() {
    let db = setup().await;
    let saved = seed_product(&db, new_product("SKU-6", "Spring", 300)).await;

    let first = db.unit_of_work();
    let mut stale = first
        .products()
        .read(saved.id, Tracking::Tracked, &[])
        .await
        .unwrap()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(2)).await;

    let second = db.unit_of_work();
    let mut fresh = second
        .products()
        .read(saved.id, Tracking::Tracked, &[])
        .await
        .unwrap()
        .unwrap();
    fresh.price_cents = 350;
    second.products().update(fresh, &caller("bob")).unwrap();
    second.save().await.unwrap();
    second.dispose();

    stale.name = "Coil Spring".to_string();
    first.products().update(stale, &caller("alice")).unwrap();
    let err = first.save().await.unwrap_err();

    assert!(matches!(
        err,
        AppError::ConcurrencyConflict { entity: "product", id } if id == saved.id
    ));
    assert!(err.is_retryable());
    assert!(first.has_changes());
}

#[tokio::test]
async fn test_failed_save_rolls_back_and_keeps_changes_pending() {
    let db = setup().await;
    let existing = seed_product(&db, new_product("DUP", "Original", 100)).await;

    let uow = db.unit_of_work();
    let mut category = uow.categories().create().await.unwrap();
    category.name = "Fasteners".to_string();
    uow.categories().insert(category, &caller("alice")).unwrap();
    uow.products()
        .insert(new_product("DUP", "Duplicate", 200), &caller("alice"))
        .unwrap();

    let err = uow.save().await.unwrap_err();
    assert!(matches!(err, AppError::Database(_)));
    assert!(uow.has_changes());

    // Nothing from the failed batch reached the store
    let observer = db.unit_of_work();
    let criteria = CategoryCriteria::by_name("Fasteners");
    assert!(observer
        .categories()
        .search_dto(Some(&criteria))
        .await
        .unwrap()
        .is_empty());
    observer.dispose();

    // Free the SKU, then retry the same pending batch
    let fixer = db.unit_of_work();
    let mut original = fixer
        .products()
        .read(existing.id, Tracking::Tracked, &[])
        .await
        .unwrap()
        .unwrap();
    original.sku = "DUP-OLD".to_string();
    fixer.products().update(original, &caller("bob")).unwrap();
    fixer.save().await.unwrap();
    fixer.dispose();

    let summary = uow.save().await.unwrap();
    assert_eq!(summary.inserted, 2);
    assert!(!uow.has_changes());
}

#[tokio::test]
async fn test_repositories_share_one_context() {
    let db = setup().await;
    let tools = seed_category(&db, "Tools").await;

    let uow = db.unit_of_work();
    let mut category = uow
        .categories()
        .read(tools.id, Tracking::Tracked, &[])
        .await
        .unwrap()
        .unwrap();
    category.description = Some("Hand tools".to_string());
    uow.repository::<Categories>()
        .update(category, &caller("alice"))
        .unwrap();

    // A second lookup resolves to the tracked values, not the stored row
    let again = uow
        .categories()
        .read(tools.id, Tracking::Tracked, &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.description.as_deref(), Some("Hand tools"));
    assert_eq!(uow.context().pending_count(), 1);
}

#[tokio::test]
async fn test_with_unit_of_work_resolves_caller_once() {
    let db = setup().await;

    let mut identity = MockIdentity::new();
    identity
        .expect_current_caller()
        .times(1)
        .returning(|| Caller::new("carol").unwrap());

    let created = with_unit_of_work!(&db, &identity, |uow, caller| {
        let categories = uow.categories();
        let mut model = categories.create().await?;
        model.name = "Garden".to_string();
        let entry = categories.insert(model, caller)?;
        uow.save().await?;
        Ok(categories.current(&entry)?)
    })
    .unwrap()
    .unwrap();

    assert_eq!(created.created_by, "carol");
    assert_eq!(created.display_order, 1);
}

#[tokio::test]
async fn test_with_unit_of_work_disposes_on_error() {
    let db = setup().await;
    let identity = catalog_service_lib::identity::StaticIdentity::system();

    let leaked = with_unit_of_work!(&db, &identity, |uow, _caller| {
        Ok::<_, AppError>(uow.products())
    })
    .unwrap();
    assert!(matches!(
        leaked.read(1, Tracking::NoTracking, &[]).await,
        Err(AppError::ContextDisposed)
    ));

    let slot: Arc<Mutex<Option<Arc<Repository<Products>>>>> = Arc::new(Mutex::new(None));
    let handed_out = slot.clone();
    let failed: Result<(), AppError> = with_unit_of_work!(&db, &identity, |uow, caller| {
        let products = uow.products();
        *handed_out.lock().unwrap() = Some(products.clone());
        products.insert(new_product("", "Nameless", 1), caller)?;
        Ok(())
    });
    assert!(matches!(failed, Err(AppError::Validation(_))));

    let products = slot.lock().unwrap().take().unwrap();
    assert!(matches!(
        products.read(1, Tracking::NoTracking, &[]).await,
        Err(AppError::ContextDisposed)
    ));
    assert!(matches!(
        products.insert(new_product("LATE-1", "Late", 1), &caller("alice")),
        Err(AppError::ContextDisposed)
    ));
}

#[tokio::test]
async fn test_pending_delete_hides_tracked_entity() {
    let db = setup().await;
    let saved = seed_product(&db, new_product("SKU-7", "Clamp", 400)).await;

    let uow = db.unit_of_work();
    let products = uow.products();
    let product = products
        .read(saved.id, Tracking::Tracked, &[])
        .await
        .unwrap()
        .unwrap();
    products.delete(product, &caller("remover")).unwrap();

    // Not saved yet: the row is still active in the store
    assert!(uow.has_changes());
    assert!(products
        .read(saved.id, Tracking::Tracked, &[])
        .await
        .unwrap()
        .is_none());
    assert!(products
        .search(None, Tracking::Tracked, &[])
        .unwrap()
        .all()
        .await
        .unwrap()
        .is_empty());

    assert_eq!(uow.save().await.unwrap().deleted, 1);
}

#[tokio::test]
async fn test_update_rejects_active_entity_with_deletion_stamps() {
    let db = setup().await;
    let saved = seed_product(&db, new_product("SKU-8", "Vise", 2_200)).await;

    let mut forged = saved.clone();
    forged.name = "Bench vise".to_string();
    forged.deleted_by = Some("mallory".to_string());

    let uow = db.unit_of_work();
    let products = uow.products();
    assert!(matches!(
        products.update(forged, &caller("mallory")),
        Err(AppError::Validation(ref msg)) if msg.contains("deletion stamps")
    ));

    let mut forged = saved.clone();
    forged.deleted_at = Some(saved.updated_at);
    assert!(matches!(
        products.delete(forged, &caller("mallory")),
        Err(AppError::Validation(_))
    ));

    assert!(!uow.has_changes());
    assert_eq!(uow.save().await.unwrap(), SaveSummary::default());

    let stored = products
        .find_including_deleted(saved.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.name, "Vise");
    assert!(!stored.deleted);
    assert!(stored.deleted_by.is_none());
    assert!(stored.deleted_at.is_none());
}
