//! Shared fixtures for catalog-service integration tests.

#![allow(dead_code)]

use catalog_service_lib::catalog::{Categories, Products};
use catalog_service_lib::entities::{category, product};
use catalog_service_lib::infra::Database;
use catalog_service_lib::persistence::UnitOfWork;
use common::DatabaseConfig;
use domain::Caller;

/// Fresh SQLite in-memory database with migrations applied.
pub async fn setup() -> Database {
    Database::connect(&DatabaseConfig::in_memory())
        .await
        .expect("in-memory database")
}

pub fn caller(name: &str) -> Caller {
    Caller::new(name).expect("valid caller")
}

pub fn new_product(sku: &str, name: &str, price_cents: i64) -> product::Model {
    product::Model {
        sku: sku.to_string(),
        name: name.to_string(),
        price_cents,
        ..Default::default()
    }
}

/// Insert and commit a category, returning the stored row.
pub async fn seed_category(db: &Database, name: &str) -> category::Model {
    let uow = db.unit_of_work();
    let categories = uow.repository::<Categories>();

    let mut model = categories.create().await.expect("create category");
    model.name = name.to_string();

    let entry = categories.insert(model, &caller("seeder")).expect("insert category");
    uow.save().await.expect("save category");
    categories
        .current(&entry)
        .expect("tracked")
        .expect("category entry")
}

/// Insert and commit a product, returning the stored row.
pub async fn seed_product(db: &Database, model: product::Model) -> product::Model {
    let uow: UnitOfWork = db.unit_of_work();
    let products = uow.repository::<Products>();

    let entry = products.insert(model, &caller("seeder")).expect("insert product");
    uow.save().await.expect("save product");
    products
        .current(&entry)
        .expect("tracked")
        .expect("product entry")
}
