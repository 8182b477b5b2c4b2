//! CLI command handlers.
//!
//! Each command runs inside its own unit of work and returns a JSON value
//! for the binary to print.

use serde::Serialize;
use serde_json::{json, Value};

use crate::catalog::{CategoryCriteria, ProductCriteria};
use crate::identity::IdentityProvider;
use crate::infra::Database;
use crate::persistence::Tracking;
use crate::with_unit_of_work;
use common::{AppError, AppResult, OptionExt};

/// Category subcommands
#[derive(Debug, Clone)]
pub enum CategoryAction {
    Add {
        name: String,
        description: Option<String>,
    },
    List {
        name: Option<String>,
    },
}

/// Product subcommands
#[derive(Debug, Clone)]
pub enum ProductAction {
    Add {
        sku: String,
        name: String,
        price_cents: i64,
        category_id: Option<i32>,
    },
    List(ProductCriteria),
    Show {
        id: i32,
    },
    Rename {
        id: i32,
        name: String,
    },
    Delete {
        id: i32,
    },
}

/// A catalog command
#[derive(Debug, Clone)]
pub enum CatalogCommand {
    Category(CategoryAction),
    Product(ProductAction),
}

fn to_json<T: Serialize>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value).map_err(|e| AppError::internal(e.to_string()))
}

/// Execute `command` and return its JSON output.
pub async fn execute(
    db: &Database,
    identity: &dyn IdentityProvider,
    command: CatalogCommand,
) -> AppResult<Value> {
    match command {
        CatalogCommand::Category(action) => categories(db, identity, action).await,
        CatalogCommand::Product(action) => products(db, identity, action).await,
    }
}

async fn categories(
    db: &Database,
    identity: &dyn IdentityProvider,
    action: CategoryAction,
) -> AppResult<Value> {
    match action {
        CategoryAction::Add { name, description } => {
            with_unit_of_work!(db, identity, |uow, caller| {
                let categories = uow.categories();

                let mut category = categories.create().await?;
                category.name = name;
                category.description = description;

                let entry = categories.insert(category, caller)?;
                uow.save().await?;

                let saved = categories
                    .current(&entry)?
                    .ok_or_else(|| AppError::internal("saved category is no longer tracked"))?;
                to_json(&saved)
            })
        }
        CategoryAction::List { name } => {
            with_unit_of_work!(db, identity, |uow, _caller| {
                let criteria = CategoryCriteria { name };
                let found = uow
                    .categories()
                    .search(Some(&criteria), Tracking::NoTracking, &["products"])?
                    .all()
                    .await?;
                to_json(&found)
            })
        }
    }
}

async fn products(
    db: &Database,
    identity: &dyn IdentityProvider,
    action: ProductAction,
) -> AppResult<Value> {
    match action {
        ProductAction::Add {
            sku,
            name,
            price_cents,
            category_id,
        } => {
            with_unit_of_work!(db, identity, |uow, caller| {
                let products = uow.products();

                let mut product = products.create().await?;
                product.sku = sku;
                product.name = name;
                product.price_cents = price_cents;
                product.category_id = category_id;

                let entry = products.insert(product, caller)?;
                uow.save().await?;

                let id = products
                    .current(&entry)?
                    .map(|saved| saved.id)
                    .ok_or_else(|| AppError::internal("saved product is no longer tracked"))?;
                to_json(&products.read_dto(id).await?.ok_or_not_found()?)
            })
        }
        ProductAction::List(criteria) => {
            with_unit_of_work!(db, identity, |uow, _caller| {
                to_json(&uow.products().search_dto(Some(&criteria)).await?)
            })
        }
        ProductAction::Show { id } => {
            with_unit_of_work!(db, identity, |uow, _caller| {
                to_json(&uow.products().read_dto(id).await?.ok_or_not_found()?)
            })
        }
        ProductAction::Rename { id, name } => {
            with_unit_of_work!(db, identity, |uow, caller| {
                let products = uow.products();

                let mut product = products
                    .read(id, Tracking::Tracked, &[])
                    .await?
                    .ok_or_not_found()?;
                product.name = name;

                products.update(product, caller)?;
                uow.save().await?;

                to_json(&products.read_dto(id).await?.ok_or_not_found()?)
            })
        }
        ProductAction::Delete { id } => {
            with_unit_of_work!(db, identity, |uow, caller| {
                let products = uow.products();

                let product = products
                    .read(id, Tracking::NoTracking, &[])
                    .await?
                    .ok_or_not_found()?;

                products.delete(product, caller)?;
                let summary = uow.save().await?;

                Ok(json!({ "deleted": id, "summary": summary }))
            })
        }
    }
}
