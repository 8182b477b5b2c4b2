//! Product kind and its DTO projections.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, IntoCondition};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, JoinType, QueryFilter,
    QuerySelect, QueryTrait, RelationTrait, Select, SelectModel, Selector,
};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::{check_text, unknown_include};
use crate::entities::{category, product};
use crate::persistence::{EntityKind, Projection};
use common::{AppError, AppResult};
use domain::{MAX_NAME_LENGTH, MAX_SKU_LENGTH};

/// Product repository kind
pub struct Products;

/// Product search filter
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[validate(schema(function = "validate_price_range"))]
pub struct ProductCriteria {
    /// Substring of the product name
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub category_id: Option<i32>,
    #[validate(range(min = 0))]
    pub min_price_cents: Option<i64>,
    #[validate(range(min = 0))]
    pub max_price_cents: Option<i64>,
}

fn validate_price_range(criteria: &ProductCriteria) -> Result<(), ValidationError> {
    match (criteria.min_price_cents, criteria.max_price_cents) {
        (Some(min), Some(max)) if min > max => {
            let mut err = ValidationError::new("price_range");
            err.message = Some("min_price_cents must not exceed max_price_cents".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

/// Full product view with the category name flattened in
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult, Serialize)]
pub struct ProductDto {
    pub id: i32,
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
    pub category_id: Option<i32>,
    pub category_name: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

/// Listing row returned by product searches
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult, Serialize)]
pub struct ProductSummary {
    pub id: i32,
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
    pub category_name: Option<String>,
}

/// Projection to `ProductDto`
pub struct ProductDetail;

/// Projection to `ProductSummary`
pub struct ProductListing;

/// LEFT JOIN to the product's category, skipping soft-deleted categories.
fn with_category_name(query: Select<product::Entity>) -> Select<product::Entity> {
    query
        .join(
            JoinType::LeftJoin,
            product::Relation::Category
                .def()
                .on_condition(|_left, right| {
                    Expr::col((right, category::Column::Deleted))
                        .eq(false)
                        .into_condition()
                }),
        )
        .column_as(category::Column::Name, "category_name")
}

impl Projection<product::Entity> for ProductDetail {
    type Output = ProductDto;

    fn project(query: Select<product::Entity>) -> Selector<SelectModel<ProductDto>> {
        let query = query.select_only().columns([
            product::Column::Id,
            product::Column::Sku,
            product::Column::Name,
            product::Column::PriceCents,
            product::Column::CategoryId,
            product::Column::CreatedBy,
            product::Column::CreatedAt,
            product::Column::UpdatedBy,
            product::Column::UpdatedAt,
        ]);

        with_category_name(query).into_model::<ProductDto>()
    }
}

impl Projection<product::Entity> for ProductListing {
    type Output = ProductSummary;

    fn project(query: Select<product::Entity>) -> Selector<SelectModel<ProductSummary>> {
        let query = query.select_only().columns([
            product::Column::Id,
            product::Column::Sku,
            product::Column::Name,
            product::Column::PriceCents,
        ]);

        with_category_name(query).into_model::<ProductSummary>()
    }
}

#[async_trait]
impl EntityKind for Products {
    type Entity = product::Entity;
    type Model = product::Model;
    type ActiveModel = product::ActiveModel;
    type Criteria = ProductCriteria;
    type Dto = ProductDetail;
    type SearchDto = ProductListing;

    const NAME: &'static str = "product";
    const INCLUDES: &'static [&'static str] = &["category"];

    fn filter(query: Select<product::Entity>, criteria: &ProductCriteria) -> Select<product::Entity> {
        query
            .apply_if(criteria.name.as_deref(), |query, name| {
                query.filter(product::Column::Name.contains(name))
            })
            .apply_if(criteria.category_id, |query, id| {
                query.filter(product::Column::CategoryId.eq(id))
            })
            .apply_if(criteria.min_price_cents, |query, min| {
                query.filter(product::Column::PriceCents.gte(min))
            })
            .apply_if(criteria.max_price_cents, |query, max| {
                query.filter(product::Column::PriceCents.lte(max))
            })
    }

    fn validate(model: &product::Model) -> AppResult<()> {
        check_text(Self::NAME, "sku", &model.sku, MAX_SKU_LENGTH)?;
        check_text(Self::NAME, "name", &model.name, MAX_NAME_LENGTH)?;
        if model.price_cents < 0 {
            return Err(AppError::validation("product price must not be negative"));
        }
        Ok(())
    }

    async fn include(
        models: &mut [product::Model],
        path: &str,
        db: &DatabaseConnection,
    ) -> AppResult<()> {
        if path != "category" {
            return Err(unknown_include(Self::NAME, path));
        }

        let mut ids: Vec<i32> = models.iter().filter_map(|model| model.category_id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(());
        }

        let categories = category::Entity::find()
            .filter(category::Column::Id.is_in(ids))
            .filter(category::Column::Deleted.eq(false))
            .all(db)
            .await?;

        for model in models.iter_mut() {
            model.category = model.category_id.and_then(|id| {
                categories
                    .iter()
                    .find(|category| category.id == id)
                    .cloned()
                    .map(Box::new)
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverted_price_range_is_rejected() {
        let criteria = ProductCriteria {
            min_price_cents: Some(500),
            max_price_cents: Some(100),
            ..Default::default()
        };
        assert!(criteria.validate().is_err());

        let criteria = ProductCriteria {
            min_price_cents: Some(100),
            max_price_cents: Some(100),
            ..Default::default()
        };
        assert!(criteria.validate().is_ok());
    }

    #[test]
    fn test_negative_price_bound_is_rejected() {
        let criteria = ProductCriteria {
            min_price_cents: Some(-1),
            ..Default::default()
        };
        assert!(criteria.validate().is_err());
    }

    #[test]
    fn test_validate_checks_sku_and_price() {
        let mut model = product::Model {
            sku: "SKU-1".to_string(),
            name: "Widget".to_string(),
            price_cents: 250,
            ..Default::default()
        };
        assert!(Products::validate(&model).is_ok());

        model.price_cents = -5;
        assert!(Products::validate(&model).is_err());

        model.price_cents = 0;
        model.sku = "X".repeat(MAX_SKU_LENGTH as usize + 1);
        assert!(Products::validate(&model).is_err());
    }

    #[test]
    fn test_listing_projection_joins_category() {
        use sea_orm::DbBackend;

        let sql = ProductListing::project(product::Entity::find())
            .into_statement(DbBackend::Postgres)
            .to_string();

        assert!(sql.contains("LEFT JOIN \"categories\""));
        assert!(sql.contains("AS \"category_name\""));
    }
}
