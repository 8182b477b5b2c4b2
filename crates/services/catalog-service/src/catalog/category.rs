//! Category kind.

use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait,
    Select,
};
use serde::Deserialize;
use validator::Validate;

use super::{check_text, unknown_include};
use crate::entities::{category, product};
use crate::persistence::{EntityKind, Identity};
use common::{AppError, AppResult};
use domain::{MAX_DESCRIPTION_LENGTH, MAX_NAME_LENGTH};

/// Category repository kind
pub struct Categories;

/// Category search filter
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CategoryCriteria {
    /// Substring of the category name
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
}

impl CategoryCriteria {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

#[async_trait]
impl EntityKind for Categories {
    type Entity = category::Entity;
    type Model = category::Model;
    type ActiveModel = category::ActiveModel;
    type Criteria = CategoryCriteria;
    type Dto = Identity;
    type SearchDto = Identity;

    const NAME: &'static str = "category";
    const INCLUDES: &'static [&'static str] = &["products"];

    /// New categories go to the end of the display order.
    async fn create(db: &DatabaseConnection) -> AppResult<category::Model> {
        let max_order: Option<Option<i32>> = category::Entity::find()
            .select_only()
            .column_as(Expr::col(category::Column::DisplayOrder).max(), "max_order")
            .into_tuple()
            .one(db)
            .await?;

        Ok(category::Model {
            display_order: max_order.flatten().unwrap_or(0) + 1,
            ..Default::default()
        })
    }

    fn filter(query: Select<category::Entity>, criteria: &CategoryCriteria) -> Select<category::Entity> {
        query.apply_if(criteria.name.as_deref(), |query, name| {
            query.filter(category::Column::Name.contains(name))
        })
    }

    fn validate(model: &category::Model) -> AppResult<()> {
        check_text(Self::NAME, "name", &model.name, MAX_NAME_LENGTH)?;
        if let Some(description) = &model.description {
            if description.chars().count() as u64 > MAX_DESCRIPTION_LENGTH {
                return Err(AppError::validation(format!(
                    "category description must be at most {} characters",
                    MAX_DESCRIPTION_LENGTH
                )));
            }
        }
        Ok(())
    }

    async fn include(
        models: &mut [category::Model],
        path: &str,
        db: &DatabaseConnection,
    ) -> AppResult<()> {
        if path != "products" {
            return Err(unknown_include(Self::NAME, path));
        }

        let ids: Vec<i32> = models.iter().map(|model| model.id).collect();
        let products = product::Entity::find()
            .filter(product::Column::CategoryId.is_in(ids))
            .filter(product::Column::Deleted.eq(false))
            .order_by_asc(product::Column::Id)
            .all(db)
            .await?;

        for model in models.iter_mut() {
            model.products = products
                .iter()
                .filter(|product| product.category_id == Some(model.id))
                .cloned()
                .collect();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_name() {
        let model = category::Model::default();
        assert!(Categories::validate(&model).is_err());

        let model = category::Model {
            name: "Tools".to_string(),
            ..Default::default()
        };
        assert!(Categories::validate(&model).is_ok());
    }

    #[test]
    fn test_criteria_rejects_empty_name() {
        assert!(CategoryCriteria::by_name("").validate().is_err());
        assert!(CategoryCriteria::by_name("oo").validate().is_ok());
        assert!(CategoryCriteria::default().validate().is_ok());
    }
}
