//! Concrete entity kinds managed through the generic repository.

mod category;
mod product;

pub use category::{Categories, CategoryCriteria};
pub use product::{ProductCriteria, ProductDetail, ProductDto, ProductListing, ProductSummary, Products};

use common::{AppError, AppResult};

/// Reject blank or over-long text fields.
fn check_text(kind: &str, field: &str, value: &str, max: u64) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{} {} is required", kind, field)));
    }
    if value.chars().count() as u64 > max {
        return Err(AppError::validation(format!(
            "{} {} must be at most {} characters",
            kind, field, max
        )));
    }
    Ok(())
}

fn unknown_include(kind: &str, path: &str) -> AppError {
    AppError::validation(format!("{} has no related field '{}'", kind, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_text_rejects_blank() {
        assert!(check_text("category", "name", "  ", 10).is_err());
        assert!(check_text("category", "name", "Tools", 10).is_ok());
    }

    #[test]
    fn test_check_text_counts_characters() {
        assert!(check_text("product", "name", "ééééé", 5).is_ok());
        assert!(check_text("product", "name", "éééééé", 5).is_err());
    }
}
