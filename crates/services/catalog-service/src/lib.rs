//! Catalog Service Library
//!
//! A generic repository / unit-of-work data-access layer over SeaORM with
//! soft delete, audit stamping and DTO projection, plus the Category and
//! Product kinds built on it.

pub mod catalog;
pub mod commands;
pub mod config;
pub mod entities;
pub mod identity;
pub mod infra;
pub mod persistence;
mod scope;

pub use scope::with_unit_of_work;

use serde_json::Value;
use tracing::info;

use crate::commands::CatalogCommand;
use crate::config::CatalogServiceConfig;
use crate::identity::StaticIdentity;
use crate::infra::Database;
use domain::Caller;

/// Run migrations (for CLI commands).
pub async fn run_migrations(action: MigrateAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = CatalogServiceConfig::from_env();
    let db = Database::connect_without_migrations(&config.database).await?;

    match action {
        MigrateAction::Up => {
            db.run_migrations().await?;
            info!("Migrations applied successfully");
        }
        MigrateAction::Down => {
            db.rollback_migration().await?;
            info!("Rolled back last migration");
        }
        MigrateAction::Status => {
            let status = db.migration_status().await?;
            for (name, applied) in status {
                let marker = if applied { "[x]" } else { "[ ]" };
                println!("{} {}", marker, name);
            }
        }
        MigrateAction::Fresh => {
            db.fresh_migrations().await?;
            info!("Database reset and migrations applied");
        }
    }

    Ok(())
}

/// Migration action type.
#[derive(Debug, Clone, Copy)]
pub enum MigrateAction {
    Up,
    Down,
    Status,
    Fresh,
}

/// Run one catalog command as `actor` (or the configured actor).
pub async fn run_command(
    command: CatalogCommand,
    actor: Option<String>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let config = CatalogServiceConfig::from_env();
    let caller = Caller::new(actor.unwrap_or(config.actor))?;
    let identity = StaticIdentity::new(caller);

    let db = Database::connect(&config.database).await?;
    let output = commands::execute(&db, &identity, command).await?;

    Ok(output)
}
