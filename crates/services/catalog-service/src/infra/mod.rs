//! Infrastructure layer - database bootstrap and schema migrations.

mod db;
pub mod migrations;

pub use db::Database;
pub use migrations::Migrator;
