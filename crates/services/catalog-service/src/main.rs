//! Catalog Service - command-line access to the catalog store.

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalog_service_lib::catalog::ProductCriteria;
use catalog_service_lib::commands::{CatalogCommand, CategoryAction, ProductAction};
use catalog_service_lib::MigrateAction;

#[derive(Parser)]
#[command(name = "catalog-service")]
#[command(about = "Catalog data-access service")]
struct Cli {
    /// Caller identity stamped on audit fields
    #[arg(long, global = true, env = "CATALOG_ACTOR")]
    actor: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database migration commands
    Migrate {
        #[command(subcommand)]
        action: MigrateCommands,
    },
    /// Manage categories
    Categories {
        #[command(subcommand)]
        action: CategoryCommands,
    },
    /// Manage products
    Products {
        #[command(subcommand)]
        action: ProductCommands,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Run pending migrations
    Up,
    /// Rollback last migration
    Down,
    /// Show migration status
    Status,
    /// Reset database and run all migrations
    Fresh,
}

#[derive(Subcommand)]
enum CategoryCommands {
    /// Add a category
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List active categories with their products
    List {
        /// Only categories whose name contains this text
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Args)]
struct ProductFilter {
    /// Only products whose name contains this text
    #[arg(long)]
    name: Option<String>,
    /// Only products in this category
    #[arg(long)]
    category: Option<i32>,
    #[arg(long)]
    min_price: Option<i64>,
    #[arg(long)]
    max_price: Option<i64>,
}

#[derive(Subcommand)]
enum ProductCommands {
    /// Add a product
    Add {
        #[arg(long)]
        sku: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        price_cents: i64,
        /// Category identifier
        #[arg(long)]
        category: Option<i32>,
    },
    /// List active products
    List(ProductFilter),
    /// Show one product
    Show { id: i32 },
    /// Rename a product
    Rename { id: i32, name: String },
    /// Soft-delete a product
    Delete { id: i32 },
}

impl From<CategoryCommands> for CategoryAction {
    fn from(command: CategoryCommands) -> Self {
        match command {
            CategoryCommands::Add { name, description } => CategoryAction::Add { name, description },
            CategoryCommands::List { name } => CategoryAction::List { name },
        }
    }
}

impl From<ProductCommands> for ProductAction {
    fn from(command: ProductCommands) -> Self {
        match command {
            ProductCommands::Add {
                sku,
                name,
                price_cents,
                category,
            } => ProductAction::Add {
                sku,
                name,
                price_cents,
                category_id: category,
            },
            ProductCommands::List(filter) => ProductAction::List(ProductCriteria {
                name: filter.name,
                category_id: filter.category,
                min_price_cents: filter.min_price,
                max_price_cents: filter.max_price,
            }),
            ProductCommands::Show { id } => ProductAction::Show { id },
            ProductCommands::Rename { id, name } => ProductAction::Rename { id, name },
            ProductCommands::Delete { id } => ProductAction::Delete { id },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let command = match cli.command {
        Commands::Migrate { action } => {
            let migrate_action = match action {
                MigrateCommands::Up => MigrateAction::Up,
                MigrateCommands::Down => MigrateAction::Down,
                MigrateCommands::Status => MigrateAction::Status,
                MigrateCommands::Fresh => MigrateAction::Fresh,
            };
            return catalog_service_lib::run_migrations(migrate_action).await;
        }
        Commands::Categories { action } => CatalogCommand::Category(action.into()),
        Commands::Products { action } => CatalogCommand::Product(action.into()),
    };

    let output = catalog_service_lib::run_command(command, cli.actor).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
