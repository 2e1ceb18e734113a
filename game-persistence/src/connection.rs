use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use tracing::info;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://stop_the_bus.db?mode=rwc";

pub async fn connect_to_database(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url);
    options.sqlx_logging(false);
    Database::connect(options).await
}

pub async fn connect_to_memory_database() -> Result<DatabaseConnection, DbErr> {
    // Every pooled connection would otherwise open its own empty database
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    Database::connect(options).await
}

/// Connect and bring the schema up to date
pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = connect_to_database(database_url).await?;
    Migrator::up(&db, None).await?;
    info!("Session database ready at {}", database_url);
    Ok(db)
}
