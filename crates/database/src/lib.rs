//! SQLite persistence layer: connection management, migrations, entities
//! and repositories.

pub mod connection;
pub mod entities;
pub mod errors;
pub mod migrations;
pub mod repos;

pub use connection::prepare_database;
pub use errors::{StoreError, StoreResult};
pub use sqlx::SqlitePool;

use parley_config::DatabaseConfig;

/// Open the pool and bring the schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let pool = connection::prepare_database(config).await?;
    migrations::run_migrations(&pool).await?;
    Ok(pool)
}
