//! Database connection, entities and the stores the pipeline persists through.
pub mod entities;
pub mod migrations;
pub mod store;

use sea_orm::{Database, DatabaseConnection, DbErr};

/// Opens (creating if needed) the SQLite database at `path`.
pub async fn connect_db(path: &str) -> Result<DatabaseConnection, DbErr> {
    let url = format!("sqlite://{}?mode=rwc", path);
    Database::connect(url).await
}

#[cfg(test)]
/// Fresh in-memory database
pub async fn connect_test_db() -> Result<DatabaseConnection, DbErr> {
    Database::connect("sqlite::memory:").await
}
