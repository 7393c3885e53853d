//! Database layer with `SeaORM` entities and repositories.
//!
//! This crate provides:
//! - `SeaORM` entity definitions for the tables the backend reads
//! - Repository abstractions for session lookup and entity counts
//! - Database migrations

pub mod entities;
pub mod migration;
pub mod repositories;

pub use repositories::{EntityCounts, SessionRepository, StatsRepository};

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Establishes a connection to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url);
    options.max_connections(max_connections).sqlx_logging(false);
    let db = Database::connect(options).await?;
    tracing::info!(max_connections, "database pool ready");
    Ok(db)
}
