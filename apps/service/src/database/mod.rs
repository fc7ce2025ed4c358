/// Database abstraction layer
///
/// This module provides a unified interface over the libsql store holding the
/// endpoint registry, the check history and the latest status per endpoint.

pub mod repository;
pub mod migrations;
pub mod models;

pub use repository::{Database, DatabaseImpl, DatabaseTransaction};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
