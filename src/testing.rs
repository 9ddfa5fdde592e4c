//! Shared fixtures for unit tests.

use std::sync::Arc;

use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::polls::{PollService, PollSettings, SystemClock};

/// Fresh in-memory SQLite database with every migration applied.
pub async fn memory_database() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    // Each SQLite memory connection is its own database.
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let database = Database::connect(options)
        .await
        .expect("in-memory sqlite connects");
    migration::Migrator::up(&database, None)
        .await
        .expect("migrations apply");
    database
}

pub fn poll_service(database: DatabaseConnection, enabled: bool) -> PollService {
    PollService::new(database, PollSettings { enabled }, Arc::new(SystemClock))
}
