use std::time::Duration;

use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// How long a command waits for a pooled connection. A decision that holds
/// its transaction across the escrow call must finish well inside this.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connects to `database_url` (SQLite or Postgres) and applies pending
/// migrations.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let backend = if database_url.starts_with("postgres") {
        "PostgreSQL"
    } else {
        "SQLite"
    };
    tracing::info!(backend, "connecting to database");

    let mut options = ConnectOptions::new(database_url.to_owned());
    options
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .sqlx_logging(false);
    // An in-memory SQLite database exists per connection.
    if database_url.contains(":memory:") {
        options.max_connections(1).min_connections(1);
    }

    let db = Database::connect(options).await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}
