//! Embedded schema migrations for users, roles and token state.

use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};
use tracing::info;

/// Migrations embedded from `tollgate_core/migrations/`.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply all pending migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await?;
    info!(available = MIGRATOR.iter().count(), "database migrations applied");
    Ok(())
}
