//! Schema migration command.

use crate::db::{self, pool::DbPool};
use crate::error::AppError;
use serde::Serialize;

/// Response for the migrate command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateResponse {
    /// Migrations applied by this invocation, in order.
    pub applied: Vec<String>,
}

/// Apply all pending migrations.
pub async fn migrate(pool: &DbPool) -> Result<MigrateResponse, AppError> {
    let applied = db::run_migrations(pool).await?;
    if applied.is_empty() {
        log::info!("Schema already current");
    }
    Ok(MigrateResponse { applied })
}
