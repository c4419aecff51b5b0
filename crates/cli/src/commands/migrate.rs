//! Database migration command.
//!
//! Applies `crates/site/migrations/` (the `site.user` table and the session
//! store table) to the database at `SITE_DATABASE_URL`.

use kreddig_site::db;

use super::{CliError, database_url};

/// Run site database migrations.
pub async fn run() -> Result<(), CliError> {
    let database_url = database_url()?;

    tracing::info!("Connecting to site database...");
    let pool = db::create_pool(&database_url).await?;

    tracing::info!("Running site migrations...");
    sqlx::migrate!("../site/migrations").run(&pool).await?;

    tracing::info!("Site migrations complete!");
    Ok(())
}
