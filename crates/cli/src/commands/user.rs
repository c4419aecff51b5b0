//! User record support commands.
//!
//! # Environment Variables
//!
//! - `SITE_DATABASE_URL` - `PostgreSQL` connection string for the site database

use kreddig_core::Email;
use kreddig_site::db::{self, UserRepository, UserStore};

use super::{CliError, database_url};

/// Log the stored record for `email`.
pub async fn show(email: &str) -> Result<(), CliError> {
    let email = Email::parse(email)?;
    let pool = db::create_pool(&database_url()?).await?;

    let user = UserRepository::new(&pool)
        .get(&email)
        .await?
        .ok_or_else(|| CliError::UserNotFound(email.to_string()))?;

    tracing::info!(
        email = %user.email,
        confirmed = user.email_is_confirmed,
        token_count = user.email_token_count,
        inquiry_count = user.inquiry_count,
        can_issue_token = user.can_issue_token(),
        can_send_inquiry = user.can_send_inquiry(),
        ip_address = user.ip_address.as_deref().unwrap_or("-"),
        created_at = %user.created_at,
        updated_at = %user.updated_at,
        "User record"
    );
    Ok(())
}

/// Reset the confirmation link and inquiry counters for `email`.
pub async fn reset(email: &str) -> Result<(), CliError> {
    let email = Email::parse(email)?;
    let pool = db::create_pool(&database_url()?).await?;

    if !UserRepository::new(&pool).reset_quotas(&email).await? {
        return Err(CliError::UserNotFound(email.to_string()));
    }

    tracing::info!(email = %email, "Quotas reset");
    Ok(())
}
