//! User record repository.
//!
//! [`UserStore`] is the narrow interface the workflows use; [`UserRepository`]
//! implements it on `PostgreSQL`. Every operation is a single statement on a
//! single row. Counter increments are conditional inside the statement, so
//! two concurrent requests for the same email cannot push a counter past its
//! quota even though each may have read a stale count beforehand.

use std::future::Future;

use sqlx::PgPool;

use kreddig_core::{Email, Quota};

use super::RepositoryError;
use crate::models::UserRecord;

const USER_COLUMNS: &str = "email, email_is_confirmed, email_token, email_token_count, \
     ip_address, inquiry_count, created_at, updated_at";

/// Persistence operations on user records.
pub trait UserStore: Send + Sync {
    /// Look up the record for an email.
    fn get(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<Option<UserRecord>, RepositoryError>> + Send;

    /// Store a freshly issued confirmation token.
    ///
    /// Creates the record with a token count of 1 when none exists. For an
    /// existing unconfirmed record below `quota`, replaces the token, bumps
    /// the count and records `ip_address`. Returns `None` when the record is
    /// confirmed or already at the quota.
    fn record_issued_token(
        &self,
        email: &Email,
        token: &str,
        ip_address: Option<&str>,
        quota: Quota,
    ) -> impl Future<Output = Result<Option<UserRecord>, RepositoryError>> + Send;

    /// Mark the email as confirmed. Returns `false` when no record exists.
    fn mark_confirmed(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Take one inquiry slot if the email is confirmed and below `quota`.
    fn reserve_inquiry(
        &self,
        email: &Email,
        quota: Quota,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Give back a slot taken by [`UserStore::reserve_inquiry`].
    fn release_inquiry(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Reset both counters (support action). Returns `false` when no record exists.
    fn reset_quotas(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;
}

/// Repository for user records in `PostgreSQL`.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }
}

impl UserStore for UserRepository<'_> {
    async fn get(&self, email: &Email) -> Result<Option<UserRecord>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM site.user WHERE email = $1");
        let row = sqlx::query_as::<_, UserRecord>(&query)
            .bind(email)
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    async fn record_issued_token(
        &self,
        email: &Email,
        token: &str,
        ip_address: Option<&str>,
        quota: Quota,
    ) -> Result<Option<UserRecord>, RepositoryError> {
        let query = format!(
            r"
            INSERT INTO site.user AS u (email, email_token, email_token_count, ip_address)
            VALUES ($1, $2, 1, $3)
            ON CONFLICT (email) DO UPDATE
            SET email_token = EXCLUDED.email_token,
                email_token_count = u.email_token_count + 1,
                ip_address = COALESCE(EXCLUDED.ip_address, u.ip_address),
                updated_at = NOW()
            WHERE u.email_is_confirmed = FALSE
              AND u.email_token_count < $4
            RETURNING {USER_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, UserRecord>(&query)
            .bind(email)
            .bind(token)
            .bind(ip_address)
            .bind(quota.limit())
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    async fn mark_confirmed(&self, email: &Email) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE site.user
            SET email_is_confirmed = TRUE, updated_at = NOW()
            WHERE email = $1
            ",
        )
        .bind(email)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reserve_inquiry(&self, email: &Email, quota: Quota) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE site.user
            SET inquiry_count = inquiry_count + 1, updated_at = NOW()
            WHERE email = $1
              AND email_is_confirmed = TRUE
              AND inquiry_count < $2
            ",
        )
        .bind(email)
        .bind(quota.limit())
        .execute(self.pool)
        .await?;

        match result.rows_affected() {
            0 => Ok(false),
            1 => Ok(true),
            n => Err(RepositoryError::DataCorruption(format!(
                "{n} rows share the email primary key"
            ))),
        }
    }

    async fn release_inquiry(&self, email: &Email) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE site.user
            SET inquiry_count = GREATEST(inquiry_count - 1, 0), updated_at = NOW()
            WHERE email = $1
            ",
        )
        .bind(email)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    async fn reset_quotas(&self, email: &Email) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE site.user
            SET email_token_count = 0, inquiry_count = 0, updated_at = NOW()
            WHERE email = $1
            ",
        )
        .bind(email)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
