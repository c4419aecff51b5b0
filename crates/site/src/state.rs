//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::SiteConfig;
use crate::db::UserRepository;
use crate::services::{ConfirmationWorkflow, EmailError, EmailService, InquiryWorkflow, TokenCodec};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: SiteConfig,
    pool: PgPool,
    tokens: TokenCodec,
    mailer: EmailService,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP transport cannot be configured.
    pub fn new(config: SiteConfig, pool: PgPool) -> Result<Self, EmailError> {
        let tokens = TokenCodec::from_config(&config.token);
        let mailer = EmailService::new(&config.mail)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                tokens,
                mailer,
            }),
        })
    }

    /// Get a reference to the site configuration.
    #[must_use]
    pub fn config(&self) -> &SiteConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the confirmation token codec.
    #[must_use]
    pub fn tokens(&self) -> &TokenCodec {
        &self.inner.tokens
    }

    /// Get a reference to the email service.
    #[must_use]
    pub fn mailer(&self) -> &EmailService {
        &self.inner.mailer
    }

    /// A user repository over the shared pool.
    #[must_use]
    pub fn users(&self) -> UserRepository<'_> {
        UserRepository::new(self.pool())
    }

    /// The confirmation workflow over `users`.
    #[must_use]
    pub fn confirmation<'a>(
        &'a self,
        users: &'a UserRepository<'a>,
    ) -> ConfirmationWorkflow<'a, UserRepository<'a>, EmailService> {
        ConfirmationWorkflow::new(users, self.mailer(), self.tokens(), &self.config().base_url)
    }

    /// The inquiry workflow over `users`.
    #[must_use]
    pub fn inquiries<'a>(
        &'a self,
        users: &'a UserRepository<'a>,
    ) -> InquiryWorkflow<'a, UserRepository<'a>, EmailService> {
        let config = self.config();
        InquiryWorkflow::new(
            users,
            self.mailer(),
            &config.mail.staff_address,
            config.upload_dir.as_deref(),
        )
    }
}
