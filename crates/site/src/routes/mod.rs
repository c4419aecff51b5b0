//! HTTP route handlers for the site.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                                  - Home page
//! GET  /about                             - About page
//! GET  /health                            - Liveness check
//! GET  /health/ready                      - Readiness check (database)
//!
//! # Email confirmation
//! GET  /email-confirmation                - Request form
//! POST /email-confirmation                - Issue or reissue a confirmation link
//! GET  /email-confirmation/token/{token}  - Confirm from a mailed link
//!
//! # Inquiries
//! GET  /inquiries                         - Inquiry form
//! POST /inquiries                         - Multipart inquiry submission
//! ```

pub mod confirmation;
pub mod inquiries;
pub mod pages;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
};
use tower_sessions::Session;

use crate::error::Result;
use crate::middleware::{form_rate_limiter, push_flash};
use crate::models::Flash;
use crate::services::uploads::{MAX_IMAGE_SIZE, MAX_IMAGE_UPLOAD};
use crate::state::AppState;

/// Largest accepted multipart body.
///
/// Room for one file past the upload limit so the count check, not the body
/// limit, rejects a six file batch.
pub const MAX_INQUIRY_BODY: usize = (MAX_IMAGE_UPLOAD + 1) * MAX_IMAGE_SIZE + 1024 * 1024;

/// Stylesheet URL with a content hash for cache busting.
pub const STYLESHEET: &str = concat!("/static/css/main.css?v=", env!("CSS_HASH"));

/// Data every page template needs.
#[derive(Debug, Clone)]
pub struct Page {
    pub title: &'static str,
    pub flashes: Vec<Flash>,
}

impl Page {
    #[must_use]
    pub const fn new(title: &'static str, flashes: Vec<Flash>) -> Self {
        Self { title, flashes }
    }

    #[must_use]
    pub const fn stylesheet(&self) -> &'static str {
        STYLESHEET
    }
}

/// Queue `flash` for the next page and redirect to `to` with 303 See Other.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn flash_redirect(session: &Session, flash: Flash, to: &str) -> Result<Redirect> {
    push_flash(session, flash).await?;
    Ok(Redirect::to(to))
}

/// Create the email confirmation router.
///
/// Only the POST is rate limited.
pub fn confirmation_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(confirmation::show)
                .merge(post(confirmation::request).layer(form_rate_limiter())),
        )
        .route("/token/{token}", get(confirmation::confirm))
}

/// Create the inquiry router.
pub fn inquiry_routes() -> Router<AppState> {
    Router::new().route(
        "/",
        get(inquiries::show).merge(
            post(inquiries::submit)
                .layer::<_, std::convert::Infallible>(form_rate_limiter())
                .layer(DefaultBodyLimit::max(MAX_INQUIRY_BODY)),
        ),
    )
}

/// Create the main router with all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(pages::index))
        .route("/about", get(pages::about))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/email-confirmation", confirmation_routes())
        .nest("/inquiries", inquiry_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, header};
    use axum::response::IntoResponse;
    use tower::ServiceExt;
    use tower_sessions::MemoryStore;

    use super::*;
    use crate::middleware::take_flashes;

    #[test]
    fn test_body_limit_fits_six_full_files() {
        assert!(MAX_INQUIRY_BODY > 6 * MAX_IMAGE_SIZE);
    }

    #[test]
    fn test_stylesheet_path() {
        assert!(STYLESHEET.starts_with("/static/css/main.css"));
    }

    #[tokio::test]
    async fn test_flash_redirect_is_see_other() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);

        let response = flash_redirect(&session, Flash::notice("queued"), "/inquiries")
            .await
            .unwrap()
            .into_response();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/inquiries");
        assert_eq!(take_flashes(&session).await, vec![Flash::notice("queued")]);
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_support::app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(test_support::body_text(response).await, "ok");
    }
}
