//! Informational page route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::response::IntoResponse;
use tower_sessions::Session;
use tracing::instrument;

use super::Page;
use crate::middleware::take_flashes;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub page: Page,
}

/// About page template.
#[derive(Template, WebTemplate)]
#[template(path = "about.html")]
pub struct AboutTemplate {
    pub page: Page,
}

/// Display the home page.
#[instrument(skip(session))]
pub async fn index(session: Session) -> impl IntoResponse {
    IndexTemplate {
        page: Page::new("index", take_flashes(&session).await),
    }
}

/// Display the about page.
#[instrument(skip(session))]
pub async fn about(session: Session) -> impl IntoResponse {
    AboutTemplate {
        page: Page::new("about", take_flashes(&session).await),
    }
}
