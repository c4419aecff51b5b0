//! Email confirmation route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use tower_sessions::Session;
use tracing::instrument;

use super::{Page, flash_redirect};
use crate::error::{Result, add_breadcrumb};
use crate::forms::{ConfirmationForm, FieldError, FormErrors, validate_confirmation_form};
use crate::middleware::{ClientIp, csrf_token, take_flashes, verify_csrf};
use crate::models::Flash;
use crate::services::LinkConfirmation;
use crate::services::confirmation::INVALID_LINK_MESSAGE;
use crate::state::AppState;

const PAGE_TITLE: &str = "email confirmation";

const CONFIRMED_MESSAGE: &str = "Thank you for confirming your email!";

/// Email confirmation form template.
#[derive(Template, WebTemplate)]
#[template(path = "email_confirmation.html")]
pub struct EmailConfirmationTemplate {
    pub page: Page,
    pub csrf_token: String,
    pub email: String,
    pub errors: FormErrors,
}

/// Display the email confirmation form.
///
/// # Errors
///
/// Returns an error if the session store fails.
#[instrument(skip(session))]
pub async fn show(session: Session) -> Result<impl IntoResponse> {
    Ok(EmailConfirmationTemplate {
        page: Page::new(PAGE_TITLE, take_flashes(&session).await),
        csrf_token: csrf_token(&session).await?,
        email: String::new(),
        errors: FormErrors::default(),
    })
}

/// Request a confirmation link.
///
/// POST /email-confirmation
///
/// Invalid input re-renders the form with 422. Otherwise the outcome is
/// flashed and the visitor is redirected back to the form.
///
/// # Errors
///
/// Returns an error if the store, the mailer or the session fails.
#[instrument(skip_all)]
pub async fn request(
    State(state): State<AppState>,
    session: Session,
    ClientIp(ip): ClientIp,
    Form(form): Form<ConfirmationForm>,
) -> Result<Response> {
    let csrf_ok = verify_csrf(&session, &form.csrf_token).await?;

    let email = match validate_confirmation_form(&form) {
        Ok(email) if csrf_ok => email,
        result => {
            let mut errors = FormErrors::from(result.err().unwrap_or_default());
            if !csrf_ok {
                errors.push(FieldError::csrf());
            }
            return render_invalid(&session, form.email, errors).await;
        }
    };

    add_breadcrumb("confirmation", "Confirmation link requested");

    let users = state.users();
    let ip = ip.map(|ip| ip.to_string());
    let outcome = state
        .confirmation(&users)
        .request(&email, ip.as_deref(), Utc::now())
        .await?;

    Ok(flash_redirect(&session, outcome.flash(), "/email-confirmation")
        .await?
        .into_response())
}

/// Confirm an email from a mailed link.
///
/// GET /email-confirmation/token/{token}
///
/// # Errors
///
/// Returns an error if the store or the session fails.
#[instrument(skip_all)]
pub async fn confirm(
    State(state): State<AppState>,
    session: Session,
    Path(token): Path<String>,
) -> Result<Redirect> {
    let users = state.users();
    let result = state
        .confirmation(&users)
        .confirm_link(&token, Utc::now())
        .await?;

    let (flash, to) = link_response(&result);
    flash_redirect(&session, flash, to).await
}

/// The flash and redirect target for a clicked confirmation link.
///
/// Every kind of failure gets the same message.
#[must_use]
pub fn link_response(result: &LinkConfirmation) -> (Flash, &'static str) {
    match result {
        LinkConfirmation::Confirmed(_) => (Flash::success(CONFIRMED_MESSAGE), "/inquiries"),
        LinkConfirmation::Invalid | LinkConfirmation::NotFound => {
            (Flash::error(INVALID_LINK_MESSAGE), "/email-confirmation")
        }
    }
}

async fn render_invalid(
    session: &Session,
    email: String,
    errors: FormErrors,
) -> Result<Response> {
    let template = EmailConfirmationTemplate {
        page: Page::new(PAGE_TITLE, take_flashes(session).await),
        csrf_token: csrf_token(session).await?,
        email,
        errors,
    };
    Ok((StatusCode::UNPROCESSABLE_ENTITY, template).into_response())
}
