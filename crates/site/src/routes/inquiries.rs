//! Inquiry route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;
use tracing::instrument;

use super::{Page, flash_redirect};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::forms::{
    FieldError, FormErrors, InquiryForm, truncated_upload_error, validate_inquiry_form,
};
use crate::middleware::{csrf_token, take_flashes, verify_csrf};
use crate::services::uploads::{ALLOWED_EXTENSIONS, MAX_IMAGE_UPLOAD, UploadedFile};
use crate::state::AppState;

const PAGE_TITLE: &str = "inquiries";

/// Inquiry form template.
#[derive(Template, WebTemplate)]
#[template(path = "inquiries.html")]
pub struct InquiriesTemplate {
    pub page: Page,
    pub csrf_token: String,
    pub name: String,
    pub email: String,
    pub errors: FormErrors,
    pub max_uploads: usize,
    pub accept: String,
}

impl InquiriesTemplate {
    async fn new(session: &Session, name: String, email: String, errors: FormErrors) -> Result<Self> {
        Ok(Self {
            page: Page::new(PAGE_TITLE, take_flashes(session).await),
            csrf_token: csrf_token(session).await?,
            name,
            email,
            errors,
            max_uploads: MAX_IMAGE_UPLOAD,
            accept: ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| format!(".{ext}"))
                .collect::<Vec<_>>()
                .join(","),
        })
    }
}

/// Display the inquiry form.
///
/// # Errors
///
/// Returns an error if the session store fails.
#[instrument(skip(session))]
pub async fn show(session: Session) -> Result<impl IntoResponse> {
    InquiriesTemplate::new(&session, String::new(), String::new(), FormErrors::default()).await
}

/// Submit an inquiry.
///
/// POST /inquiries (multipart/form-data)
///
/// # Errors
///
/// Returns `BadRequest` for an unreadable multipart body, or an error if
/// the store, the mailer or the session fails.
#[instrument(skip_all, fields(email = tracing::field::Empty))]
pub async fn submit(
    State(state): State<AppState>,
    session: Session,
    multipart: Multipart,
) -> Result<Response> {
    let form = match read_inquiry_form(multipart).await? {
        InquiryBody::Complete(form) => form,
        InquiryBody::Truncated { form, files_seen } => {
            tracing::info!(files_seen, "Inquiry body over the size limit");
            let errors = FormErrors::from(vec![truncated_upload_error(files_seen)]);
            return render_invalid(&session, form, errors).await;
        }
    };
    let csrf_ok = verify_csrf(&session, &form.csrf_token).await?;

    let inquiry = match validate_inquiry_form(&form) {
        Ok(inquiry) if csrf_ok => inquiry,
        result => {
            let mut errors = FormErrors::from(result.err().unwrap_or_default());
            if !csrf_ok {
                errors.push(FieldError::csrf());
            }
            return render_invalid(&session, form, errors).await;
        }
    };

    tracing::Span::current().record("email", tracing::field::display(&inquiry.email));
    add_breadcrumb("inquiry", "Inquiry submitted");

    let users = state.users();
    let outcome = state
        .inquiries(&users)
        .submit(&inquiry.name, &inquiry.email, &form.images)
        .await?;

    Ok(flash_redirect(&session, outcome.flash(), "/inquiries")
        .await?
        .into_response())
}

async fn render_invalid(session: &Session, form: InquiryForm, errors: FormErrors) -> Result<Response> {
    let template = InquiriesTemplate::new(session, form.name, form.email, errors).await?;
    Ok((StatusCode::UNPROCESSABLE_ENTITY, template).into_response())
}

/// A multipart inquiry body as far as it could be read.
enum InquiryBody {
    Complete(InquiryForm),
    /// The body limit was hit; `form` holds the fields read before it.
    Truncated { form: InquiryForm, files_seen: usize },
}

/// Read every multipart field into an [`InquiryForm`].
///
/// Empty file inputs (no file chosen) are skipped; unknown fields are ignored.
async fn read_inquiry_form(mut multipart: Multipart) -> Result<InquiryBody> {
    let mut form = InquiryForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(InquiryBody::Complete(form)),
            Err(e) => {
                let files_seen = form.images.len();
                return truncated_or_bad_request(e, form, files_seen);
            }
        };

        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        if name == "images" {
            let filename = field.file_name().unwrap_or_default().to_owned();
            let content_type = field.content_type().map(str::to_owned);
            let data = match field.bytes().await {
                Ok(data) => data,
                Err(e) => {
                    let files_seen = form.images.len() + 1;
                    return truncated_or_bad_request(e, form, files_seen);
                }
            };

            if filename.is_empty() && data.is_empty() {
                continue;
            }
            form.images.push(UploadedFile::new(filename, content_type, data));
            continue;
        }

        let value = match field.text().await {
            Ok(value) => value,
            Err(e) => {
                let files_seen = form.images.len();
                return truncated_or_bad_request(e, form, files_seen);
            }
        };
        match name.as_str() {
            "name" => form.name = value,
            "email" => form.email = value,
            "csrf_token" => form.csrf_token = value,
            _ => {}
        }
    }
}

fn truncated_or_bad_request(
    error: MultipartError,
    form: InquiryForm,
    files_seen: usize,
) -> Result<InquiryBody> {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return Ok(InquiryBody::Truncated { form, files_seen });
    }
    Err(AppError::BadRequest(error.body_text()))
}
