//! Outbound email for confirmation links and inquiries.
//!
//! Uses SMTP via lettre for delivery with Askama text templates. With
//! `MAIL_SUPPRESS_SEND` set, messages are still built (so addresses and
//! attachments are checked) but only logged.

use std::future::Future;

use askama::Template;
use bytes::Bytes;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use kreddig_core::Email;

use crate::config::MailConfig;

/// Subject of confirmation link messages.
pub const CONFIRMATION_SUBJECT: &str = "confirmation link kreddig.io";

/// Subject of inquiry messages.
pub const INQUIRY_SUBJECT: &str = "inquiry kreddig.io";

/// Plain text body of the confirmation link email.
#[derive(Template)]
#[template(path = "email/confirmation.txt")]
struct ConfirmationEmailText<'a> {
    link: &'a str,
}

/// Plain text body of the inquiry email.
#[derive(Template)]
#[template(path = "email/inquiry.txt")]
struct InquiryEmailText<'a> {
    name: &'a str,
    attachment_count: usize,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Attachment content type could not be parsed.
    #[error("Invalid attachment content type: {0}")]
    InvalidContentType(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// A file attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// A message ready to be handed to a [`Notifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<Email>,
    pub cc: Vec<Email>,
    pub attachments: Vec<MailAttachment>,
}

impl OutboundEmail {
    /// The confirmation link message for `to`.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::Template` if the body fails to render.
    pub fn confirmation(to: &Email, link: &str) -> Result<Self, EmailError> {
        Ok(Self {
            subject: CONFIRMATION_SUBJECT.to_string(),
            body: ConfirmationEmailText { link }.render()?,
            recipients: vec![to.clone()],
            cc: Vec::new(),
            attachments: Vec::new(),
        })
    }

    /// The inquiry message: sent to the submitter with staff in copy.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::Template` if the body fails to render.
    pub fn inquiry(
        name: &str,
        to: &Email,
        staff: &Email,
        attachments: Vec<MailAttachment>,
    ) -> Result<Self, EmailError> {
        let body = InquiryEmailText {
            name,
            attachment_count: attachments.len(),
        }
        .render()?;

        Ok(Self {
            subject: INQUIRY_SUBJECT.to_string(),
            body,
            recipients: vec![to.clone()],
            cc: vec![staff.clone()],
            attachments,
        })
    }
}

/// Something that can deliver an [`OutboundEmail`].
pub trait Notifier: Send + Sync {
    /// Deliver the message.
    fn send(&self, email: OutboundEmail) -> impl Future<Output = Result<(), EmailError>> + Send;
}

/// SMTP email service.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    suppress_send: bool,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// No connection is opened until the first message is sent.
    ///
    /// # Errors
    ///
    /// Returns error if the TLS relay cannot be set up or the sender address is invalid.
    pub fn new(config: &MailConfig) -> Result<Self, EmailError> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.server)
        }
        .port(config.port);

        if let Some(credentials) = &config.credentials {
            builder = builder.credentials(Credentials::new(
                credentials.username.clone(),
                credentials.password.expose_secret().to_string(),
            ));
        }

        Ok(Self {
            mailer: builder.build(),
            from: mailbox(&config.default_sender)?,
            suppress_send: config.suppress_send,
        })
    }

    /// Build the MIME message: text body followed by attachments.
    fn build_message(&self, email: &OutboundEmail) -> Result<Message, EmailError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(email.subject.clone());

        for to in &email.recipients {
            builder = builder.to(mailbox(to)?);
        }
        for cc in &email.cc {
            builder = builder.cc(mailbox(cc)?);
        }

        if email.attachments.is_empty() {
            return Ok(builder.singlepart(SinglePart::plain(email.body.clone()))?);
        }

        let mut body = MultiPart::mixed().singlepart(SinglePart::plain(email.body.clone()));
        for attachment in &email.attachments {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|_| EmailError::InvalidContentType(attachment.content_type.clone()))?;
            body = body.singlepart(
                Attachment::new(attachment.filename.clone())
                    .body(attachment.data.to_vec(), content_type),
            );
        }

        Ok(builder.multipart(body)?)
    }
}

impl Notifier for EmailService {
    async fn send(&self, email: OutboundEmail) -> Result<(), EmailError> {
        let message = self.build_message(&email)?;

        if self.suppress_send {
            tracing::info!(
                to = ?email.recipients.iter().map(Email::as_str).collect::<Vec<_>>(),
                cc = ?email.cc.iter().map(Email::as_str).collect::<Vec<_>>(),
                subject = %email.subject,
                attachments = email.attachments.len(),
                body = %email.body,
                "Email sending suppressed"
            );
            return Ok(());
        }

        self.mailer.send(message).await?;

        tracing::info!(subject = %email.subject, attachments = email.attachments.len(), "Email sent successfully");
        Ok(())
    }
}

fn mailbox(email: &Email) -> Result<Mailbox, EmailError> {
    email
        .as_str()
        .parse()
        .map_err(|_| EmailError::InvalidAddress(email.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn service() -> EmailService {
        EmailService::new(&MailConfig {
            server: "localhost".to_string(),
            port: 25,
            use_tls: false,
            credentials: None,
            default_sender: Email::parse("info@kreddig.io").unwrap(),
            staff_address: Email::parse("info@kreddig.io").unwrap(),
            suppress_send: true,
        })
        .unwrap()
    }

    fn jpeg_attachment() -> MailAttachment {
        MailAttachment {
            filename: "photo.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            data: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0]),
        }
    }

    #[test]
    fn test_confirmation_email_contains_link() {
        let to = Email::parse("a@b.com").unwrap();
        let email = OutboundEmail::confirmation(
            &to,
            "http://localhost:5000/email-confirmation/token/abc.def.ghi",
        )
        .unwrap();

        assert_eq!(email.subject, CONFIRMATION_SUBJECT);
        assert_eq!(email.recipients, vec![to]);
        assert!(email.cc.is_empty());
        assert!(
            email
                .body
                .contains("http://localhost:5000/email-confirmation/token/abc.def.ghi")
        );
    }

    #[test]
    fn test_inquiry_email_copies_staff() {
        let to = Email::parse("a@b.com").unwrap();
        let staff = Email::parse("info@kreddig.io").unwrap();
        let email =
            OutboundEmail::inquiry("Ada", &to, &staff, vec![jpeg_attachment()]).unwrap();

        assert_eq!(email.subject, INQUIRY_SUBJECT);
        assert_eq!(email.cc, vec![staff]);
        assert!(email.body.contains("hey Ada, this is your inquiry."));
        assert_eq!(email.attachments.len(), 1);
    }

    #[tokio::test]
    async fn test_build_message_with_attachment() {
        let to = Email::parse("a@b.com").unwrap();
        let staff = Email::parse("info@kreddig.io").unwrap();
        let email =
            OutboundEmail::inquiry("Ada", &to, &staff, vec![jpeg_attachment()]).unwrap();

        let formatted = String::from_utf8(service().build_message(&email).unwrap().formatted())
            .unwrap();
        assert!(formatted.contains("Subject: inquiry kreddig.io"));
        assert!(formatted.contains("Cc: info@kreddig.io"));
        assert!(formatted.contains("filename=\"photo.jpg\""));
    }

    #[tokio::test]
    async fn test_bad_content_type_rejected() {
        let to = Email::parse("a@b.com").unwrap();
        let mut attachment = jpeg_attachment();
        attachment.content_type = "not a mime type".to_string();
        let email = OutboundEmail::inquiry("Ada", &to, &to, vec![attachment]).unwrap();

        assert!(matches!(
            service().build_message(&email),
            Err(EmailError::InvalidContentType(_))
        ));
    }

    #[tokio::test]
    async fn test_suppressed_send_succeeds_without_server() {
        let to = Email::parse("a@b.com").unwrap();
        let email = OutboundEmail::confirmation(&to, "http://localhost/x").unwrap();
        assert!(service().send(email).await.is_ok());
    }
}
