//! Inquiry workflow.
//!
//! A confirmed visitor sends an inquiry with validated image files. The
//! inquiry is mailed to the visitor with staff in copy and counts against
//! [`Quota::INQUIRIES`].

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use kreddig_core::{Email, Quota};

use crate::db::{RepositoryError, UserStore};
use crate::models::Flash;
use crate::services::email::{EmailError, MailAttachment, Notifier, OutboundEmail};
use crate::services::uploads::{UploadedFile, secure_filename};

/// Content type used when the browser did not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Errors from the inquiry workflow.
#[derive(Debug, Error)]
pub enum InquiryError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Email(#[from] EmailError),

    /// Writing an attachment to the archive directory failed.
    #[error("Failed to archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of submitting an inquiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InquiryOutcome {
    Sent,
    /// No record, or the email was never confirmed.
    NotConfirmed,
    /// Every allowed inquiry has been sent.
    QuotaExceeded,
}

impl InquiryOutcome {
    /// The flash message shown after the redirect.
    #[must_use]
    pub fn flash(self) -> Flash {
        match self {
            Self::Sent => Flash::success("Your inquiry has been sent!"),
            Self::NotConfirmed => Flash::notice(
                "Oops, it looks like you need to confirm your email, and try again!",
            ),
            Self::QuotaExceeded => Flash::notice(
                "It looks like you have sent 5 inquiries already, wait for us to get back to you or contact support.",
            ),
        }
    }
}

/// Sends inquiries for confirmed visitors.
pub struct InquiryWorkflow<'a, S, N> {
    store: &'a S,
    notifier: &'a N,
    staff_address: &'a Email,
    upload_dir: Option<&'a Path>,
}

impl<'a, S: UserStore, N: Notifier> InquiryWorkflow<'a, S, N> {
    /// Files are archived to `upload_dir` when it is set.
    #[must_use]
    pub const fn new(
        store: &'a S,
        notifier: &'a N,
        staff_address: &'a Email,
        upload_dir: Option<&'a Path>,
    ) -> Self {
        Self {
            store,
            notifier,
            staff_address,
            upload_dir,
        }
    }

    /// Send an inquiry from `name` at `email` with already validated files.
    ///
    /// A quota slot is taken before sending and given back if sending fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails, archiving fails or the email
    /// cannot be sent.
    #[instrument(skip(self, name, files), fields(email = %email, files = files.len()))]
    pub async fn submit(
        &self,
        name: &str,
        email: &Email,
        files: &[UploadedFile],
    ) -> Result<InquiryOutcome, InquiryError> {
        match self.store.get(email).await? {
            Some(user) if user.email_is_confirmed => {}
            _ => return Ok(InquiryOutcome::NotConfirmed),
        }

        if !self.store.reserve_inquiry(email, Quota::INQUIRIES).await? {
            tracing::info!("Inquiry quota exhausted");
            return Ok(InquiryOutcome::QuotaExceeded);
        }

        if let Err(e) = self.deliver(name, email, files).await {
            if let Err(release_err) = self.store.release_inquiry(email).await {
                tracing::error!(error = %release_err, "Failed to release inquiry slot");
            }
            return Err(e);
        }

        tracing::info!("Inquiry sent");
        Ok(InquiryOutcome::Sent)
    }

    async fn deliver(
        &self,
        name: &str,
        email: &Email,
        files: &[UploadedFile],
    ) -> Result<(), InquiryError> {
        let attachments = prepare_attachments(files);

        if let Some(dir) = self.upload_dir {
            archive_attachments(dir, &attachments).await?;
        }

        let message = OutboundEmail::inquiry(name, email, self.staff_address, attachments)?;
        self.notifier.send(message).await?;
        Ok(())
    }
}

/// Turn uploads into mail attachments with safe file names.
#[must_use]
pub fn prepare_attachments(files: &[UploadedFile]) -> Vec<MailAttachment> {
    files
        .iter()
        .map(|file| MailAttachment {
            filename: secure_filename(&file.filename),
            content_type: file
                .content_type
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            data: file.data.clone(),
        })
        .collect()
}

/// Write each attachment to `dir` under a fresh `<uuid>-<name>`.
///
/// Existing files are never overwritten.
///
/// # Errors
///
/// Returns `InquiryError::Archive` if the directory cannot be created or a
/// file cannot be written.
pub async fn archive_attachments(
    dir: &Path,
    attachments: &[MailAttachment],
) -> Result<Vec<PathBuf>, InquiryError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| InquiryError::Archive {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut written = Vec::with_capacity(attachments.len());
    for attachment in attachments {
        let path = dir.join(format!("{}-{}", Uuid::new_v4(), attachment.filename));
        write_new_file(&path, &attachment.data)
            .await
            .map_err(|source| InquiryError::Archive {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "Archived attachment");
        written.push(path);
    }
    Ok(written)
}

async fn write_new_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn upload(name: &str, content_type: Option<&str>) -> UploadedFile {
        UploadedFile::new(
            name,
            content_type.map(String::from),
            Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0]),
        )
    }

    #[test]
    fn test_prepare_attachments() {
        let attachments = prepare_attachments(&[
            upload("../My Photo.jpg", Some("image/jpeg")),
            upload("scan.png", None),
        ]);

        assert_eq!(attachments[0].filename, "My_Photo.jpg");
        assert_eq!(attachments[0].content_type, "image/jpeg");
        assert_eq!(attachments[0].data.len(), 4);
        assert_eq!(attachments[1].content_type, DEFAULT_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_archive_never_overwrites() {
        let dir = std::env::temp_dir().join(format!("kreddig-archive-{}", Uuid::new_v4()));
        let attachments = prepare_attachments(&[upload("a.jpg", None), upload("a.jpg", None)]);

        let written = archive_attachments(&dir, &attachments).await.unwrap();
        assert_eq!(written.len(), 2);
        assert_ne!(written[0], written[1]);
        for path in &written {
            assert!(path.to_string_lossy().ends_with("-a.jpg"));
            assert_eq!(tokio::fs::read(path).await.unwrap(), [0xFF, 0xD8, 0xFF, 0xE0]);
        }

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[test]
    fn test_outcome_flash() {
        assert_eq!(
            InquiryOutcome::Sent.flash().message,
            "Your inquiry has been sent!"
        );
    }
}
