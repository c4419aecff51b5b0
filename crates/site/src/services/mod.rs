//! Business logic services.
//!
//! # Services
//!
//! - `token` - Signed, time-limited confirmation tokens
//! - `sniff` - File type detection from leading bytes
//! - `uploads` - Inquiry upload validation
//! - `email` - Outbound email (`Notifier` trait, SMTP service)
//! - `confirmation` - Email confirmation workflow
//! - `inquiry` - Inquiry workflow

pub mod confirmation;
pub mod email;
pub mod inquiry;
pub mod sniff;
pub mod token;
pub mod uploads;

pub use confirmation::{
    ConfirmationError, ConfirmationRequestOutcome, ConfirmationWorkflow, LinkConfirmation,
};
pub use email::{EmailError, EmailService, MailAttachment, Notifier, OutboundEmail};
pub use inquiry::{InquiryError, InquiryOutcome, InquiryWorkflow};
pub use token::{TokenCodec, TokenError};
pub use uploads::{UploadViolation, UploadedFile};
