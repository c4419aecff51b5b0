//! Core types for kreddig.
//!
//! This module provides type-safe wrappers for the domain concepts shared
//! between the site and the CLI.

pub mod email;
pub mod quota;
pub mod status;

pub use email::{Email, EmailError};
pub use quota::Quota;
pub use status::ConfirmationState;
