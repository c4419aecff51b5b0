//! Domain models for the site.

pub mod session;
pub mod user;

pub use session::{Flash, FlashKind, session_keys};
pub use user::UserRecord;
