//! One-shot flash messages kept in the session.
//!
//! A handler pushes a [`Flash`] and redirects; the next rendered page takes
//! every pending flash out of the session and shows it once.

use tower_sessions::Session;

use crate::models::{Flash, session_keys};

/// Queue a flash message for the next page render.
///
/// # Errors
///
/// Returns an error if the session cannot be read or modified.
pub async fn push_flash(session: &Session, flash: Flash) -> Result<(), tower_sessions::session::Error> {
    let mut flashes: Vec<Flash> = session
        .get(session_keys::FLASHES)
        .await?
        .unwrap_or_default();
    flashes.push(flash);
    session.insert(session_keys::FLASHES, flashes).await
}

/// Take every pending flash message out of the session.
///
/// Session errors are logged and treated as "no messages" so a page can
/// always render.
pub async fn take_flashes(session: &Session) -> Vec<Flash> {
    match session.remove::<Vec<Flash>>(session_keys::FLASHES).await {
        Ok(flashes) => flashes.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read flash messages from session");
            Vec::new()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[tokio::test]
    async fn test_flashes_are_taken_once() {
        let session = session();
        push_flash(&session, Flash::success("one")).await.unwrap();
        push_flash(&session, Flash::error("two")).await.unwrap();

        let flashes = take_flashes(&session).await;
        assert_eq!(flashes, vec![Flash::success("one"), Flash::error("two")]);
        assert!(take_flashes(&session).await.is_empty());
    }
}
