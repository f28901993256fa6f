//! Durable page store contract and the in-memory reference store.
//!
//! A [`PageStore`] persists page chain heads keyed by session id, directory
//! name and page id. Versioning lives entirely inside the page: a store keeps
//! one head per key and answers version lookups through [`Page::resolve`],
//! so it never needs to compact or prune old versions on its own.
//!
//! Real backends (disk, database, replicated stores) implement the trait
//! outside this crate. [`MemoryPageStore`] is the reference implementation
//! used by tests and by applications that only need process-lifetime
//! persistence.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::page::{DirectoryName, Page, PageId, PageKey, SessionId, VersionSelector};
use crate::Result;

/// Pluggable durable backend for pages.
///
/// Every page operation is scoped to one directory of one session; only
/// [`unbind`](PageStore::unbind) spans a whole session.
///
/// Writes must be visible to subsequent calls from any thread of the same
/// process once they return; durability across crashes is best effort.
/// Absence is `Ok(None)` or a no-op, never an error.
pub trait PageStore<P: Page>: Send + Sync {
    /// Persist `page` under `(session, directory, page.id())`, replacing the
    /// previous head.
    fn store_page(&self, session: &SessionId, directory: &DirectoryName, page: &P) -> Result<()>;

    /// Return exactly the requested version of a stored page, if present.
    fn get_page(
        &self,
        session: &SessionId,
        directory: &DirectoryName,
        id: &PageId,
        version: VersionSelector,
    ) -> Result<Option<P>>;

    /// Delete the entry for `id`. No-op when absent.
    fn remove_page(
        &self,
        session: &SessionId,
        directory: &DirectoryName,
        id: &PageId,
    ) -> Result<()>;

    /// Discard every entry of `session`, across all its directories. Called
    /// once, at session end.
    fn unbind(&self, session: &SessionId) -> Result<()>;

    /// Whether the requested version of a page can be served.
    fn contains_page(
        &self,
        session: &SessionId,
        directory: &DirectoryName,
        id: &PageId,
        version: VersionSelector,
    ) -> Result<bool> {
        Ok(self.get_page(session, directory, id, version)?.is_some())
    }

    /// Called when a page is served without a store round-trip.
    ///
    /// Backends that write asynchronously may block here until the write of
    /// `page` has completed.
    fn page_accessed(&self, _session: &SessionId, _directory: &DirectoryName, _page: &P) {}

    /// Release backend resources at application stop.
    fn destroy(&self) -> Result<()> {
        Ok(())
    }
}

/// In-process [`PageStore`] holding the latest head per page key.
pub struct MemoryPageStore<P: Page> {
    sessions: RwLock<HashMap<SessionId, HashMap<PageKey, P>>>,
}

impl<P: Page> MemoryPageStore<P> {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of sessions with at least one stored page.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Total number of stored page heads.
    pub fn page_count(&self) -> usize {
        self.sessions.read().values().map(HashMap::len).sum()
    }

    /// Number of page heads stored for `session`, across its directories.
    pub fn len_for(&self, session: &SessionId) -> usize {
        self.sessions.read().get(session).map_or(0, HashMap::len)
    }

    /// Number of page heads stored in one directory of `session`.
    pub fn len_in(&self, session: &SessionId, directory: &DirectoryName) -> usize {
        self.sessions.read().get(session).map_or(0, |pages| {
            pages.keys().filter(|(name, _)| name == directory).count()
        })
    }
}

impl<P: Page> Default for MemoryPageStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Page> PageStore<P> for MemoryPageStore<P> {
    fn store_page(
        &self,
        session: &SessionId,
        directory: &DirectoryName,
        page: &P,
    ) -> Result<()> {
        self.sessions
            .write()
            .entry(session.clone())
            .or_default()
            .insert((directory.clone(), page.id().clone()), page.clone());
        trace!(
            "memory store: stored {}/{}@v{} for {}",
            directory,
            page.id(),
            page.current_version(),
            session
        );
        Ok(())
    }

    fn get_page(
        &self,
        session: &SessionId,
        directory: &DirectoryName,
        id: &PageId,
        version: VersionSelector,
    ) -> Result<Option<P>> {
        let key = (directory.clone(), id.clone());
        let sessions = self.sessions.read();
        Ok(sessions
            .get(session)
            .and_then(|pages| pages.get(&key))
            .and_then(|head| head.resolve(version)))
    }

    fn remove_page(
        &self,
        session: &SessionId,
        directory: &DirectoryName,
        id: &PageId,
    ) -> Result<()> {
        let key = (directory.clone(), id.clone());
        let mut sessions = self.sessions.write();
        if let Some(pages) = sessions.get_mut(session) {
            pages.remove(&key);
            if pages.is_empty() {
                sessions.remove(session);
            }
        }
        Ok(())
    }

    fn unbind(&self, session: &SessionId) -> Result<()> {
        if let Some(pages) = self.sessions.write().remove(session) {
            debug!("memory store: dropped {} pages for {}", pages.len(), session);
        }
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        self.sessions.write().clear();
        Ok(())
    }
}
