//! Session lifecycle glue.
//!
//! The [`SessionRegistry`] hands out one [`SessionPageDirectory`] per
//! (session, name) and drives cleanup when the surrounding framework reports
//! that a session ended. It is built once at application start and shut down
//! explicitly at application stop.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::PageCache;
use crate::directory::{DirectoryListener, SessionPageDirectory};
use crate::page::{Page, SessionId};
use crate::Result;

/// Anything that can identify the session it belongs to.
pub trait Session {
    /// Stable session id.
    fn id(&self) -> &SessionId;
}

impl Session for SessionId {
    fn id(&self) -> &SessionId {
        self
    }
}

type Directories<P> = HashMap<String, Arc<SessionPageDirectory<P>>>;

/// Owner of every live directory, keyed by session.
pub struct SessionRegistry<P: Page> {
    cache: Arc<PageCache<P>>,
    sessions: Mutex<HashMap<SessionId, Directories<P>>>,
    listener: Option<Arc<dyn DirectoryListener>>,
}

impl<P: Page> SessionRegistry<P> {
    /// Create a registry whose directories share `cache`.
    pub fn new(cache: Arc<PageCache<P>>) -> Self {
        Self {
            cache,
            sessions: Mutex::new(HashMap::new()),
            listener: None,
        }
    }

    /// Attach `listener` to every directory created from now on.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn DirectoryListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// The shared cache.
    pub fn cache(&self) -> &Arc<PageCache<P>> {
        &self.cache
    }

    /// Directory `name` of `session`, created on first use.
    ///
    /// Concurrent callers asking for the same pair get the same directory.
    pub fn directory(&self, session: &SessionId, name: &str) -> Arc<SessionPageDirectory<P>> {
        let mut sessions = self.sessions.lock();
        let directories = sessions.entry(session.clone()).or_default();
        if let Some(existing) = directories.get(name) {
            return Arc::clone(existing);
        }

        let mut directory =
            SessionPageDirectory::new(session.clone(), name, Arc::clone(&self.cache));
        if let Some(listener) = &self.listener {
            directory = directory.with_listener(Arc::clone(listener));
        }
        let directory = Arc::new(directory);
        directories.insert(name.to_string(), Arc::clone(&directory));
        debug!("registry: created directory {} for {}", name, session);
        directory
    }

    /// Number of sessions with at least one directory.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Unbind `session`: detach its directories, then drop its pages from
    /// cache and store.
    ///
    /// Directories already handed out stay usable for reads but ignore
    /// further puts.
    pub fn unbind(&self, session: &SessionId) -> Result<()> {
        let directories = self.sessions.lock().remove(session);
        if let Some(directories) = directories {
            for directory in directories.values() {
                directory.mark_unbound();
            }
            debug!("registry: detached {} directories of {}", directories.len(), session);
        }
        self.cache.unbind(session)
    }

    /// Session-end notification from the surrounding framework.
    pub fn session_ended(&self, session: &impl Session) -> Result<()> {
        self.unbind(session.id())
    }

    /// Unbind every known session, then shut the cache down.
    ///
    /// Every session is attempted even if one fails; the first error is
    /// returned.
    pub fn shutdown(&self) -> Result<()> {
        let ids: Vec<SessionId> = self.sessions.lock().keys().cloned().collect();
        info!("registry: shutting down, unbinding {} sessions", ids.len());

        let mut first_error = None;
        for id in &ids {
            if let Err(e) = self.unbind(id) {
                warn!("registry: failed to unbind {} during shutdown: {}", id, e);
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.cache.shutdown() {
            first_error.get_or_insert(e);
        }
        first_error.map_or(Ok(()), Err)
    }
}
