//! Two-level, write-through page cache in front of a [`PageStore`].
//!
//! Level 1 maps session ids to per-session page maps; level 2 maps
//! (directory, page id) keys to the most recently stored chain head. Both levels are bounded LRU maps
//! sized by [`CacheConfig`], so entries can disappear at any time. Every read
//! therefore falls back to the store on any miss, and every write goes to the
//! store before it reaches the cache.
//!
//! ```rust
//! use std::sync::Arc;
//! use pagevault_core::{
//!     CacheConfig, DirectoryName, MemoryPageStore, PageCache, PageId, SessionId,
//!     VersionedPage,
//! };
//!
//! let store = Arc::new(MemoryPageStore::<VersionedPage>::new());
//! let cache = PageCache::<VersionedPage>::new(store, CacheConfig::default())?;
//! let session = SessionId::from("sess1");
//! let main = DirectoryName::from("main");
//!
//! cache.store_page(&session, &main, &VersionedPage::new("42", "A"))?;
//! let page = cache.get_page(&session, &main, &PageId::from(42), 0.into())?;
//! assert_eq!(page.map(|p| p.content().to_string()), Some("A".to_string()));
//! # Ok::<(), pagevault_core::Error>(())
//! ```

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::config::CacheConfig;
use crate::page::{DirectoryName, Page, PageId, PageKey, SessionId, VersionSelector};
use crate::store::PageStore;
use crate::Result;

/// Page heads cached for one session.
struct SessionPages<P> {
    pages: Mutex<LruCache<PageKey, P>>,
}

impl<P: Page> SessionPages<P> {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            pages: Mutex::new(LruCache::new(capacity)),
        }
    }
}

/// Caching decorator around a [`PageStore`].
///
/// Locks are always taken in the order session map, then per-session page
/// map, and never held across a store call. Lookups and writes release the
/// session map lock before touching a page map; only [`PageCache::stats`]
/// holds both.
pub struct PageCache<P: Page> {
    sessions: Mutex<LruCache<SessionId, Arc<SessionPages<P>>>>,
    store: Arc<dyn PageStore<P>>,
    config: CacheConfig,
    page_capacity: NonZeroUsize,
    stats: CacheStats,
}

impl<P: Page> PageCache<P> {
    /// Create a cache in front of `store`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if a bound is zero.
    pub fn new(store: Arc<dyn PageStore<P>>, config: CacheConfig) -> Result<Self> {
        let session_capacity = config.session_capacity()?;
        let page_capacity = config.page_capacity()?;
        debug!(
            "page cache: up to {} sessions x {} pages",
            config.max_sessions, config.max_pages_per_session
        );
        Ok(Self {
            sessions: Mutex::new(LruCache::new(session_capacity)),
            store,
            config,
            page_capacity,
            stats: CacheStats::default(),
        })
    }

    /// The store this cache writes through to.
    pub fn store(&self) -> &Arc<dyn PageStore<P>> {
        &self.store
    }

    /// Bounds this cache was built with.
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Store a page: write through to the store, then cache the head.
    ///
    /// A failing store leaves the cache untouched and the error is returned
    /// unchanged.
    pub fn store_page(
        &self,
        session: &SessionId,
        directory: &DirectoryName,
        page: &P,
    ) -> Result<()> {
        self.store.store_page(session, directory, page).inspect_err(|e| {
            debug!(
                "page cache: store_page {}/{} for {} failed ({}): {}",
                directory,
                page.id(),
                session,
                e.category(),
                e
            );
        })?;

        let pages = self.session_pages_or_insert(session);
        let key = (directory.clone(), page.id().clone());
        let displaced = pages.pages.lock().push(key.clone(), page.clone());
        if let Some((evicted, _)) = displaced {
            if evicted != key {
                self.stats.page_evictions.fetch_add(1, Ordering::Relaxed);
                trace!("page cache: evicted page {}/{} of {}", evicted.0, evicted.1, session);
            }
        }
        self.stats.puts.fetch_add(1, Ordering::Relaxed);
        trace!(
            "page cache: stored {}/{}@v{} for {}",
            directory,
            page.id(),
            page.current_version(),
            session
        );
        Ok(())
    }

    /// Get exactly the requested version of a page.
    ///
    /// Served from the cached head when it can resolve `version`, otherwise
    /// from the store. Store results are not copied into the cache.
    pub fn get_page(
        &self,
        session: &SessionId,
        directory: &DirectoryName,
        id: &PageId,
        version: VersionSelector,
    ) -> Result<Option<P>> {
        self.stats.requests.fetch_add(1, Ordering::Relaxed);

        if let Some(page) = self.cached(session, directory, id, version) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            trace!("page cache: hit {}/{}@{} for {}", directory, id, version, session);
            return Ok(Some(page));
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        trace!("page cache: miss {}/{}@{} for {}, asking store", directory, id, version, session);
        self.store.get_page(session, directory, id, version)
    }

    /// Whether the requested version can be served by cache or store.
    pub fn contains_page(
        &self,
        session: &SessionId,
        directory: &DirectoryName,
        id: &PageId,
        version: VersionSelector,
    ) -> Result<bool> {
        if self.cached(session, directory, id, version).is_some() {
            return Ok(true);
        }
        self.store.contains_page(session, directory, id, version)
    }

    /// Remove a page from the cache and the store.
    ///
    /// The cache entry goes first so a failing store can never leave a
    /// cached copy of a page the caller asked to remove.
    pub fn remove_page(
        &self,
        session: &SessionId,
        directory: &DirectoryName,
        id: &PageId,
    ) -> Result<()> {
        let pages = self.sessions.lock().peek(session).cloned();
        if let Some(pages) = pages {
            let key = (directory.clone(), id.clone());
            if pages.pages.lock().pop(&key).is_some() {
                trace!("page cache: dropped cached {}/{} of {}", directory, id, session);
            }
        }
        self.stats.removals.fetch_add(1, Ordering::Relaxed);
        self.store.remove_page(session, directory, id)
    }

    /// Drop everything cached for `session`, in every directory, and unbind
    /// it in the store.
    pub fn unbind(&self, session: &SessionId) -> Result<()> {
        let dropped = self.sessions.lock().pop(session);
        match dropped {
            Some(pages) => info!(
                "page cache: unbound {} ({} cached pages dropped)",
                session,
                pages.pages.lock().len()
            ),
            None => info!("page cache: unbound {} (nothing cached)", session),
        }
        self.store.unbind(session)
    }

    /// Forward a fast-path access notification to the store.
    pub fn page_accessed(&self, session: &SessionId, directory: &DirectoryName, page: &P) {
        self.store.page_accessed(session, directory, page);
    }

    /// Drop every cached map. The store is not touched.
    pub fn clear(&self) {
        self.sessions.lock().clear();
    }

    /// Clear the cache and destroy the store at application stop.
    pub fn shutdown(&self) -> Result<()> {
        let stats = self.stats();
        info!(
            "page cache: shutting down with {} sessions, {} pages cached (hit rate {:.2})",
            stats.sessions, stats.pages, stats.hit_rate
        );
        self.clear();
        self.store.destroy()
    }

    /// Snapshot of cache counters and current occupancy.
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStatsSummary {
        let (sessions, pages) = {
            let sessions = self.sessions.lock();
            let pages = sessions
                .iter()
                .map(|(_, session)| session.pages.lock().len())
                .sum::<usize>();
            (sessions.len(), pages)
        };

        let requests = self.stats.requests.load(Ordering::Relaxed);
        let hits = self.stats.hits.load(Ordering::Relaxed);
        CacheStatsSummary {
            requests,
            hits,
            misses: self.stats.misses.load(Ordering::Relaxed),
            puts: self.stats.puts.load(Ordering::Relaxed),
            removals: self.stats.removals.load(Ordering::Relaxed),
            session_evictions: self.stats.session_evictions.load(Ordering::Relaxed),
            page_evictions: self.stats.page_evictions.load(Ordering::Relaxed),
            sessions,
            pages,
            hit_rate: if requests > 0 {
                hits as f64 / requests as f64
            } else {
                0.0
            },
        }
    }

    fn cached(
        &self,
        session: &SessionId,
        directory: &DirectoryName,
        id: &PageId,
        version: VersionSelector,
    ) -> Option<P> {
        let pages = self.sessions.lock().get(session).cloned()?;
        let key = (directory.clone(), id.clone());
        let head = pages.pages.lock().get(&key).cloned()?;
        head.resolve(version)
    }

    /// Find the session's map or install a new one.
    ///
    /// Creation happens under the session map lock, so concurrent writers for
    /// a new session all end up with the same map.
    fn session_pages_or_insert(&self, session: &SessionId) -> Arc<SessionPages<P>> {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(session) {
            return Arc::clone(existing);
        }

        let created = Arc::new(SessionPages::new(self.page_capacity));
        if let Some((evicted, _)) = sessions.push(session.clone(), Arc::clone(&created)) {
            self.stats.session_evictions.fetch_add(1, Ordering::Relaxed);
            debug!("page cache: evicted cached pages of session {}", evicted);
        }
        created
    }
}

/// Cache counters
#[derive(Default)]
struct CacheStats {
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    removals: AtomicU64,
    session_evictions: AtomicU64,
    page_evictions: AtomicU64,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatsSummary {
    /// Total `get_page` calls.
    pub requests: u64,
    /// Lookups answered from a cached head.
    pub hits: u64,
    /// Lookups that fell through to the store.
    pub misses: u64,
    /// Successful `store_page` calls.
    pub puts: u64,
    /// `remove_page` calls.
    pub removals: u64,
    /// Per-session maps evicted to respect `max_sessions`.
    pub session_evictions: u64,
    /// Page heads evicted to respect `max_pages_per_session`.
    pub page_evictions: u64,
    /// Sessions currently holding a cached map.
    pub sessions: usize,
    /// Page heads currently cached across all sessions.
    pub pages: usize,
    /// `hits / requests`, or 0 before the first request.
    pub hit_rate: f64,
}
