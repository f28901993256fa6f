//! Per-session page directory.
//!
//! A [`SessionPageDirectory`] is the namespace a request talks to. It keeps
//! the page it stored last as a fast path for the common "fetch the page I
//! just rendered" lookup and sends everything else to the shared
//! [`PageCache`]. Page ids are scoped to the directory: every cache and store
//! call carries the directory's [`DirectoryName`], so two directories of one
//! session can use the same id without seeing each other's pages.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::cache::PageCache;
use crate::page::{DirectoryName, Page, PageId, SessionId, VersionSelector};
use crate::Result;

/// What [`SessionPageDirectory::put`] did with a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Written to store and cache, and recorded as the last page.
    Stored,
    /// Stateless page; nothing was persisted.
    Stateless,
    /// The session was unbound; nothing was persisted.
    Unbound,
}

impl PutOutcome {
    /// Whether the page reached the store.
    pub const fn is_stored(self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Observer notified after a page has been persisted by a directory.
///
/// The surrounding framework registers one to learn that session state
/// changed, e.g. to schedule session replication.
pub trait DirectoryListener: Send + Sync {
    /// Called after `page` of directory `name` in `session` was stored.
    fn page_stored(&self, session: &SessionId, name: &DirectoryName, id: &PageId, version: u32);
}

impl<F> DirectoryListener for F
where
    F: Fn(&SessionId, &DirectoryName, &PageId, u32) + Send + Sync,
{
    fn page_stored(&self, session: &SessionId, name: &DirectoryName, id: &PageId, version: u32) {
        self(session, name, id, version);
    }
}

/// Page map of one session.
pub struct SessionPageDirectory<P: Page> {
    session: SessionId,
    name: DirectoryName,
    cache: Arc<PageCache<P>>,
    last_page: RwLock<Option<P>>,
    /// Ids this directory has written to the store and not removed since.
    /// Cache eviction does not shrink it; the pages are still in the store.
    stored_ids: Mutex<HashSet<PageId>>,
    bound: AtomicBool,
    listener: Option<Arc<dyn DirectoryListener>>,
}

impl<P: Page> SessionPageDirectory<P> {
    /// Create a directory for `session` backed by `cache`.
    pub fn new(
        session: SessionId,
        name: impl Into<DirectoryName>,
        cache: Arc<PageCache<P>>,
    ) -> Self {
        Self {
            session,
            name: name.into(),
            cache,
            last_page: RwLock::new(None),
            stored_ids: Mutex::new(HashSet::new()),
            bound: AtomicBool::new(true),
            listener: None,
        }
    }

    /// Register the observer notified on every stored page.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn DirectoryListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Session this directory belongs to.
    pub const fn session_id(&self) -> &SessionId {
        &self.session
    }

    /// Directory name, unique within its session.
    pub const fn name(&self) -> &DirectoryName {
        &self.name
    }

    /// Whether the owning session is still bound.
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    /// Id of the page kept on the fast path, if any.
    pub fn last_page_id(&self) -> Option<PageId> {
        self.last_page.read().as_ref().map(|page| page.id().clone())
    }

    /// Persist a page.
    ///
    /// Stateless pages and pages of an unbound session are ignored without
    /// touching cache or store. Store errors propagate unchanged and leave
    /// the fast path as it was.
    pub fn put(&self, page: &P) -> Result<PutOutcome> {
        if page.is_stateless() {
            trace!("directory {}: skipping stateless page {}", self.name, page.id());
            return Ok(PutOutcome::Stateless);
        }
        if !self.is_bound() {
            debug!(
                "directory {}: session {} is unbound, not storing {}",
                self.name,
                self.session,
                page.id()
            );
            return Ok(PutOutcome::Unbound);
        }

        self.cache.store_page(&self.session, &self.name, page)?;
        *self.last_page.write() = Some(page.clone());
        self.stored_ids.lock().insert(page.id().clone());

        if let Some(listener) = &self.listener {
            listener.page_stored(&self.session, &self.name, page.id(), page.current_version());
        }
        Ok(PutOutcome::Stored)
    }

    /// Get exactly the requested version of a page.
    pub fn get(&self, id: &PageId, version: VersionSelector) -> Result<Option<P>> {
        if let Some(page) = self.from_last_page(id, version) {
            trace!("directory {}: fast path for {}@{}", self.name, id, version);
            self.cache.page_accessed(&self.session, &self.name, &page);
            return Ok(Some(page));
        }
        self.cache.get_page(&self.session, &self.name, id, version)
    }

    /// Whether the requested version can be served.
    pub fn contains(&self, id: &PageId, version: VersionSelector) -> Result<bool> {
        if self.from_last_page(id, version).is_some() {
            return Ok(true);
        }
        self.cache.contains_page(&self.session, &self.name, id, version)
    }

    /// Remove a page from this directory, the cache and the store.
    pub fn remove_entry(&self, id: &PageId) -> Result<()> {
        self.forget(id);
        self.cache.remove_page(&self.session, &self.name, id)
    }

    /// Remove every page this directory has stored, including pages the cache
    /// has already evicted. Other directories of the session are untouched.
    ///
    /// Stops at the first store failure; pages not yet removed stay tracked.
    pub fn clear(&self) -> Result<()> {
        let ids: Vec<PageId> = self.stored_ids.lock().iter().cloned().collect();
        debug!("directory {}: clearing {} pages", self.name, ids.len());
        for id in ids {
            self.remove_entry(&id)?;
        }
        Ok(())
    }

    /// Mark the directory unbound and drop its fast path.
    ///
    /// Cache and store cleanup is driven by the session registry, once per
    /// session rather than once per directory.
    pub(crate) fn mark_unbound(&self) {
        self.bound.store(false, Ordering::Release);
        *self.last_page.write() = None;
        self.stored_ids.lock().clear();
    }

    fn forget(&self, id: &PageId) {
        {
            let mut last = self.last_page.write();
            if last.as_ref().is_some_and(|page| page.id() == id) {
                *last = None;
            }
        }
        self.stored_ids.lock().remove(id);
    }

    fn from_last_page(&self, id: &PageId, version: VersionSelector) -> Option<P> {
        let last = self.last_page.read();
        last.as_ref()
            .filter(|page| page.id() == id)
            .and_then(|page| page.resolve(version))
    }
}

impl<P: Page> fmt::Debug for SessionPageDirectory<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPageDirectory")
            .field("session", &self.session)
            .field("name", &self.name)
            .field("last_page", &self.last_page_id())
            .field("bound", &self.is_bound())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::page::VersionedPage;
    use crate::store::{MemoryPageStore, PageStore};
    use crate::Error;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingStore {
        inner: MemoryPageStore<VersionedPage>,
        stores: AtomicUsize,
        gets: AtomicUsize,
        accessed: AtomicUsize,
        fail_writes: AtomicBool,
    }

    impl PageStore<VersionedPage> for CountingStore {
        fn store_page(
            &self,
            session: &SessionId,
            directory: &DirectoryName,
            page: &VersionedPage,
        ) -> Result<()> {
            self.stores.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::Storage("write refused".into()));
            }
            self.inner.store_page(session, directory, page)
        }

        fn get_page(
            &self,
            session: &SessionId,
            directory: &DirectoryName,
            id: &PageId,
            version: VersionSelector,
        ) -> Result<Option<VersionedPage>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get_page(session, directory, id, version)
        }

        fn remove_page(
            &self,
            session: &SessionId,
            directory: &DirectoryName,
            id: &PageId,
        ) -> Result<()> {
            self.inner.remove_page(session, directory, id)
        }

        fn unbind(&self, session: &SessionId) -> Result<()> {
            self.inner.unbind(session)
        }

        fn page_accessed(
            &self,
            _session: &SessionId,
            _directory: &DirectoryName,
            _page: &VersionedPage,
        ) {
            self.accessed.fetch_add(1, Ordering::SeqCst);
        }
    }

    type Fixture = (
        Arc<CountingStore>,
        Arc<PageCache<VersionedPage>>,
        SessionPageDirectory<VersionedPage>,
    );

    fn directory_with(config: CacheConfig) -> Fixture {
        let store = Arc::new(CountingStore::default());
        let cache = Arc::new(PageCache::<VersionedPage>::new(store.clone(), config).unwrap());
        let dir = SessionPageDirectory::new(SessionId::from("sess1"), "main", Arc::clone(&cache));
        (store, cache, dir)
    }

    fn directory() -> Fixture {
        directory_with(CacheConfig::default())
    }

    fn content(page: Option<VersionedPage>) -> Option<String> {
        page.map(|p| p.content().to_string())
    }

    #[test]
    fn test_stateless_put_never_reaches_store() -> Result<()> {
        // Given: A directory and a stateless page
        let (store, cache, dir) = directory();

        // When: Putting it
        let outcome = dir.put(&VersionedPage::stateless("1", "static"))?;

        // Then: Nothing was persisted anywhere
        assert_eq!(outcome, PutOutcome::Stateless);
        assert!(!outcome.is_stored());
        assert_eq!(store.stores.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats().puts, 0);
        assert_eq!(dir.last_page_id(), None);
        Ok(())
    }

    #[test]
    fn test_put_sets_fast_path() -> Result<()> {
        let (store, _cache, dir) = directory();
        let page = VersionedPage::new("42", "A").next_version("B");

        assert_eq!(dir.put(&page)?, PutOutcome::Stored);
        let v0 = dir.get(&PageId::from(42), 0.into())?;
        let v1 = dir.get(&PageId::from(42), 1.into())?;

        assert_eq!(content(v0), Some("A".into()));
        assert_eq!(content(v1), Some("B".into()));
        assert_eq!(dir.last_page_id(), Some(PageId::from(42)));
        assert_eq!(store.accessed.load(Ordering::SeqCst), 2);
        assert_eq!(store.gets.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn test_other_id_skips_fast_path() -> Result<()> {
        let (_store, cache, dir) = directory();
        dir.put(&VersionedPage::new("1", "one"))?;
        dir.put(&VersionedPage::new("2", "two"))?;

        let one = dir.get(&PageId::from(1), 0.into())?;

        assert_eq!(content(one), Some("one".into()));
        assert_eq!(cache.stats().hits, 1);
        Ok(())
    }

    #[test]
    fn test_fast_path_miss_on_version_falls_through() -> Result<()> {
        // Given: The fast path holds v0 but the store has v1
        let (store, _cache, dir) = directory();
        let v0 = VersionedPage::new("42", "A");
        dir.put(&v0)?;
        store.inner.store_page(dir.session_id(), dir.name(), &v0.next_version("B"))?;

        // When: Asking the directory for v1
        let v1 = dir.get(&PageId::from(42), 1.into())?;

        // Then: Cache and store are consulted and return exactly v1
        assert_eq!(content(v1), Some("B".into()));
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn test_remove_entry_clears_every_layer() -> Result<()> {
        let (store, _cache, dir) = directory();
        dir.put(&VersionedPage::new("42", "A").next_version("B"))?;

        dir.remove_entry(&PageId::from(42))?;

        assert_eq!(dir.last_page_id(), None);
        assert!(dir.get(&PageId::from(42), 0.into())?.is_none());
        assert!(dir.get(&PageId::from(42), 1.into())?.is_none());
        assert!(!dir.contains(&PageId::from(42), VersionSelector::Latest)?);
        assert_eq!(store.inner.page_count(), 0);
        Ok(())
    }

    #[test]
    fn test_clear_removes_only_own_pages() -> Result<()> {
        let (store, cache, dir) = directory();
        let other = SessionPageDirectory::new(SessionId::from("sess2"), "main", Arc::clone(&cache));
        dir.put(&VersionedPage::new("1", "a"))?;
        dir.put(&VersionedPage::new("2", "b"))?;
        other.put(&VersionedPage::new("1", "c"))?;

        dir.clear()?;

        assert_eq!(store.inner.len_for(dir.session_id()), 0);
        assert_eq!(store.inner.len_for(other.session_id()), 1);
        assert_eq!(content(other.get(&PageId::from(1), 0.into())?), Some("c".into()));
        Ok(())
    }

    #[test]
    fn test_sibling_directories_keep_their_own_pages() -> Result<()> {
        // Given: Two directories of one session that both store page 1
        for config in [
            CacheConfig::default(),
            CacheConfig {
                max_sessions: 1,
                max_pages_per_session: 1,
            },
        ] {
            let (_store, cache, main) = directory_with(config);
            let popup =
                SessionPageDirectory::new(main.session_id().clone(), "popup", Arc::clone(&cache));
            main.put(&VersionedPage::new("1", "main page"))?;
            popup.put(&VersionedPage::new("1", "popup page"))?;

            // When: main's fast path moves to another page
            main.put(&VersionedPage::new("2", "main other"))?;

            // Then: main still reads its own page 1
            let id = PageId::from(1);
            assert_eq!(content(main.get(&id, 0.into())?), Some("main page".into()));
            assert_eq!(content(popup.get(&id, 0.into())?), Some("popup page".into()));

            // And: Clearing popup leaves main's pages alone
            popup.clear()?;
            assert_eq!(content(main.get(&id, 0.into())?), Some("main page".into()));
            assert!(main.contains(&PageId::from(2), VersionSelector::Latest)?);
            assert!(!popup.contains(&id, VersionSelector::Latest)?);
        }
        Ok(())
    }

    #[test]
    fn test_clear_reaches_pages_evicted_from_cache() -> Result<()> {
        // Given: A directory whose cache holds only one page
        let (store, cache, dir) = directory_with(CacheConfig {
            max_sessions: 1,
            max_pages_per_session: 1,
        });
        for n in 0..4u32 {
            dir.put(&VersionedPage::new(n, format!("page {n}")))?;
        }
        assert_eq!(cache.stats().pages, 1);

        // When: Clearing the directory
        dir.clear()?;

        // Then: Evicted pages are removed from the store as well
        assert_eq!(store.inner.len_for(dir.session_id()), 0);
        for n in 0..4u32 {
            assert!(!dir.contains(&PageId::from(n), VersionSelector::Latest)?);
        }
        Ok(())
    }

    #[test]
    fn test_failed_put_keeps_previous_fast_path() -> Result<()> {
        let (store, _cache, dir) = directory();
        dir.put(&VersionedPage::new("1", "kept"))?;
        store.fail_writes.store(true, Ordering::SeqCst);

        let result = dir.put(&VersionedPage::new("2", "lost"));

        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(dir.last_page_id(), Some(PageId::from(1)));
        Ok(())
    }

    #[test]
    fn test_unbound_directory_ignores_puts() -> Result<()> {
        let (store, _cache, dir) = directory();
        dir.put(&VersionedPage::new("1", "a"))?;

        dir.mark_unbound();
        let outcome = dir.put(&VersionedPage::new("2", "b"))?;

        assert_eq!(outcome, PutOutcome::Unbound);
        assert!(!dir.is_bound());
        assert_eq!(dir.last_page_id(), None);
        assert_eq!(store.stores.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn test_listener_sees_stored_pages() -> Result<()> {
        let seen: Arc<Mutex<Vec<(String, String, u32)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let listener = move |session: &SessionId, name: &DirectoryName, id: &PageId, version: u32| {
            sink.lock()
                .push((format!("{session}/{name}"), id.to_string(), version));
        };
        let (_store, cache, _) = directory();
        let dir = SessionPageDirectory::new(SessionId::from("s9"), "popup", cache)
            .with_listener(Arc::new(listener));

        dir.put(&VersionedPage::new("3", "a").next_version("b"))?;
        dir.put(&VersionedPage::stateless("4", "skip"))?;

        assert_eq!(*seen.lock(), vec![("s9/popup".to_string(), "3".to_string(), 1)]);
        Ok(())
    }
}
