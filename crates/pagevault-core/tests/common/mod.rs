#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use pagevault_core::{
    CacheConfig, DirectoryName, Error, MemoryPageStore, PageCache, PageId, PageStore, Result,
    SessionId, SessionRegistry, VersionSelector, VersionedPage,
};

/// Store wrapper counting every call that reaches the backend.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryPageStore<VersionedPage>,
    pub stores: AtomicUsize,
    pub gets: AtomicUsize,
    pub removes: AtomicUsize,
    pub unbinds: AtomicUsize,
    pub fail_writes: AtomicBool,
}

#[allow(dead_code)]
impl RecordingStore {
    pub fn stores(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.stores() + self.gets() + self.removes.load(Ordering::SeqCst) + self.unbinds.load(Ordering::SeqCst)
    }
}

impl PageStore<VersionedPage> for RecordingStore {
    fn store_page(
        &self,
        session: &SessionId,
        directory: &DirectoryName,
        page: &VersionedPage,
    ) -> Result<()> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("store offline".into()));
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
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove_page(session, directory, id)
    }

    fn unbind(&self, session: &SessionId) -> Result<()> {
        self.unbinds.fetch_add(1, Ordering::SeqCst);
        self.inner.unbind(session)
    }
}

/// Registry over a recording store with the given bounds.
#[allow(dead_code)]
pub fn registry_with(
    config: CacheConfig,
) -> (Arc<RecordingStore>, SessionRegistry<VersionedPage>) {
    let store = Arc::new(RecordingStore::default());
    let cache = PageCache::<VersionedPage>::new(store.clone(), config).expect("valid config");
    (store, SessionRegistry::new(Arc::new(cache)))
}

#[allow(dead_code)]
pub fn registry() -> (Arc<RecordingStore>, SessionRegistry<VersionedPage>) {
    registry_with(CacheConfig::default())
}

/// Content of a lookup result, for compact assertions.
#[allow(dead_code)]
pub fn content(page: Option<VersionedPage>) -> Option<String> {
    page.map(|p| p.content().to_string())
}
