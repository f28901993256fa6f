//! # pagevault-core
//!
//! Versioned, per-session page cache for server-side UI frameworks.
//!
//! A page is a snapshot of server-held UI state that carries its own version
//! history. This crate keeps the most recently stored head of every page in
//! a bounded in-process cache and writes every page through to a pluggable
//! durable [`PageStore`]. Cached entries may be evicted at any time; reads
//! fall back to the store, so eviction never loses a page.
//!
//! ## Architecture
//!
//! - **Pages**: [`Page`] contract, identifiers and [`VersionSelector`]; page
//!   keys are (session, [`DirectoryName`], page id)
//! - **Store**: [`PageStore`] backend trait and [`MemoryPageStore`]
//! - **Cache**: [`PageCache`], a two-level LRU write-through decorator
//! - **Directories**: [`SessionPageDirectory`], the per-session namespace with
//!   a last-page fast path
//! - **Sessions**: [`SessionRegistry`] owning directories and driving cleanup
//!   when a session ends
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use pagevault_core::{
//!     CacheConfig, MemoryPageStore, PageCache, PageId, SessionId, SessionRegistry,
//!     VersionedPage,
//! };
//!
//! let store = Arc::new(MemoryPageStore::<VersionedPage>::new());
//! let cache = Arc::new(PageCache::<VersionedPage>::new(store, CacheConfig::default())?);
//! let registry = SessionRegistry::new(cache);
//!
//! let session = SessionId::from("sess1");
//! let pages = registry.directory(&session, "main");
//!
//! let first = VersionedPage::new("42", "A");
//! pages.put(&first)?;
//! pages.put(&first.next_version("B"))?;
//!
//! let old = pages.get(&PageId::from(42), 0.into())?;
//! assert_eq!(old.map(|p| p.content().to_string()), Some("A".to_string()));
//!
//! registry.session_ended(&session)?;
//! # Ok::<(), pagevault_core::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Lookups of absent pages return `Ok(None)`. Errors only come from the
//! store or from configuration and carry a category:
//!
//! ```rust
//! use pagevault_core::Error;
//!
//! let err = Error::Storage("disk full".into());
//! assert_eq!(err.category(), "storage");
//! assert!(err.is_recoverable());
//! ```

/// Two-level write-through page cache
pub mod cache;
/// Cache bounds and configuration loading
pub mod config;
/// Per-session page directories
pub mod directory;
/// Error types and result aliases
pub mod error;
/// Page identity and versioning
pub mod page;
/// Session lifecycle and directory ownership
pub mod session;
/// Durable page store contract
pub mod store;

// Re-export commonly used types
pub use cache::{CacheStatsSummary, PageCache};
pub use config::{CacheConfig, Config};
pub use directory::{DirectoryListener, PutOutcome, SessionPageDirectory};
pub use error::{Error, Result};
pub use page::{DirectoryName, Page, PageId, SessionId, VersionSelector, VersionedPage};
pub use session::{Session, SessionRegistry};
pub use store::{MemoryPageStore, PageStore};
