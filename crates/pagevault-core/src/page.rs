//! Page identity and the versioned page contract.
//!
//! A page is an immutable snapshot of server-held UI state. Each mutation
//! produces a new head of the page's version chain; older versions stay
//! reachable through [`Page::version`]. The cache and store only ever hold
//! chain heads and resolve historical versions through this accessor.
//!
//! ## Key Types
//!
//! - [`PageId`]: identifier unique within one directory
//! - [`SessionId`]: partition key for every cache and store layer
//! - [`DirectoryName`]: namespace of page ids within a session
//! - [`VersionSelector`]: an exact version or the latest one
//! - [`Page`]: the contract every stored page satisfies
//! - [`VersionedPage`]: reference page with a string snapshot per version
//!
//! ## Example
//!
//! ```rust
//! use pagevault_core::{Page, PageId, VersionSelector, VersionedPage};
//!
//! let first = VersionedPage::new("42", "A");
//! let second = first.next_version("B");
//!
//! assert_eq!(second.id(), &PageId::from(42));
//! assert_eq!(second.current_version(), 1);
//! assert_eq!(second.version(0).map(|p| p.content().to_string()), Some("A".into()));
//! assert_eq!(
//!     second.resolve(VersionSelector::Latest).map(|p| p.content().to_string()),
//!     Some("B".into()),
//! );
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of a page, unique within its directory.
///
/// Numeric and textual ids share one representation, so `PageId::from(42)`
/// equals `PageId::from("42")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(Arc<str>);

impl PageId {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PageId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for PageId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<u32> for PageId {
    fn from(value: u32) -> Self {
        Self(Arc::from(value.to_string()))
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identifier of a client session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a page directory, unique within its session.
///
/// Page ids only identify a page within one directory, so every cache and
/// store key carries the directory name next to the page id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectoryName(Arc<str>);

impl DirectoryName {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DirectoryName {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for DirectoryName {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for DirectoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of one page head within a session.
pub(crate) type PageKey = (DirectoryName, PageId);

/// Which version of a page a lookup asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSelector {
    /// Exactly this version number, or nothing.
    Exact(u32),
    /// Whatever version is the head of the chain.
    Latest,
}

impl From<u32> for VersionSelector {
    fn from(value: u32) -> Self {
        Self::Exact(value)
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "v{n}"),
            Self::Latest => f.write_str("latest"),
        }
    }
}

/// Contract of a versioned page as seen by the cache and store layers.
///
/// Implementations must be cheap to clone: every layer that holds a page
/// holds its own clone of the chain head.
pub trait Page: Clone + Send + Sync + 'static {
    /// Identifier, stable for the life of the page.
    fn id(&self) -> &PageId;

    /// Version number of this value within its chain.
    fn current_version(&self) -> u32;

    /// The value of version `number`, or `None` when that version is not
    /// reachable from this value. Must never return a different version.
    fn version(&self, number: u32) -> Option<Self>;

    /// Stateless pages are rebuilt from the request and never persisted.
    fn is_stateless(&self) -> bool {
        false
    }

    /// Resolve a [`VersionSelector`] against this value.
    fn resolve(&self, selector: VersionSelector) -> Option<Self> {
        match selector {
            VersionSelector::Latest => Some(self.clone()),
            VersionSelector::Exact(number) if number == self.current_version() => {
                Some(self.clone())
            },
            VersionSelector::Exact(number) => self.version(number),
        }
    }
}

/// Reference [`Page`] keeping one string snapshot per version.
///
/// History is shared between every value of the chain, so cloning and
/// deriving versions never copies snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedPage {
    id: PageId,
    current: u32,
    stateless: bool,
    history: Arc<Vec<Arc<str>>>,
}

impl VersionedPage {
    /// Create version 0 of a page.
    #[must_use]
    pub fn new(id: impl Into<PageId>, content: impl Into<Arc<str>>) -> Self {
        Self {
            id: id.into(),
            current: 0,
            stateless: false,
            history: Arc::new(vec![content.into()]),
        }
    }

    /// Create a page that is never persisted.
    #[must_use]
    pub fn stateless(id: impl Into<PageId>, content: impl Into<Arc<str>>) -> Self {
        Self {
            stateless: true,
            ..Self::new(id, content)
        }
    }

    /// Derive the next version from this one.
    ///
    /// Versions newer than `self` are discarded from the new chain, the same
    /// way an edit after an undo discards the redo history.
    #[must_use]
    pub fn next_version(&self, content: impl Into<Arc<str>>) -> Self {
        let keep = self.current as usize + 1;
        let mut history: Vec<Arc<str>> = self.history.iter().take(keep).cloned().collect();
        history.push(content.into());
        Self {
            id: self.id.clone(),
            current: self.current + 1,
            stateless: self.stateless,
            history: Arc::new(history),
        }
    }

    /// Snapshot of the current version.
    #[must_use]
    pub fn content(&self) -> &str {
        // `current` always indexes into `history` by construction.
        self.history.get(self.current as usize).map_or("", |s| &**s)
    }

    /// Number of versions reachable from this chain.
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.history.len()
    }
}

impl Page for VersionedPage {
    fn id(&self) -> &PageId {
        &self.id
    }

    fn current_version(&self) -> u32 {
        self.current
    }

    fn version(&self, number: u32) -> Option<Self> {
        if (number as usize) < self.history.len() {
            Some(Self {
                current: number,
                ..self.clone()
            })
        } else {
            None
        }
    }

    fn is_stateless(&self) -> bool {
        self.stateless
    }
}
