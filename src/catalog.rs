use std::fmt;
use std::io::Read;

use crate::Result;
use crate::media::{Collection, MediaItem, Representation};

/// A resolved item together with every representation the catalog offers for it.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub item: MediaItem,
    pub representations: Vec<Representation>,
}

/// A readable byte stream opened by the catalog.
pub struct RemoteStream {
    pub reader: Box<dyn Read + Send>,
    /// Total length, when the remote reports one. `None` (or zero) disables percentage reporting.
    pub total_bytes: Option<u64>,
}

impl RemoteStream {
    pub fn new(reader: impl Read + Send + 'static, total_bytes: Option<u64>) -> Self {
        Self {
            reader: Box::new(reader),
            total_bytes,
        }
    }
}

impl fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStream")
            .field("total_bytes", &self.total_bytes)
            .finish_non_exhaustive()
    }
}

/// Pluggable media catalog used by [`crate::Pipeline`].
///
/// A catalog turns a normalized identifier into a [`MediaItem`] and its [`Representation`]s,
/// lists collection members, and opens byte streams. The pipeline makes a single pass: it never
/// retries a catalog failure.
///
/// Implementations are shared across worker threads, hence `Send + Sync`.
pub trait Catalog: Send + Sync {
    /// Resolve a single item and its representations.
    fn resolve(&self, url: &str) -> Result<Resolved>;

    /// List the members of a collection, in catalog order.
    fn resolve_collection(&self, url: &str) -> Result<Collection>;

    /// Open the byte stream behind a representation.
    fn open(&self, representation: &Representation) -> Result<RemoteStream>;

    /// Open the item's thumbnail image.
    fn open_thumbnail(&self, item: &MediaItem) -> Result<RemoteStream>;
}

impl<C: Catalog + ?Sized> Catalog for std::sync::Arc<C> {
    fn resolve(&self, url: &str) -> Result<Resolved> {
        (**self).resolve(url)
    }

    fn resolve_collection(&self, url: &str) -> Result<Collection> {
        (**self).resolve_collection(url)
    }

    fn open(&self, representation: &Representation) -> Result<RemoteStream> {
        (**self).open(representation)
    }

    fn open_thumbnail(&self, item: &MediaItem) -> Result<RemoteStream> {
        (**self).open_thumbnail(item)
    }
}
