//! Parent-directory contract.

use async_trait::async_trait;

use crate::error::FsError;
use crate::fs::attrs::Attributes;

/// The directory node a file hangs off of.
///
/// File nodes hold this behind a `Weak` reference: the directory tree owns
/// its files, never the other way around, and a file's absolute path is
/// recomputed through the parent on demand so upstream renames never leave a
/// stored path stale.
#[async_trait]
pub trait DirNode: Send + Sync {
    /// Absolute path of this directory in the remote namespace.
    fn absolute_path(&self) -> String;

    /// Re-resolves one child's metadata from the remote store.
    async fn lookup_attributes(&self, name: &str) -> Result<Attributes, FsError>;
}

/// Joins a directory path and a child name in the `/`-separated remote
/// namespace.
pub(crate) fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}
