//! Contract with the remote distributed store.
//!
//! The wire client lives outside this crate; everything here talks to it
//! through [`RemoteFs`]. The store's model is deliberately narrow: files are
//! immutable once sealed, so there is no partial write or append — content
//! changes are whole-file replacements.

use std::future::Future;
use std::time::SystemTime;

use tokio::io::AsyncRead;

use crate::error::FsError;

/// Metadata for one remote file, as reported by [`RemoteFs::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    pub size: u64,
    pub mode: u32,
    pub mtime: SystemTime,
}

/// Sequential whole-file writer returned by [`RemoteFs::create`].
pub trait RemoteWriter: Send {
    /// Appends `buf` to the file being uploaded.
    fn write(&mut self, buf: &[u8]) -> impl Future<Output = Result<(), FsError>> + Send;

    /// Seals the file. An error here means the upload must not be trusted.
    fn close(self) -> impl Future<Output = Result<(), FsError>> + Send;
}

/// Primitive operations against the remote store.
///
/// Implementations wrap one backend connection (or pool) and are shared
/// across the whole mount. All paths are absolute, `/`-separated names in
/// the remote namespace.
pub trait RemoteFs: Send + Sync + 'static {
    type Reader: AsyncRead + Unpin + Send;
    type Writer: RemoteWriter;

    fn stat(&self, path: &str) -> impl Future<Output = Result<RemoteStat, FsError>> + Send;

    /// Opens a sequential stream over the file's full content.
    fn open_read(&self, path: &str) -> impl Future<Output = Result<Self::Reader, FsError>> + Send;

    /// Creates (or replaces) the file at `path` with the given mode.
    fn create(
        &self,
        path: &str,
        mode: u32,
    ) -> impl Future<Output = Result<Self::Writer, FsError>> + Send;

    /// Removes the file. Absence is not an error.
    fn remove(&self, path: &str) -> impl Future<Output = Result<(), FsError>> + Send;

    fn chmod(&self, path: &str, mode: u32) -> impl Future<Output = Result<(), FsError>> + Send;

    fn chown(
        &self,
        path: &str,
        uid: u32,
        gid: u32,
    ) -> impl Future<Output = Result<(), FsError>> + Send;

    /// Remaining free capacity in bytes, store-wide.
    fn free_space(&self) -> impl Future<Output = Result<u64, FsError>> + Send;

    /// Drops the current backend connection. The next call reconnects and
    /// may land on a different replica.
    fn reset(&self) -> impl Future<Output = Result<(), FsError>> + Send;
}
