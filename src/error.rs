//! Error vocabulary shared by every layer of the crate.

use thiserror::Error;

/// Failures surfaced by file nodes, handles and the write buffer.
///
/// Only [`RemoteUnavailable`](FsError::RemoteUnavailable) marks a transport
/// problem worth retrying with a fresh connection; every other variant is a
/// final answer for the operation that produced it.
#[derive(Debug, Error)]
pub enum FsError {
    /// The remote store could not be reached or dropped the connection.
    #[error("remote storage unavailable: {reason}")]
    RemoteUnavailable { reason: String },

    /// The remote path does not exist where the operation required it to.
    #[error("remote path not found: {0}")]
    RemoteNotFound(String),

    /// A staged write would land at or beyond the remote's free capacity.
    #[error("write at offset {offset} exceeds remaining capacity {remaining}")]
    CapacityExceeded { offset: u64, remaining: u64 },

    /// I/O against the local scratch file failed.
    #[error("staging file i/o: {0}")]
    Staging(#[from] std::io::Error),

    /// The remote store rejected the operation for this principal.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The flush retry loop ran past its configured deadline.
    #[error("flush deadline elapsed")]
    FlushTimedOut,

    /// A write or truncate was issued against a read-only handle.
    #[error("handle is not open for writing")]
    ReadOnlyHandle,

    /// The node's parent directory (or the node itself) is gone from the
    /// in-memory tree; the handle outlived the file it belonged to.
    #[error("node detached from directory tree")]
    Detached,
}

impl FsError {
    /// Shorthand for [`FsError::RemoteUnavailable`].
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            reason: reason.into(),
        }
    }

    /// True for failures the flush loop may retry on a fresh connection.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RemoteUnavailable { .. })
    }
}

impl From<FsError> for i32 {
    fn from(value: FsError) -> Self {
        match value {
            FsError::RemoteUnavailable { .. } => libc::ENOTCONN,
            FsError::RemoteNotFound(_) => libc::ENOENT,
            FsError::CapacityExceeded { .. } => libc::ENOSPC,
            FsError::Staging(err) => err.raw_os_error().unwrap_or(libc::EIO),
            FsError::PermissionDenied(_) => libc::EACCES,
            FsError::FlushTimedOut => libc::ETIMEDOUT,
            FsError::ReadOnlyHandle => libc::EBADF,
            FsError::Detached => libc::EBADF,
        }
    }
}
