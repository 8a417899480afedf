//! One open session on a file node.

use std::sync::{Arc, Weak};

use bitflags::bitflags;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::FsError;
use crate::fs::node::FileNode;
use crate::fs::write_buffer::WriteBuffer;
use crate::remote::RemoteFs;

bitflags! {
    /// Open intent for [`FileNode::open`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// The handle accepts writes; a write buffer is attached.
        const WRITE = 1 << 0;
        /// The remote file is being created rather than reopened.
        const CREATE = 1 << 1;
    }
}

/// What a handle can do, enforced by the type rather than runtime flag
/// checks: only the `Writable` variant carries a buffer to flush or
/// truncate.
pub(crate) enum HandleKind<R: RemoteFs> {
    ReadOnly,
    Writable(Mutex<WriteBuffer<R>>),
}

/// One `open()` session against a [`FileNode`].
///
/// Owned by the node's handle registry and addressed by its numeric `fh`.
/// Holds the node weakly — ownership flows from the directory tree down,
/// never back up.
pub struct FileHandle<R: RemoteFs> {
    fh: u64,
    node: Weak<FileNode<R>>,
    kind: HandleKind<R>,
}

impl<R: RemoteFs> std::fmt::Debug for FileHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("fh", &self.fh)
            .field("writable", &self.is_writable())
            .finish()
    }
}

impl<R: RemoteFs> FileHandle<R> {
    pub(crate) fn new(fh: u64, node: Weak<FileNode<R>>, kind: HandleKind<R>) -> Self {
        Self { fh, node, kind }
    }

    pub fn fh(&self) -> u64 {
        self.fh
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.kind, HandleKind::Writable(_))
    }

    fn node(&self) -> Result<Arc<FileNode<R>>, FsError> {
        self.node.upgrade().ok_or(FsError::Detached)
    }

    fn buffer(&self) -> Result<&Mutex<WriteBuffer<R>>, FsError> {
        match &self.kind {
            HandleKind::Writable(buffer) => Ok(buffer),
            HandleKind::ReadOnly => Err(FsError::ReadOnlyHandle),
        }
    }

    /// Stages `data` at `offset`. Rejected on read-only handles.
    pub async fn write(&self, offset: u64, data: &[u8]) -> Result<usize, FsError> {
        self.buffer()?.lock().await.write(offset, data).await
    }

    /// Reads staged bytes back. This gives same-handle read-after-write
    /// consistency only; read-only handles are served straight from the
    /// remote by the layer above, not through here.
    pub async fn read(&self, offset: u64, size: usize) -> Result<Bytes, FsError> {
        self.buffer()?.lock().await.read(offset, size).await
    }

    /// Drains staged writes to the remote store. A no-op for read-only
    /// handles and for writable handles with nothing staged.
    pub async fn flush(&self) -> Result<(), FsError> {
        let HandleKind::Writable(buffer) = &self.kind else {
            return Ok(());
        };
        let node = self.node()?;
        buffer.lock().await.flush(&node).await
    }

    /// Kernel fsync lands here; same durability contract as flush.
    pub async fn fsync(&self) -> Result<(), FsError> {
        self.flush().await
    }

    /// Truncates the staged content; reflected remotely on the next flush.
    pub async fn truncate(&self, size: u64) -> Result<(), FsError> {
        self.buffer()?.lock().await.truncate(size).await
    }

    /// Flushes pending data, then tears the handle down.
    ///
    /// The scratch file is removed and the handle deregistered even when the
    /// flush fails; the failure is still returned so the caller sees that
    /// staged bytes were lost.
    #[instrument(skip(self), fields(fh = self.fh))]
    pub async fn release(&self) -> Result<(), FsError> {
        let flushed = match (&self.kind, self.node.upgrade()) {
            (HandleKind::Writable(buffer), Some(node)) => {
                let mut buffer = buffer.lock().await;
                let result = buffer.flush(&node).await;
                buffer.close().await;
                result
            }
            (HandleKind::Writable(buffer), None) => {
                buffer.lock().await.close().await;
                Err(FsError::Detached)
            }
            (HandleKind::ReadOnly, _) => Ok(()),
        };
        if let Some(node) = self.node.upgrade() {
            node.close_handle(self.fh);
        }
        debug!(ok = flushed.is_ok(), "handle released");
        flushed
    }
}
