//! Local write staging and the retrying whole-file flush engine.

use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use crate::error::FsError;
use crate::fs::context::FsContext;
use crate::fs::node::FileNode;
use crate::remote::{RemoteFs, RemoteWriter};
use crate::retry::{FlushDriver, FlushStep};

/// Staged content for one writable handle.
///
/// The scratch file always holds the full intended remote content: the last
/// flushed baseline plus every write since. The remote store only supports
/// whole-file replacement, so a flush re-uploads the entire scratch file.
pub struct WriteBuffer<R: RemoteFs> {
    ctx: Arc<FsContext<R>>,
    staging: Option<File>,
    /// Removes the scratch file when dropped or explicitly closed.
    staging_path: Option<TempPath>,
    /// Bytes staged since the last completed flush dispatch.
    dirty_bytes: u64,
}

/// Invalidates the node's attribute cache when the flush path reaches a
/// final answer, success and failure alike: the remote file was (possibly
/// partially) recreated, so the cached size and mtime can no longer be
/// trusted.
struct InvalidateGuard<'a, R: RemoteFs> {
    node: &'a FileNode<R>,
}

impl<R: RemoteFs> Drop for InvalidateGuard<'_, R> {
    fn drop(&mut self) {
        self.node.invalidate_attribute_cache();
    }
}

impl<R: RemoteFs> WriteBuffer<R> {
    /// Builds the staging area for a newly opened writable handle.
    ///
    /// New files are established remotely up front (remove, create, seal
    /// empty) so existence and mode are settled before any buffering.
    /// Pre-existing files are seeded with their full remote content; a stat
    /// miss demotes the open to an effectively-new empty file, but a failed
    /// content copy aborts the open — flushing a partially seeded buffer
    /// would silently truncate the remote tail.
    pub(crate) async fn create(node: &FileNode<R>, new_file: bool) -> Result<Self, FsError> {
        let ctx = Arc::clone(node.ctx());
        let path = node.absolute_path()?;
        debug!(path = %path, new_file, "creating write buffer");

        if new_file {
            ctx.remote().remove(&path).await?;
            let writer = ctx.remote().create(&path, node.cached_mode()).await?;
            writer.close().await?;
        }

        tokio::fs::create_dir_all(&ctx.config().staging_dir).await?;
        let tmp = tempfile::Builder::new()
            .prefix("stage-")
            .tempfile_in(&ctx.config().staging_dir)?;
        let (std_file, staging_path) = tmp.into_parts();
        let mut staging = File::from_std(std_file);

        if !new_file {
            match ctx.remote().stat(&path).await {
                Err(err) => {
                    // Recoverable: proceed as a new empty file.
                    warn!(path = %path, error = %err, "cannot stat remote file, staging starts empty");
                }
                Ok(stat) => {
                    debug!(path = %path, size = stat.size, "seeding staging file from remote content");
                    let mut reader = ctx.remote().open_read(&path).await?;
                    tokio::io::copy(&mut reader, &mut staging).await?;
                }
            }
        }

        Ok(Self {
            ctx,
            staging: Some(staging),
            staging_path: Some(staging_path),
            dirty_bytes: 0,
        })
    }

    /// Bytes staged since the last flush was dispatched.
    pub fn dirty_bytes(&self) -> u64 {
        self.dirty_bytes
    }

    fn staging(&mut self) -> Result<&mut File, FsError> {
        self.staging
            .as_mut()
            .ok_or_else(|| FsError::Staging(std::io::Error::from_raw_os_error(libc::EBADF)))
    }

    /// Stages `data` at byte `offset`.
    ///
    /// Capacity is checked per write against the remote's reported free
    /// space. A failed capacity query fails open: the write is accepted and
    /// the flush will surface any real shortage.
    pub(crate) async fn write(&mut self, offset: u64, data: &[u8]) -> Result<usize, FsError> {
        match self.ctx.remote().free_space().await {
            Ok(remaining) if offset >= remaining => {
                warn!(offset, remaining, "write rejected, would exceed remote capacity");
                return Err(FsError::CapacityExceeded { offset, remaining });
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "free-space query failed, accepting write anyway");
            }
        }

        let file = self.staging()?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        self.dirty_bytes += data.len() as u64;
        Ok(data.len())
    }

    /// Positioned read of staged bytes. Reads past the staged length come
    /// back short (or empty), like any regular file.
    pub(crate) async fn read(&mut self, offset: u64, size: usize) -> Result<Bytes, FsError> {
        let file = self.staging()?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }

    /// Truncates the staged content to `size`.
    pub(crate) async fn truncate(&mut self, size: u64) -> Result<(), FsError> {
        self.staging()?.set_len(size).await?;
        // A pure truncate changes remote content too; make sure the next
        // flush actually runs.
        self.dirty_bytes = self.dirty_bytes.max(1);
        Ok(())
    }

    /// Drains staged content to the remote store.
    ///
    /// Zero staged bytes is a successful no-op with no remote traffic.
    /// Otherwise the dirty counter resets before the first remote call, so
    /// writes racing the upload accumulate toward the next flush. Transient
    /// failures are retried with a connection reset and a fixed backoff per
    /// granted retry; the whole loop is bounded by the configured deadline.
    #[instrument(skip(self, node), fields(dirty = self.dirty_bytes))]
    pub(crate) async fn flush(&mut self, node: &FileNode<R>) -> Result<(), FsError> {
        if self.dirty_bytes == 0 {
            return Ok(());
        }
        self.dirty_bytes = 0;

        let path = node.absolute_path()?;
        info!(path = %path, "flushing staged content");
        let guard = InvalidateGuard { node };
        let deadline = self.ctx.config().flush_deadline();
        let result = match tokio::time::timeout(deadline, self.flush_with_retry(node, &path)).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(path = %path, ?deadline, "flush deadline elapsed");
                Err(FsError::FlushTimedOut)
            }
        };
        drop(guard);
        result
    }

    async fn flush_with_retry(&mut self, node: &FileNode<R>, path: &str) -> Result<(), FsError> {
        let mut driver = FlushDriver::new(self.ctx.retry(), self.ctx.config().flush_backoff());
        loop {
            let outcome = self.flush_attempt(node, path).await;
            let step = match &outcome {
                Ok(()) => driver.on_attempt("flush", Ok(())),
                Err(err) => driver.on_attempt("flush", Err(err)),
            };
            match step {
                FlushStep::Done | FlushStep::Fail => return outcome,
                FlushStep::RetryAfter(backoff) => {
                    // Fresh connection, possibly a different replica, before
                    // the next try.
                    if let Err(err) = self.ctx.remote().reset().await {
                        warn!(error = %err, "backend connection reset failed");
                    }
                    tokio::time::sleep(backoff).await;
                    driver.resume();
                }
            }
        }
    }

    /// One whole-file re-upload: remove, recreate with the node's current
    /// mode, stream the scratch file front to back, seal.
    async fn flush_attempt(&mut self, node: &FileNode<R>, path: &str) -> Result<(), FsError> {
        let ctx = Arc::clone(&self.ctx);
        let chunk = ctx.config().upload_chunk_bytes();
        let mode = node.cached_mode();

        ctx.remote().remove(path).await?;
        let mut writer = ctx.remote().create(path, mode).await?;

        let file = self.staging()?;
        file.seek(SeekFrom::Start(0)).await?;
        let mut buf = vec![0u8; chunk];
        loop {
            let read = match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    // Treated as end of stream, matching a plain copy loop.
                    warn!(path = %path, error = %err, "scratch read error during flush, ending copy");
                    break;
                }
            };
            if let Err(err) = writer.write(&buf[..read]).await {
                let _ = writer.close().await;
                return Err(err);
            }
        }
        writer.close().await
    }

    /// Closes and deletes the scratch file. Never flushes; callers decide
    /// whether pending bytes go out first.
    pub(crate) async fn close(&mut self) {
        drop(self.staging.take());
        if let Some(path) = self.staging_path.take() {
            if let Err(err) = path.close() {
                warn!(error = %err, "failed to remove scratch file");
            }
        }
    }
}
