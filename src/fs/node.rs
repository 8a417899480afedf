//! The in-memory representation of one remote file.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, instrument, warn};

use crate::error::FsError;
use crate::fs::attrs::{AttrCache, Attributes};
use crate::fs::context::FsContext;
use crate::fs::dir::{DirNode, join_path};
use crate::fs::handle::{FileHandle, HandleKind, OpenFlags};
use crate::fs::write_buffer::WriteBuffer;
use crate::remote::RemoteFs;

/// The open handles of one node, keyed by handle number.
///
/// Only add, remove and snapshot are exposed; the backing map never leaks.
/// Iteration is in ascending handle order, which fixes the fan-out order
/// for fsync and truncate.
struct HandleRegistry<R: RemoteFs> {
    handles: BTreeMap<u64, Arc<FileHandle<R>>>,
}

impl<R: RemoteFs> HandleRegistry<R> {
    fn new() -> Self {
        Self {
            handles: BTreeMap::new(),
        }
    }

    fn insert(&mut self, handle: Arc<FileHandle<R>>) {
        let prior = self.handles.insert(handle.fh(), handle);
        debug_assert!(prior.is_none(), "handle number reused");
    }

    fn remove(&mut self, fh: u64) -> Option<Arc<FileHandle<R>>> {
        self.handles.remove(&fh)
    }

    fn snapshot(&self) -> Vec<Arc<FileHandle<R>>> {
        self.handles.values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.handles.len()
    }
}

/// One file in the mounted tree.
///
/// Owns its open handles through the registry; holds its parent weakly so
/// the directory tree remains the single owner of the hierarchy.
pub struct FileNode<R: RemoteFs> {
    ctx: Arc<FsContext<R>>,
    parent: Weak<dyn DirNode>,
    attrs: Mutex<AttrCache>,
    registry: Mutex<HandleRegistry<R>>,
}

impl<R: RemoteFs> FileNode<R> {
    pub fn new(
        ctx: Arc<FsContext<R>>,
        parent: Weak<dyn DirNode>,
        attrs: Attributes,
    ) -> Arc<Self> {
        let now = ctx.clock().now();
        let ttl = ctx.config().attr_ttl();
        Arc::new(Self {
            parent,
            attrs: Mutex::new(AttrCache::new(attrs, now, ttl)),
            registry: Mutex::new(HandleRegistry::new()),
            ctx,
        })
    }

    pub(crate) fn ctx(&self) -> &Arc<FsContext<R>> {
        &self.ctx
    }

    fn attrs_lock(&self) -> MutexGuard<'_, AttrCache> {
        self.attrs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_lock(&self) -> MutexGuard<'_, HandleRegistry<R>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn parent(&self) -> Result<Arc<dyn DirNode>, FsError> {
        self.parent.upgrade().ok_or(FsError::Detached)
    }

    /// Absolute remote path, composed on demand from the parent chain.
    pub fn absolute_path(&self) -> Result<String, FsError> {
        let parent = self.parent()?;
        let name = self.attrs_lock().attrs().name.clone();
        Ok(join_path(&parent.absolute_path(), &name))
    }

    /// Current attribute snapshot, re-resolved through the parent when the
    /// cached one has expired.
    ///
    /// The expiry check and the refetch run outside any long-held lock;
    /// racing readers may each refetch, which is idempotent.
    #[instrument(skip(self))]
    pub async fn get_attributes(&self) -> Result<Attributes, FsError> {
        let (expired, name) = {
            let cache = self.attrs_lock();
            let expired = cache.is_expired(self.ctx.clock().now());
            (expired, cache.attrs().name.clone())
        };
        if expired {
            debug!(name = %name, "attribute cache expired, re-resolving through parent");
            let fresh = self.parent()?.lookup_attributes(&name).await?;
            let now = self.ctx.clock().now();
            self.attrs_lock()
                .refresh(fresh, now, self.ctx.config().attr_ttl());
        }
        Ok(self.attrs_lock().attrs().clone())
    }

    /// Forces the next [`get_attributes`](Self::get_attributes) to refetch.
    ///
    /// Called after every operation whose remote effect bypasses the cached
    /// snapshot, notably a completed flush (the file is recreated, changing
    /// its size and mtime).
    pub fn invalidate_attribute_cache(&self) {
        let now = self.ctx.clock().now();
        self.attrs_lock().invalidate(now);
    }

    /// Cached mode, read without refreshing. The flush path recreates the
    /// remote file with this.
    pub(crate) fn cached_mode(&self) -> u32 {
        self.attrs_lock().attrs().mode
    }

    /// Opens a new handle on this node.
    ///
    /// The write buffer (and its potentially slow remote seed read) is built
    /// before the registry lock is taken; the lock covers only the insert,
    /// so a stalled seed never blocks other opens on the same node.
    #[instrument(skip(self))]
    pub async fn open(self: &Arc<Self>, flags: OpenFlags) -> Result<Arc<FileHandle<R>>, FsError> {
        let kind = if flags.contains(OpenFlags::WRITE) {
            let buffer =
                WriteBuffer::create(self.as_ref(), flags.contains(OpenFlags::CREATE)).await?;
            HandleKind::Writable(tokio::sync::Mutex::new(buffer))
        } else {
            HandleKind::ReadOnly
        };
        let handle = Arc::new(FileHandle::new(
            self.ctx.allocate_fh(),
            Arc::downgrade(self),
            kind,
        ));
        self.registry_lock().insert(Arc::clone(&handle));
        debug!(fh = handle.fh(), writable = handle.is_writable(), "handle opened");
        Ok(handle)
    }

    /// Deregisters a handle. Idempotent; releasing twice is harmless.
    pub fn close_handle(&self, fh: u64) {
        self.registry_lock().remove(fh);
    }

    /// Number of currently open handles.
    pub fn open_handle_count(&self) -> usize {
        self.registry_lock().len()
    }

    /// Flushes every open handle, best effort.
    ///
    /// The handle list is snapshotted under the registry lock and the
    /// flushes run outside it, in ascending handle order. Every handle is
    /// attempted even after a failure; the last failure is returned.
    #[instrument(skip(self))]
    pub async fn fsync(&self) -> Result<(), FsError> {
        let handles = self.registry_lock().snapshot();
        debug!(handles = handles.len(), "dispatching fsync to open handles");
        let mut last_err = None;
        for handle in handles {
            if let Err(err) = handle.flush().await {
                warn!(fh = handle.fh(), error = %err, "fsync failed for handle");
                last_err = Some(err);
            }
        }
        match last_err {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Truncates through every writable handle, best effort, with the same
    /// reporting policy as [`fsync`](Self::fsync). Read-only handles are
    /// skipped.
    #[instrument(skip(self))]
    pub async fn set_size(&self, size: u64) -> Result<(), FsError> {
        let handles = self.registry_lock().snapshot();
        let mut last_err = None;
        for handle in handles.into_iter().filter(|h| h.is_writable()) {
            if let Err(err) = handle.truncate(size).await {
                warn!(fh = handle.fh(), error = %err, "truncate failed for handle");
                last_err = Some(err);
            }
        }
        match last_err {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Changes the remote mode. The cached snapshot is updated in place on
    /// success and left untouched on failure.
    #[instrument(skip(self))]
    pub async fn set_mode(&self, mode: u32) -> Result<(), FsError> {
        let path = self.absolute_path()?;
        self.ctx.remote().chmod(&path, mode).await?;
        self.attrs_lock().attrs_mut().mode = mode;
        Ok(())
    }

    /// Changes the remote owner.
    ///
    /// Username resolution is diagnostics only: an unknown or unresolvable
    /// uid is logged and the backend call still goes out with the numeric
    /// ids.
    #[instrument(skip(self))]
    pub async fn set_owner(&self, uid: u32, gid: u32) -> Result<(), FsError> {
        let path = self.absolute_path()?;
        match nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid)) {
            Ok(Some(user)) => debug!(user = %user.name, uid, gid, "changing owner"),
            Ok(None) => warn!(uid, gid, "no username for uid, proceeding with numeric ids"),
            Err(err) => {
                warn!(uid, gid, error = %err, "uid lookup failed, proceeding with numeric ids");
            }
        }
        self.ctx.remote().chown(&path, uid, gid).await?;
        let mut cache = self.attrs_lock();
        let attrs = cache.attrs_mut();
        attrs.uid = uid;
        attrs.gid = gid;
        Ok(())
    }
}
