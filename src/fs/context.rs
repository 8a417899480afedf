//! Shared per-mount state threaded through nodes, handles and buffers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::clock::Clock;
use crate::config::MountConfig;
use crate::remote::RemoteFs;
use crate::retry::RetryPolicy;

/// Everything a node needs from its mount: the backend accessor, the clock,
/// the retry policy and the configuration, plus the handle-number allocator.
pub struct FsContext<R: RemoteFs> {
    remote: Arc<R>,
    clock: Arc<dyn Clock>,
    retry: Arc<dyn RetryPolicy>,
    config: MountConfig,
    /// Handle numbers start at 1; 0 is reserved as "no handle".
    next_fh: AtomicU64,
}

impl<R: RemoteFs> FsContext<R> {
    pub fn new(
        remote: Arc<R>,
        clock: Arc<dyn Clock>,
        retry: Arc<dyn RetryPolicy>,
        config: MountConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            remote,
            clock,
            retry,
            config,
            next_fh: AtomicU64::new(1),
        })
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn retry(&self) -> &dyn RetryPolicy {
        self.retry.as_ref()
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    /// Allocates a mount-unique handle number.
    pub(crate) fn allocate_fh(&self) -> u64 {
        self.next_fh.fetch_add(1, Ordering::Relaxed)
    }
}
