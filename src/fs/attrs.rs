//! Cached file attributes with a validity window.

use std::time::{Duration, SystemTime};

/// Metadata snapshot for one remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributes {
    /// Name within the parent directory, not a path.
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: SystemTime,
}

/// An [`Attributes`] snapshot plus the instant it stops being trusted.
///
/// Successful local mutations (chmod, chown) update the snapshot in place
/// without touching the expiry; operations whose remote effect bypasses the
/// snapshot call [`invalidate`](AttrCache::invalidate) instead.
#[derive(Debug, Clone)]
pub struct AttrCache {
    attrs: Attributes,
    expires: SystemTime,
}

impl AttrCache {
    pub fn new(attrs: Attributes, now: SystemTime, ttl: Duration) -> Self {
        Self {
            attrs,
            expires: now + ttl,
        }
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        now > self.expires
    }

    /// Replaces the snapshot with a freshly resolved one and restarts the
    /// validity window.
    pub fn refresh(&mut self, attrs: Attributes, now: SystemTime, ttl: Duration) {
        self.attrs = attrs;
        self.expires = now + ttl;
    }

    /// Moves the expiry into the past so the next read refetches.
    pub fn invalidate(&mut self, now: SystemTime) {
        self.expires = now - Duration::from_secs(1);
    }
}
