//! stagefs — file nodes and write staging for a remote-store filesystem mount.
//!
//! The kernel adapter and the wire client live elsewhere; this crate owns what
//! sits between them: per-file attribute caching, the open-handle registry,
//! and the scratch-file write buffer that turns random-access writes into the
//! whole-file re-uploads the remote store understands.

pub mod clock;
pub mod config;
pub mod error;
/// File nodes, handles and the write-staging engine.
pub mod fs;
pub mod remote;
pub mod retry;
pub mod trc;
