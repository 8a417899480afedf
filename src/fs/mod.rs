//! File nodes, open handles and the write-staging engine.

pub mod attrs;
pub mod context;
pub mod dir;
pub mod handle;
pub mod node;
pub mod write_buffer;

pub use attrs::Attributes;
pub use context::FsContext;
pub use dir::DirNode;
pub use handle::{FileHandle, OpenFlags};
pub use node::FileNode;
pub use write_buffer::WriteBuffer;
