//! Metadata tree of every backup in the configured directory.

pub mod builder;
pub mod node;
pub mod pool;

pub use builder::TreeBuilder;
pub use node::{ArchiveNode, FailedNode, NodeKind, TreeEntry};
pub use pool::WorkerPool;
