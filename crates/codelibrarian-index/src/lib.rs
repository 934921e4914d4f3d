//! codelibrarian-index: discovery and the incremental indexing pipeline.

mod discovery;
mod indexer;

pub use discovery::discover_files;
pub use indexer::{IndexStats, Indexer};
