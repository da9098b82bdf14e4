//! Vector storage.
//!
//! `VectorStore` abstracts the shared document-embedding index; namespaces
//! partition it so one conversation's documents never answer another's query.

mod sqlite;
mod store;

pub use sqlite::SqliteVectorStore;
pub use store::{ChunkSearchResult, StoredChunk, VectorStore};
